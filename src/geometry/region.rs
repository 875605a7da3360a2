//! Spatial selection regions.
//!
//! `Region` is a closed set of shape variants with one containment function
//! per variant, dispatched by `match` in the per-point selection loop. All
//! variants are convex, which the octree exploits: a node box whose eight
//! corners are inside the region is fully inside it.

use serde::{Deserialize, Serialize};

use super::Box3;

/// One query's spatial constraint.
///
/// `None` means no constraint: every point matches and the octree returns
/// every leaf. An empty `Box` matches nothing. Coordinates are world-space;
/// per-dataset traversal translates the region into file space first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum Region {
    #[default]
    None,
    Box(Box3),
    Sphere {
        center: [f64; 3],
        radius: f64,
    },
    /// Opens downward from the apex along -z, the shape used to trace stems
    /// and crowns: a point qualifies when its depth below the apex stays
    /// within the cone angle and above `bottom_z`.
    Cone {
        apex: [f64; 3],
        bottom_z: f64,
        /// Half-angle from the vertical axis, in radians.
        angle: f64,
    },
    Cylinder {
        a: [f64; 3],
        b: [f64; 3],
        radius: f64,
    },
}

impl Region {
    /// Per-point containment test. Closed boundaries on every variant.
    pub fn contains(&self, x: f64, y: f64, z: f64) -> bool {
        match self {
            Region::None => true,
            Region::Box(b) => b.contains_point(x, y, z),
            Region::Sphere { center, radius } => {
                let dx = x - center[0];
                let dy = y - center[1];
                let dz = z - center[2];
                dx * dx + dy * dy + dz * dz <= radius * radius
            }
            Region::Cone {
                apex,
                bottom_z,
                angle,
            } => {
                if z > apex[2] || z < *bottom_z {
                    return false;
                }
                let allowed = angle.tan() * (apex[2] - z);
                let dx = x - apex[0];
                let dy = y - apex[1];
                dx * dx + dy * dy <= allowed * allowed
            }
            Region::Cylinder { a, b, radius } => {
                let v = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
                let w = [x - a[0], y - a[1], z - a[2]];
                let len2 = v[0] * v[0] + v[1] * v[1] + v[2] * v[2];
                if len2 == 0.0 {
                    // Degenerate axis: fall back to a ball around `a`.
                    return w[0] * w[0] + w[1] * w[1] + w[2] * w[2] <= radius * radius;
                }
                let t = (w[0] * v[0] + w[1] * v[1] + w[2] * v[2]) / len2;
                if !(0.0..=1.0).contains(&t) {
                    return false;
                }
                let dx = w[0] - t * v[0];
                let dy = w[1] - t * v[1];
                let dz = w[2] - t * v[2];
                dx * dx + dy * dy + dz * dz <= radius * radius
            }
        }
    }

    /// Covering box used to prune octree subtrees, or `None` when the region
    /// is unbounded. Conservative for the cone and cylinder caps.
    pub fn bound(&self) -> Option<Box3> {
        match self {
            Region::None => None,
            Region::Box(b) => Some(*b),
            Region::Sphere { center, radius } => Some(Box3::new(
                [center[0] - radius, center[1] - radius, center[2] - radius],
                [center[0] + radius, center[1] + radius, center[2] + radius],
            )),
            Region::Cone {
                apex,
                bottom_z,
                angle,
            } => {
                let r = angle.tan() * (apex[2] - bottom_z).max(0.0);
                Some(Box3::new(
                    [apex[0] - r, apex[1] - r, *bottom_z],
                    [apex[0] + r, apex[1] + r, apex[2]],
                ))
            }
            Region::Cylinder { a, b, radius } => {
                let mut bx = Box3::empty();
                bx.extend_point(a[0] - radius, a[1] - radius, a[2] - radius);
                bx.extend_point(a[0] + radius, a[1] + radius, a[2] + radius);
                bx.extend_point(b[0] - radius, b[1] - radius, b[2] - radius);
                bx.extend_point(b[0] + radius, b[1] + radius, b[2] + radius);
                Some(bx)
            }
        }
    }

    /// Whether a node box can hold any matching point. Exact for boxes,
    /// bounding-box conservative for the curved variants; false positives
    /// only cost a fine-filter pass.
    pub fn intersects_box(&self, node: &Box3) -> bool {
        if node.is_empty() {
            return false;
        }
        match self {
            Region::None => true,
            Region::Box(b) => b.intersects(node),
            _ => match self.bound() {
                Some(b) => b.intersects(node),
                None => true,
            },
        }
    }

    /// Whether a node box lies entirely inside the region. Exact for boxes;
    /// for the convex curved variants all eight corners are tested.
    pub fn contains_box(&self, node: &Box3) -> bool {
        if node.is_empty() {
            return false;
        }
        match self {
            Region::None => true,
            Region::Box(b) => b.contains_box(node),
            _ => {
                let min = node.min();
                let max = node.max();
                for code in 0..8 {
                    let x = if code & 1 != 0 { max[0] } else { min[0] };
                    let y = if code & 2 != 0 { max[1] } else { min[1] };
                    let z = if code & 4 != 0 { max[2] } else { min[2] };
                    if !self.contains(x, y, z) {
                        return false;
                    }
                }
                true
            }
        }
    }

    /// True when the region can never match a point. `None` is not empty,
    /// it matches everything.
    pub fn is_empty(&self) -> bool {
        match self {
            Region::Box(b) => b.is_empty(),
            _ => false,
        }
    }

    pub fn translate(&mut self, t: [f64; 3]) {
        match self {
            Region::None => {}
            Region::Box(b) => b.translate(t),
            Region::Sphere { center, .. } => {
                for axis in 0..3 {
                    center[axis] += t[axis];
                }
            }
            Region::Cone { apex, bottom_z, .. } => {
                for axis in 0..3 {
                    apex[axis] += t[axis];
                }
                *bottom_z += t[2];
            }
            Region::Cylinder { a, b, .. } => {
                for axis in 0..3 {
                    a[axis] += t[axis];
                    b[axis] += t[axis];
                }
            }
        }
    }

    pub fn translated(&self, t: [f64; 3]) -> Region {
        let mut r = self.clone();
        r.translate(t);
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_matches_everything() {
        let r = Region::None;
        assert!(r.contains(1e12, -1e12, 0.0));
        assert!(r.bound().is_none());
        assert!(!r.is_empty());
    }

    #[test]
    fn sphere_boundary_is_closed() {
        let r = Region::Sphere {
            center: [0.0; 3],
            radius: 1.0,
        };
        assert!(r.contains(1.0, 0.0, 0.0));
        assert!(!r.contains(1.0 + 1e-9, 0.0, 0.0));
    }

    #[test]
    fn cone_narrows_toward_apex() {
        let r = Region::Cone {
            apex: [0.0, 0.0, 10.0],
            bottom_z: 0.0,
            angle: std::f64::consts::FRAC_PI_4,
        };
        // At depth 5 the radius is 5.
        assert!(r.contains(4.9, 0.0, 5.0));
        assert!(!r.contains(5.1, 0.0, 5.0));
        // Above the apex or below the base never matches.
        assert!(!r.contains(0.0, 0.0, 10.5));
        assert!(!r.contains(0.0, 0.0, -0.1));
        assert!(r.contains(0.0, 0.0, 10.0));
    }

    #[test]
    fn cylinder_respects_caps_and_radius() {
        let r = Region::Cylinder {
            a: [0.0, 0.0, 0.0],
            b: [0.0, 0.0, 4.0],
            radius: 1.0,
        };
        assert!(r.contains(0.5, 0.0, 2.0));
        assert!(r.contains(1.0, 0.0, 0.0));
        assert!(!r.contains(1.1, 0.0, 2.0));
        assert!(!r.contains(0.0, 0.0, 4.1));
    }

    #[test]
    fn contains_box_requires_all_corners() {
        let sphere = Region::Sphere {
            center: [0.0; 3],
            radius: 2.0,
        };
        let inside = Box3::new([-0.5; 3], [0.5; 3]);
        let poking = Box3::new([-0.5; 3], [1.9, 0.5, 0.5]);
        assert!(sphere.contains_box(&inside));
        assert!(!sphere.contains_box(&poking));
        assert!(sphere.intersects_box(&poking));
    }

    #[test]
    fn translated_sphere_moves_with_dataset() {
        let r = Region::Sphere {
            center: [0.0; 3],
            radius: 1.0,
        }
        .translated([5.0, 0.0, 0.0]);
        assert!(r.contains(5.5, 0.0, 0.0));
        assert!(!r.contains(0.0, 0.0, 0.0));
    }

    #[test]
    fn empty_box_region_matches_nothing() {
        let r = Region::Box(Box3::empty());
        assert!(r.is_empty());
        assert!(!r.contains(0.0, 0.0, 0.0));
    }
}
