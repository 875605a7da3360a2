//! Axis-aligned bounding box over f64 world coordinates.

use serde::{Deserialize, Serialize};

use crate::config::DEGENERATE_EXTENT;

/// Closed-interval axis-aligned box.
///
/// A default-constructed box is empty: it contains nothing, intersects
/// nothing, and the first `extend_point` turns it into a zero-extent box at
/// that point. Corners passed to [`Box3::new`] are normalized per axis, so
/// callers never have to order them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Box3 {
    min: [f64; 3],
    max: [f64; 3],
    empty: bool,
}

impl Default for Box3 {
    fn default() -> Self {
        Self::empty()
    }
}

impl Box3 {
    pub fn empty() -> Self {
        Box3 {
            min: [0.0; 3],
            max: [0.0; 3],
            empty: true,
        }
    }

    pub fn new(a: [f64; 3], b: [f64; 3]) -> Self {
        let mut min = [0.0; 3];
        let mut max = [0.0; 3];
        for axis in 0..3 {
            if a[axis] <= b[axis] {
                min[axis] = a[axis];
                max[axis] = b[axis];
            } else {
                min[axis] = b[axis];
                max[axis] = a[axis];
            }
        }
        Box3 {
            min,
            max,
            empty: false,
        }
    }

    pub fn from_points(points: impl IntoIterator<Item = [f64; 3]>) -> Self {
        let mut b = Box3::empty();
        for p in points {
            b.extend_point(p[0], p[1], p[2]);
        }
        b
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// True when no axis has a usable extent, so octant subdivision would
    /// never separate points. An empty box is degenerate.
    pub fn is_degenerate(&self) -> bool {
        self.empty
            || (0..3).all(|axis| (self.max[axis] - self.min[axis]).abs() < DEGENERATE_EXTENT)
    }

    pub fn min(&self) -> [f64; 3] {
        self.min
    }

    pub fn max(&self) -> [f64; 3] {
        self.max
    }

    pub fn extent(&self, axis: usize) -> f64 {
        if self.empty {
            0.0
        } else {
            self.max[axis] - self.min[axis]
        }
    }

    pub fn extend_point(&mut self, x: f64, y: f64, z: f64) {
        let p = [x, y, z];
        if self.empty {
            self.min = p;
            self.max = p;
            self.empty = false;
            return;
        }
        for axis in 0..3 {
            if p[axis] < self.min[axis] {
                self.min[axis] = p[axis];
            }
            if p[axis] > self.max[axis] {
                self.max[axis] = p[axis];
            }
        }
    }

    pub fn extend_box(&mut self, other: &Box3) {
        if other.empty {
            return;
        }
        self.extend_point(other.min[0], other.min[1], other.min[2]);
        self.extend_point(other.max[0], other.max[1], other.max[2]);
    }

    pub fn translate(&mut self, t: [f64; 3]) {
        if self.empty {
            return;
        }
        for axis in 0..3 {
            self.min[axis] += t[axis];
            self.max[axis] += t[axis];
        }
    }

    pub fn translated(&self, t: [f64; 3]) -> Box3 {
        let mut b = *self;
        b.translate(t);
        b
    }

    pub fn center(&self) -> [f64; 3] {
        if self.empty {
            return [0.0; 3];
        }
        [
            (self.min[0] + self.max[0]) * 0.5,
            (self.min[1] + self.max[1]) * 0.5,
            (self.min[2] + self.max[2]) * 0.5,
        ]
    }

    /// Half the diagonal: the radius of the smallest sphere around the
    /// center that covers the whole box.
    pub fn radius(&self) -> f64 {
        if self.empty {
            return 0.0;
        }
        let dx = (self.max[0] - self.min[0]) * 0.5;
        let dy = (self.max[1] - self.min[1]) * 0.5;
        let dz = (self.max[2] - self.min[2]) * 0.5;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Euclidean distance from the box center to a point.
    pub fn distance_to(&self, x: f64, y: f64, z: f64) -> f64 {
        let c = self.center();
        let dx = x - c[0];
        let dy = y - c[1];
        let dz = z - c[2];
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn intersects(&self, other: &Box3) -> bool {
        if self.empty || other.empty {
            return false;
        }
        !(self.min[0] > other.max[0]
            || self.max[0] < other.min[0]
            || self.min[1] > other.max[1]
            || self.max[1] < other.min[1]
            || self.min[2] > other.max[2]
            || self.max[2] < other.min[2])
    }

    pub fn contains_point(&self, x: f64, y: f64, z: f64) -> bool {
        if self.empty {
            return false;
        }
        x >= self.min[0]
            && x <= self.max[0]
            && y >= self.min[1]
            && y <= self.max[1]
            && z >= self.min[2]
            && z <= self.max[2]
    }

    /// True when `other` lies entirely inside `self`.
    pub fn contains_box(&self, other: &Box3) -> bool {
        if self.empty || other.empty {
            return false;
        }
        other.min[0] >= self.min[0]
            && other.max[0] <= self.max[0]
            && other.min[1] >= self.min[1]
            && other.max[1] <= self.max[1]
            && other.min[2] >= self.min[2]
            && other.max[2] <= self.max[2]
    }

    /// Sub-box for one octant code: bit 0 selects the high x half, bit 1
    /// the high y half, bit 2 the high z half. Halves share the splitting
    /// plane, consistent with closed-interval containment.
    pub fn octant(&self, code: usize) -> Box3 {
        let c = self.center();
        let mut min = self.min;
        let mut max = self.max;
        for axis in 0..3 {
            if code & (1 << axis) != 0 {
                min[axis] = c[axis];
            } else {
                max[axis] = c[axis];
            }
        }
        Box3 {
            min,
            max,
            empty: self.empty,
        }
    }

    /// Octant code of a point: coordinates strictly above the center go to
    /// the high half, so a point on a splitting plane lands in exactly one
    /// octant.
    pub fn octant_of(&self, x: f64, y: f64, z: f64) -> usize {
        let c = self.center();
        let mut code = 0;
        if x > c[0] {
            code |= 1;
        }
        if y > c[1] {
            code |= 2;
        }
        if z > c[2] {
            code |= 4;
        }
        code
    }
}
