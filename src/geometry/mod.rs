//! Geometric primitives shared by the octree and the per-point filters.
//!
//! Boxes are closed intervals on every axis: a point lying exactly on a face
//! belongs to the box, and two boxes sharing a face intersect. The octree
//! depends on this when a selection region touches a splitting plane: both
//! adjoining nodes report an intersection and the per-point test remains the
//! source of truth.

mod box3;
mod range;
mod region;

pub use box3::Box3;
pub use range::Range;
pub use region::Region;
