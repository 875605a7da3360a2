//! # Spatial Index
//!
//! A file-backed octree over one dataset's points. Nodes are stored as a
//! flat array; tree shape lives in per-node child links and the geometry of
//! a node is never stored, only derived by subdividing the root boundary on
//! the way down.
//!
//! ```text
//!                 ┌─────────────────────────────┐
//!                 │ node 0 (root)               │
//!                 │ from 0, size N              │
//!                 └──────┬──────────────────────┘
//!              next[2]   │   next[5]
//!             ┌──────────┴───────────┐
//!             ▼                      ▼
//!     ┌───────────────┐      ┌───────────────┐
//!     │ node 1 (leaf) │      │ node 2 (leaf) │
//!     │ page 0        │      │ page 1        │
//!     └───────────────┘      └───────────────┘
//! ```
//!
//! Every node covers a contiguous range `[from, from + size)` of the
//! storage-ordered points, and a parent's range is exactly the concatenation
//! of its children's ranges in octant order. Pages are numbered in that same
//! order, so a depth-first traversal emits pages with strictly increasing
//! ids. Queries lean on this: results keep a stable order without sorting.
//!
//! Node boundaries are closed intervals. A point on a shared octant plane
//! belongs to the boxes on both sides, but [`Box3::octant_of`] assigns it to
//! the low side, so exactly one leaf stores it.
//!
//! [`Box3::octant_of`]: crate::geometry::Box3::octant_of

mod builder;

pub use builder::{BuiltIndex, IndexBuilder};

use std::fs::File;
use std::io::Write;
use std::path::Path;

use smallvec::SmallVec;
use zerocopy::{FromBytes, IntoBytes};

use crate::config::{FILE_HEADER_SIZE, OCTREE_NODE_SIZE, SELECT_STACK_INLINE};
use crate::error::{Error, Result};
use crate::geometry::{Box3, Region};
use crate::store::{OctreeFileHeader, OctreeNodeRecord};

/// One octree node. `next[i] == 0` means no child in octant `i`; node 0 is
/// the root and is never a child. The `page` field is meaningful only for
/// leaves.
#[derive(Debug, Clone, Copy)]
pub struct Node {
    pub from: u64,
    pub size: u64,
    pub page: u32,
    pub prev: u32,
    pub next: [u32; 8],
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        self.next.iter().all(|&child| child == 0)
    }
}

/// A leaf matched by a spatial selection.
///
/// `partial == false` promises that every point in the page satisfies the
/// region, so per-point filtering can be skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafHit {
    pub page: u32,
    pub partial: bool,
    pub from: u64,
    pub size: u64,
}

/// Flat-array octree over one dataset, in file coordinates.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    nodes: Vec<Node>,
    boundary: Box3,
    leaf_capacity: u64,
    max_depth: u32,
}

impl SpatialIndex {
    /// Reads and validates an index file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        let header = OctreeFileHeader::from_bytes(&bytes, path)?;

        let node_count = header.node_count() as usize;
        let expected = FILE_HEADER_SIZE + node_count * OCTREE_NODE_SIZE;
        if bytes.len() != expected {
            return Err(Error::format(
                path,
                format!(
                    "octree file length {} does not match {} nodes",
                    bytes.len(),
                    node_count
                ),
            ));
        }

        let records = <[OctreeNodeRecord]>::ref_from_bytes(&bytes[FILE_HEADER_SIZE..])
            .map_err(|_| Error::format(path, "misaligned octree node array"))?;

        let mut nodes = Vec::with_capacity(node_count);
        for record in records {
            let next = record.next();
            for &child in &next {
                if child != 0 && child as usize >= node_count {
                    return Err(Error::format(
                        path,
                        format!("octree child link {child} out of range"),
                    ));
                }
            }
            if record.prev() as usize >= node_count {
                return Err(Error::format(
                    path,
                    format!("octree parent link {} out of range", record.prev()),
                ));
            }
            nodes.push(Node {
                from: record.from(),
                size: record.size(),
                page: record.page(),
                prev: record.prev(),
                next,
            });
        }

        if nodes.is_empty() {
            return Err(Error::format(path, "octree has no nodes"));
        }

        Ok(Self {
            nodes,
            boundary: header.boundary(),
            leaf_capacity: header.leaf_capacity(),
            max_depth: header.max_depth(),
        })
    }

    /// Writes the index to `path` through a temporary file, so an existing
    /// index is replaced only by a complete one.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        let mut bytes =
            Vec::with_capacity(FILE_HEADER_SIZE + self.nodes.len() * OCTREE_NODE_SIZE);
        let header = OctreeFileHeader::new(
            self.nodes.len() as u32,
            self.leaf_capacity,
            self.max_depth,
            &self.boundary,
        );
        bytes.extend_from_slice(header.as_bytes());
        for node in &self.nodes {
            let record =
                OctreeNodeRecord::new(node.from, node.size, node.page, node.prev, node.next);
            bytes.extend_from_slice(record.as_bytes());
        }

        let tmp = path.with_extension("idx.tmp");
        {
            let mut file = File::create(&tmp).map_err(|e| Error::io(&tmp, e))?;
            file.write_all(&bytes).map_err(|e| Error::io(&tmp, e))?;
            file.sync_all().map_err(|e| Error::io(&tmp, e))?;
        }
        std::fs::rename(&tmp, path).map_err(|e| Error::io(path, e))?;

        Ok(())
    }

    /// Boundary of the whole tree, in file coordinates.
    pub fn boundary(&self) -> &Box3 {
        &self.boundary
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: u32) -> Option<&Node> {
        self.nodes.get(id as usize)
    }

    pub fn leaf_capacity(&self) -> u64 {
        self.leaf_capacity
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Storage span of every page, indexed by page id.
    pub fn page_spans(&self) -> Vec<(u64, u64)> {
        let mut spans: Vec<(u32, u64, u64)> = self
            .nodes
            .iter()
            .filter(|n| n.is_leaf())
            .map(|n| (n.page, n.from, n.size))
            .collect();
        spans.sort_unstable_by_key(|&(page, _, _)| page);
        spans.into_iter().map(|(_, from, size)| (from, size)).collect()
    }

    /// Collects the leaves whose boxes intersect `region`, in increasing
    /// page order.
    ///
    /// Node boxes are derived during descent; a subtree is pruned as soon as
    /// its box misses the region, and the per-point filter is waived for
    /// leaves whose box the region fully contains.
    pub fn select_nodes(&self, region: &Region) -> Vec<LeafHit> {
        let mut hits = Vec::new();

        if self.nodes.is_empty() || region.is_empty() {
            return hits;
        }

        if matches!(region, Region::None) {
            for node in &self.nodes {
                if node.is_leaf() {
                    hits.push(LeafHit {
                        page: node.page,
                        partial: false,
                        from: node.from,
                        size: node.size,
                    });
                }
            }
            hits.sort_unstable_by_key(|h| h.page);
            return hits;
        }

        let mut stack: SmallVec<[(u32, Box3); SELECT_STACK_INLINE]> = SmallVec::new();
        stack.push((0, self.boundary));

        while let Some((id, node_box)) = stack.pop() {
            let node = &self.nodes[id as usize];

            if !region.intersects_box(&node_box) {
                continue;
            }

            if node.is_leaf() {
                hits.push(LeafHit {
                    page: node.page,
                    partial: !region.contains_box(&node_box),
                    from: node.from,
                    size: node.size,
                });
                continue;
            }

            // Reverse push order so octant 0 pops first; leaves then come
            // out in increasing page order.
            for code in (0..8).rev() {
                let child = node.next[code];
                if child != 0 {
                    stack.push((child, node_box.octant(code)));
                }
            }
        }

        hits
    }

    /// Descends to the leaf whose box contains `point`, if any.
    pub fn select_point(&self, point: [f64; 3]) -> Option<LeafHit> {
        if self.nodes.is_empty() || !self.boundary.contains_point(point[0], point[1], point[2]) {
            return None;
        }

        let mut id = 0u32;
        let mut node_box = self.boundary;

        loop {
            let node = &self.nodes[id as usize];
            if node.is_leaf() {
                return Some(LeafHit {
                    page: node.page,
                    partial: true,
                    from: node.from,
                    size: node.size,
                });
            }

            let code = node_box.octant_of(point[0], point[1], point[2]);
            let child = node.next[code];
            if child == 0 {
                // The point falls in an octant no point occupied at build
                // time.
                return None;
            }
            node_box = node_box.octant(code);
            id = child;
        }
    }
}
