//! # Octree Construction
//!
//! Building happens in two phases. The first phase recursively partitions a
//! permutation of the input points: each node owns a contiguous range of the
//! permutation, and splitting a node is a stable counting sort of its range
//! into the eight octants of its box. The second phase renumbers the arena
//! breadth-first into the flat array layout the index file uses, then hands
//! out page ids to leaves in storage order.
//!
//! The permutation that falls out of phase one IS the storage order: the
//! importer writes point records in exactly this order, which is what makes
//! every node's `[from, from + size)` range land contiguously on disk.

use crate::config::{DEFAULT_LEAF_CAPACITY, OCTREE_MAX_DEPTH};
use crate::error::{Error, Result};
use crate::geometry::Box3;

use super::{Node, SpatialIndex};

struct BuildNode {
    begin: usize,
    end: usize,
    children: [Option<usize>; 8],
}

/// Result of an index build: the tree plus the storage-order permutation.
///
/// `order[i]` is the index into the input slice of the point that belongs at
/// storage position `i`.
#[derive(Debug)]
pub struct BuiltIndex {
    pub index: SpatialIndex,
    pub order: Vec<u32>,
}

/// Configures and runs an octree build over in-memory positions.
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    boundary: Box3,
    leaf_capacity: u64,
    max_depth: u32,
}

impl IndexBuilder {
    pub fn new(boundary: Box3) -> Self {
        Self {
            boundary,
            leaf_capacity: DEFAULT_LEAF_CAPACITY,
            max_depth: OCTREE_MAX_DEPTH,
        }
    }

    /// Target maximum points per leaf. A leaf at maximum depth may exceed it.
    pub fn leaf_capacity(mut self, capacity: u64) -> Self {
        self.leaf_capacity = capacity.max(1);
        self
    }

    pub fn max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth.min(OCTREE_MAX_DEPTH);
        self
    }

    pub fn build(&self, positions: &[[f64; 3]]) -> Result<BuiltIndex> {
        if positions.is_empty() {
            return Err(Error::IndexBuild("cannot index zero points".into()));
        }
        if positions.len() > u32::MAX as usize {
            return Err(Error::IndexBuild(format!(
                "{} points exceed the per-dataset limit",
                positions.len()
            )));
        }
        if self.boundary.is_empty() {
            return Err(Error::IndexBuild("boundary is empty".into()));
        }
        for (i, &p) in positions.iter().enumerate() {
            if !self.boundary.contains_point(p[0], p[1], p[2]) {
                return Err(Error::IndexBuild(format!(
                    "point {i} lies outside the boundary"
                )));
            }
        }

        let mut order: Vec<u32> = (0..positions.len() as u32).collect();
        let mut scratch: Vec<u32> = vec![0; positions.len()];
        let mut arena = vec![BuildNode {
            begin: 0,
            end: positions.len(),
            children: [None; 8],
        }];

        self.subdivide(
            &mut arena,
            0,
            self.boundary,
            0,
            positions,
            &mut order,
            &mut scratch,
        );

        let nodes = flatten(&arena);

        Ok(BuiltIndex {
            index: SpatialIndex {
                nodes,
                boundary: self.boundary,
                leaf_capacity: self.leaf_capacity,
                max_depth: self.max_depth,
            },
            order,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn subdivide(
        &self,
        arena: &mut Vec<BuildNode>,
        id: usize,
        node_box: Box3,
        depth: u32,
        positions: &[[f64; 3]],
        order: &mut [u32],
        scratch: &mut [u32],
    ) {
        let (begin, end) = (arena[id].begin, arena[id].end);
        let size = (end - begin) as u64;

        if size <= self.leaf_capacity || depth >= self.max_depth || node_box.is_degenerate() {
            return;
        }

        let mut counts = [0usize; 8];
        for &pi in &order[begin..end] {
            let p = positions[pi as usize];
            counts[node_box.octant_of(p[0], p[1], p[2])] += 1;
        }

        let mut starts = [0usize; 8];
        let mut acc = 0;
        for code in 0..8 {
            starts[code] = acc;
            acc += counts[code];
        }

        // Stable scatter keeps input order within each octant, so builds are
        // deterministic.
        let mut cursors = starts;
        for &pi in &order[begin..end] {
            let p = positions[pi as usize];
            let code = node_box.octant_of(p[0], p[1], p[2]);
            scratch[begin + cursors[code]] = pi;
            cursors[code] += 1;
        }
        order[begin..end].copy_from_slice(&scratch[begin..end]);

        for code in 0..8 {
            if counts[code] == 0 {
                continue;
            }
            let child_begin = begin + starts[code];
            let child_id = arena.len();
            arena.push(BuildNode {
                begin: child_begin,
                end: child_begin + counts[code],
                children: [None; 8],
            });
            arena[id].children[code] = Some(child_id);
            self.subdivide(
                arena,
                child_id,
                node_box.octant(code),
                depth + 1,
                positions,
                order,
                scratch,
            );
        }
    }
}

/// Renumbers the build arena breadth-first and assigns page ids to leaves in
/// storage order.
fn flatten(arena: &[BuildNode]) -> Vec<Node> {
    let mut map = vec![0u32; arena.len()];
    let mut bfs = Vec::with_capacity(arena.len());
    bfs.push(0usize);

    let mut head = 0;
    while head < bfs.len() {
        let aid = bfs[head];
        for child in arena[aid].children.into_iter().flatten() {
            map[child] = bfs.len() as u32;
            bfs.push(child);
        }
        head += 1;
    }

    let mut nodes: Vec<Node> = bfs
        .iter()
        .map(|&aid| {
            let build = &arena[aid];
            let mut next = [0u32; 8];
            for (code, child) in build.children.iter().enumerate() {
                if let Some(c) = child {
                    next[code] = map[*c];
                }
            }
            Node {
                from: build.begin as u64,
                size: (build.end - build.begin) as u64,
                page: 0,
                prev: 0,
                next,
            }
        })
        .collect();

    for id in 0..nodes.len() {
        for code in 0..8 {
            let child = nodes[id].next[code];
            if child != 0 {
                nodes[child as usize].prev = id as u32;
            }
        }
    }

    let mut leaves: Vec<usize> = (0..nodes.len())
        .filter(|&i| nodes[i].is_leaf())
        .collect();
    leaves.sort_unstable_by_key(|&i| nodes[i].from);
    for (page, &i) in leaves.iter().enumerate() {
        nodes[i].page = page as u32;
    }

    debug_assert!({
        let mut expected = 0u64;
        leaves.iter().all(|&i| {
            let ok = nodes[i].from == expected;
            expected += nodes[i].size;
            ok
        })
    });

    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Region;

    fn scatter_positions(n: usize) -> Vec<[f64; 3]> {
        // Deterministic pseudo-random cloud; no RNG dependency needed.
        let mut state = 0x2545F4914F6CDD1Du64;
        (0..n)
            .map(|_| {
                let mut coord = [0.0; 3];
                for c in &mut coord {
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    *c = (state % 10_000) as f64 / 100.0;
                }
                coord
            })
            .collect()
    }

    #[test]
    fn zero_points_is_build_error() {
        let builder = IndexBuilder::new(Box3::new([0.0; 3], [1.0; 3]));
        assert!(matches!(
            builder.build(&[]),
            Err(Error::IndexBuild(_))
        ));
    }

    #[test]
    fn outside_point_is_build_error() {
        let builder = IndexBuilder::new(Box3::new([0.0; 3], [1.0; 3]));
        let err = builder.build(&[[0.5; 3], [2.0; 3]]).unwrap_err();
        assert!(matches!(err, Error::IndexBuild(_)));
    }

    #[test]
    fn order_is_a_permutation() {
        let positions = scatter_positions(1_000);
        let boundary = Box3::from_points(positions.iter().copied());
        let built = IndexBuilder::new(boundary)
            .leaf_capacity(64)
            .build(&positions)
            .unwrap();

        let mut sorted = built.order.clone();
        sorted.sort_unstable();
        assert!(sorted.iter().enumerate().all(|(i, &v)| i as u32 == v));
    }

    #[test]
    fn leaves_respect_capacity() {
        let positions = scatter_positions(2_000);
        let boundary = Box3::from_points(positions.iter().copied());
        let built = IndexBuilder::new(boundary)
            .leaf_capacity(100)
            .build(&positions)
            .unwrap();

        for hit in built.index.select_nodes(&Region::None) {
            assert!(hit.size <= 100);
        }
    }

    #[test]
    fn storage_order_lands_points_in_their_leaf() {
        let positions = scatter_positions(500);
        let boundary = Box3::from_points(positions.iter().copied());
        let built = IndexBuilder::new(boundary)
            .leaf_capacity(50)
            .build(&positions)
            .unwrap();

        for hit in built.index.select_nodes(&Region::None) {
            for pos in hit.from..hit.from + hit.size {
                let input = built.order[pos as usize] as usize;
                let found = built.index.select_point(positions[input]).unwrap();
                assert_eq!(found.page, hit.page);
            }
        }
    }

    #[test]
    fn duplicate_points_stop_at_max_depth() {
        let positions = vec![[1.0, 2.0, 3.0]; 100];
        let boundary = Box3::new([0.0; 3], [4.0; 3]);
        let built = IndexBuilder::new(boundary)
            .leaf_capacity(10)
            .max_depth(3)
            .build(&positions)
            .unwrap();

        let hits = built.index.select_nodes(&Region::None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].size, 100);
        assert_eq!(built.index.node_count(), 4);
    }

    #[test]
    fn parent_links_are_consistent() {
        let positions = scatter_positions(800);
        let boundary = Box3::from_points(positions.iter().copied());
        let built = IndexBuilder::new(boundary)
            .leaf_capacity(64)
            .build(&positions)
            .unwrap();
        let index = &built.index;

        for id in 1..index.node_count() as u32 {
            let node = index.node(id).unwrap();
            let parent = index.node(node.prev).unwrap();
            assert!(parent.next.contains(&id));
            assert!(parent.from <= node.from);
            assert!(node.from + node.size <= parent.from + parent.size);
        }
    }
}
