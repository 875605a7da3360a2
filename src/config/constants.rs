//! # silvadb Configuration Constants
//!
//! This module centralizes all configuration constants, grouping interdependent
//! values together and documenting their relationships. Constants that depend
//! on each other are co-located to prevent mismatch bugs.
//!
//! ## Dependency Graph
//!
//! The following diagram shows how constants relate to each other. When changing
//! any constant, check if dependent constants need adjustment.
//!
//! ```text
//! POINT_RECORD_SIZE (64 bytes)
//!       │
//!       ├─> PointRecord struct in store::headers (size asserted there)
//!       │
//!       └─> DEFAULT_LEAF_CAPACITY
//!             One full leaf page serializes to
//!             DEFAULT_LEAF_CAPACITY * POINT_RECORD_SIZE bytes (640 KB),
//!             which is the unit the cache budget is expressed in.
//!
//! FILE_HEADER_SIZE (128 bytes)
//!       │
//!       ├─> PointFileHeader / OctreeFileHeader structs (size asserted there)
//!       │
//!       └─> DIRECTORY_ENTRY_SIZE (32 bytes)
//!             The page directory starts at FILE_HEADER_SIZE and holds
//!             page_count fixed entries; record data follows it.
//!
//! OCTREE_MAX_DEPTH (17)
//!       │
//!       └─> Bounds the traversal stack: a DFS over the octree pushes at
//!           most 7 siblings per level, so SELECT_STACK_INLINE covers the
//!           common case without spilling to the heap.
//!
//! DEFAULT_CACHE_CAPACITY (200 pages)
//!       │
//!       ├─> CACHE_CAPACITY_MIN (floor when sizing from system memory)
//!       │
//!       └─> CACHE_MEMORY_PERCENT
//!             Auto-sizing takes this share of total RAM and divides by the
//!             in-memory footprint of a full page (PAGE_MEMORY_ESTIMATE).
//! ```
//!
//! ## Critical Invariants
//!
//! Enforced by compile-time assertions at the bottom of this file:
//!
//! 1. `POINT_RECORD_SIZE` is a multiple of 8 (directory offsets stay aligned)
//! 2. `CACHE_CAPACITY_MIN <= DEFAULT_CACHE_CAPACITY`
//! 3. `OCTREE_MAX_DEPTH` fits the fixed-width descent bookkeeping
//!
//! ## Usage
//!
//! Import constants from this module rather than defining them locally:
//!
//! ```ignore
//! use crate::config::{DEFAULT_CACHE_CAPACITY, POINT_RECORD_SIZE};
//! ```

use std::time::Duration;

// ============================================================================
// ON-DISK LAYOUT
// Sizes of the fixed binary structures; the structs themselves live in
// store::headers and assert these values at compile time.
// ============================================================================

/// Size of one serialized point record in bytes.
pub const POINT_RECORD_SIZE: usize = 64;

/// Size of the fixed header at the start of every silvadb file.
pub const FILE_HEADER_SIZE: usize = 128;

/// Size of one page directory entry in the point file.
pub const DIRECTORY_ENTRY_SIZE: usize = 32;

/// Size of one serialized octree node record.
pub const OCTREE_NODE_SIZE: usize = 64;

/// Extension of the point file written at import.
pub const POINT_FILE_EXT: &str = "spf";

/// Extension of the octree file written at import.
pub const OCTREE_FILE_EXT: &str = "idx";

/// On-disk format version accepted by this build.
pub const FORMAT_VERSION: u16 = 1;

// ============================================================================
// OCTREE LIMITS
// ============================================================================

/// Default maximum number of points in one leaf page.
pub const DEFAULT_LEAF_CAPACITY: u64 = 10_000;

/// Hard ceiling on octree depth. A leaf at this depth may exceed the leaf
/// capacity rather than subdivide further.
pub const OCTREE_MAX_DEPTH: u32 = 17;

/// Inline capacity of the octree traversal stack before it spills.
pub const SELECT_STACK_INLINE: usize = 32;

// ============================================================================
// PAGE CACHE SIZING
// ============================================================================

/// Default number of resident pages when no capacity is configured and
/// system memory cannot be queried.
pub const DEFAULT_CACHE_CAPACITY: usize = 200;

/// Lower bound on any configured or derived cache capacity.
pub const CACHE_CAPACITY_MIN: usize = 8;

/// Upper bound on the auto-derived cache capacity.
pub const CACHE_CAPACITY_MAX: usize = 4096;

/// Share of total system RAM the auto-sized cache may occupy, in percent.
pub const CACHE_MEMORY_PERCENT: usize = 25;

/// Estimated in-memory footprint of one fully decoded page. Thirteen f64/u32
/// attribute arrays plus render buffers come to roughly 120 bytes per point.
pub const PAGE_MEMORY_ESTIMATE: usize = DEFAULT_LEAF_CAPACITY as usize * 120;

// ============================================================================
// QUERY EXECUTION
// ============================================================================

/// Wall-clock budget for one cooperative step of phased query execution.
/// Steps return control when the budget elapses even if candidate pages
/// remain, so an interactive driver can interleave frames.
pub const STEP_TIME_BUDGET: Duration = Duration::from_millis(15);

/// Normalization factor mapping stored u16 intensity/color samples to the
/// 0..1 f64 range used in memory.
pub const SCALE_U16: f64 = 1.0 / 65535.0;

/// Extent below which a bounding box axis counts as degenerate and stops
/// octant subdivision.
pub const DEGENERATE_EXTENT: f64 = 1e-9;

// ============================================================================
// COMPILE-TIME INVARIANTS
// ============================================================================

const _: () = assert!(
    POINT_RECORD_SIZE % 8 == 0,
    "point records must keep directory offsets 8-byte aligned"
);

const _: () = assert!(
    CACHE_CAPACITY_MIN <= DEFAULT_CACHE_CAPACITY
        && DEFAULT_CACHE_CAPACITY <= CACHE_CAPACITY_MAX,
    "default cache capacity must sit inside the configured bounds"
);

const _: () = assert!(
    OCTREE_MAX_DEPTH < 32,
    "depth must fit the u32 bookkeeping used by the builder"
);

const _: () = assert!(
    FILE_HEADER_SIZE % DIRECTORY_ENTRY_SIZE == 0,
    "directory entries must tile evenly after the header"
);
