//! # silvadb - Out-of-Core Point Cloud Engine
//!
//! silvadb is the paging and query core of a forestry LiDAR editor: it serves
//! point clouds far larger than memory through a per-dataset on-disk octree,
//! a bounded shared-page cache with write-back, and a cursor-style query API
//! that is the only way callers read or mutate points. This implementation
//! prioritizes:
//!
//! - **Bounded residency**: at most N decoded pages live at once; eviction
//!   writes modified pages back before dropping them
//! - **One selection algorithm**: the same octree traversal and per-point
//!   containment tests serve interactive rendering and batch algorithms
//! - **Crash-honest files**: zerocopy little-endian headers, CRC-64 checked
//!   page payloads, append-then-commit directory updates
//!
//! ## Quick Start
//!
//! ```ignore
//! use silvadb::{Editor, ImportSettings, Where};
//!
//! silvadb::import_points(&path, &records, &ImportSettings::default())?;
//!
//! let editor = Editor::builder().cache_capacity(64).build();
//! editor.open_dataset(&path, Default::default())?;
//!
//! let mut query = editor.query();
//! let mut wh = Where::new();
//! wh.set_box(area_of_interest);
//! query.set_where(wh);
//! query.exec();
//! while query.next_point()? {
//!     let _z = query.z();
//!     query.set_classification(2);
//! }
//! query.flush()?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │     Editor facade (coarse lock)      │
//! ├──────────────────────────────────────┤
//! │   Query cursor  │ Worker (channels)  │
//! ├─────────────────┼────────────────────┤
//! │ Dataset registry│  PageCache (LRU)   │
//! ├─────────────────┼────────────────────┤
//! │  SpatialIndex   │ Page state machine │
//! ├──────────────────────────────────────┤
//! │   PageStore (directory + records)    │
//! ├──────────────────────────────────────┤
//! │       Memory-mapped file I/O         │
//! └──────────────────────────────────────┘
//! ```
//!
//! ## File Layout
//!
//! Each imported dataset is a pair of files committed atomically at import:
//!
//! ```text
//! plot42.spf    # point file: header, page directory, 64-byte records
//! plot42.idx    # octree file: header, 64-byte node records
//! ```
//!
//! ## Module Overview
//!
//! - [`geometry`]: closed-interval boxes, selection regions, value ranges
//! - [`index`]: octree build and node-range selection
//! - [`store`]: mmap storage, file headers, page directory I/O
//! - [`page`]: decoded point arrays and the per-query state machine
//! - [`cache`]: bounded shared-page cache with LRU write-back eviction
//! - [`dataset`]: open datasets and the registry queries traverse
//! - [`query`]: the stateful cursor and its predicate bundle
//! - [`worker`]: cooperative channel-driven worker thread
//! - [`editor`]: the facade owning the registry, cache and coarse lock

pub mod cache;
pub mod config;
pub mod context;
pub mod dataset;
pub mod editor;
pub mod error;
pub mod geometry;
pub mod import;
pub mod index;
pub mod page;
pub mod project;
pub mod query;
pub mod store;
pub mod worker;

pub use cache::{PageCache, SharedPage};
pub use context::Context;
pub use dataset::{Dataset, DatasetOpenSettings, DatasetSettings, Datasets};
pub use editor::{Editor, EditorBuilder};
pub use error::{Error, Result};
pub use geometry::{Box3, Range, Region};
pub use import::{import_points, ImportRecord, ImportSettings, ImportSummary};
pub use page::{Page, PageKey, PageState};
pub use project::ProjectFile;
pub use query::{ClassificationSet, LayerSet, Query, Where};
pub use worker::{Event, QueryStateTask, StepOutcome, Task, Worker};
