//! # silvadb Configuration Module
//!
//! Centralizes every tunable constant for the engine. Constants are grouped by
//! functional area and their interdependencies are documented and enforced
//! through compile-time assertions.
//!
//! ## Why Centralization?
//!
//! The on-disk record and header sizes, the octree limits and the cache sizing
//! all constrain each other: a directory entry must address the largest page a
//! leaf can produce, and the octree depth limit bounds the traversal stack.
//! Co-locating them with compile-time checks keeps a change in one place from
//! silently breaking another.
//!
//! ## Module Organization
//!
//! - [`constants`]: All numeric configuration values with dependency notes

pub mod constants;
pub use constants::*;
