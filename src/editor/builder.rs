//! Editor construction and cache sizing.
//!
//! Capacity is counted in pages, not bytes: pages decode to a known-size
//! set of attribute arrays, so a page count is an accurate memory budget
//! without per-allocation tracking. When the caller does not pick a
//! capacity, a share of total system RAM is divided by the estimated
//! footprint of one decoded page and clamped to sane bounds.

use std::sync::{Arc, OnceLock};

use sysinfo::System;
use tracing::debug;

use crate::config::{
    CACHE_CAPACITY_MAX, CACHE_CAPACITY_MIN, CACHE_MEMORY_PERCENT, DEFAULT_CACHE_CAPACITY,
    PAGE_MEMORY_ESTIMATE,
};
use crate::context::Context;

use super::Editor;

static SYSTEM_TOTAL_MEMORY: OnceLock<usize> = OnceLock::new();

/// Builder for [`Editor`]; all knobs have working defaults.
#[derive(Debug, Default)]
pub struct EditorBuilder {
    cache_capacity: Option<usize>,
    context: Option<Arc<Context>>,
}

impl EditorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixes the cache capacity in pages instead of sizing from system
    /// memory. Values below the configured floor are raised to it.
    pub fn cache_capacity(mut self, pages: usize) -> Self {
        self.cache_capacity = Some(pages.max(CACHE_CAPACITY_MIN));
        self
    }

    /// Shares a context between sessions; defaults to a fresh one.
    pub fn context(mut self, context: Arc<Context>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn build(self) -> Editor {
        let capacity = self.cache_capacity.unwrap_or_else(auto_capacity);
        let context = self.context.unwrap_or_else(|| Arc::new(Context::new()));

        debug!(cache_capacity = capacity, "editor session created");
        Editor::with_capacity(capacity, context)
    }
}

/// Derives a page capacity from total system memory.
fn auto_capacity() -> usize {
    let total_memory = *SYSTEM_TOTAL_MEMORY.get_or_init(|| {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.total_memory() as usize
    });

    if total_memory == 0 {
        return DEFAULT_CACHE_CAPACITY;
    }

    let budget = (total_memory / 100) * CACHE_MEMORY_PERCENT;
    let pages = budget / PAGE_MEMORY_ESTIMATE;
    pages.clamp(CACHE_CAPACITY_MIN, CACHE_CAPACITY_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_capacity_wins() {
        let editor = EditorBuilder::new().cache_capacity(64).build();
        assert_eq!(editor.cache_capacity(), 64);
    }

    #[test]
    fn tiny_capacities_are_raised_to_the_floor() {
        let editor = EditorBuilder::new().cache_capacity(1).build();
        assert_eq!(editor.cache_capacity(), CACHE_CAPACITY_MIN);
    }

    #[test]
    fn auto_capacity_stays_in_bounds() {
        let pages = auto_capacity();
        assert!(pages >= CACHE_CAPACITY_MIN);
        assert!(pages <= CACHE_CAPACITY_MAX);
    }
}
