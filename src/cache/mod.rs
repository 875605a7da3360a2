//! # Page Cache
//!
//! Bounded pool of decoded pages shared as `Arc<RwLock<Page>>`. A hit hands
//! out another reference to the resident instance, so every consumer of a
//! page sees every other consumer's edits; a miss reads through the store
//! and may first evict the least-recently-used page nobody else holds.
//!
//! ## Eviction
//!
//! Eligibility is purely reference-count based: a page whose only strong
//! reference is the cache's own map entry (`Arc::strong_count == 1`) can go.
//! Modified pages are written back before leaving. Two deliberate
//! asymmetries follow from the no-data-loss rule:
//!
//! - When every resident page is held, nothing is evicted and the cache
//!   temporarily exceeds its capacity.
//! - When a write-back fails, the page stays resident (and the cache stays
//!   over capacity) and the error surfaces to whichever acquire triggered
//!   the eviction. A modified page is never dropped on the floor.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::dataset::{Dataset, Datasets};
use crate::error::{Error, Result};
use crate::page::{Page, PageKey};

pub type SharedPage = Arc<RwLock<Page>>;

#[derive(Debug)]
pub struct PageCache {
    map: HashMap<PageKey, SharedPage>,
    /// Keys ordered least- to most-recently used.
    lru: Vec<PageKey>,
    capacity: usize,
}

impl PageCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            map: HashMap::new(),
            lru: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn resident(&self) -> usize {
        self.map.len()
    }

    pub fn contains(&self, key: PageKey) -> bool {
        self.map.contains_key(&key)
    }

    /// Returns the shared page for `key`, loading it on a miss.
    ///
    /// The returned page is decoded and transformed to project space. Every
    /// failure propagates, including an unreadable requested page.
    pub fn acquire(&mut self, key: PageKey, datasets: &mut Datasets) -> Result<SharedPage> {
        if let Some(page) = self.hit(key) {
            return Ok(page);
        }

        self.make_room(datasets)?;

        let dataset = datasets.get(key.dataset_id).ok_or_else(|| {
            Error::InvalidSelector(format!("dataset {} is not open", key.dataset_id))
        })?;

        let page = Self::load(key, dataset)?;
        Ok(self.insert(key, page))
    }

    /// Like [`acquire`], but a page that cannot be loaded is skipped:
    /// warn-logged and reported as `Ok(None)` so a scan can continue past
    /// it. Errors from evicting other pages still propagate, because those
    /// risk losing modifications.
    ///
    /// [`acquire`]: Self::acquire
    pub fn acquire_resilient(
        &mut self,
        key: PageKey,
        datasets: &mut Datasets,
    ) -> Result<Option<SharedPage>> {
        if let Some(page) = self.hit(key) {
            return Ok(Some(page));
        }

        self.make_room(datasets)?;

        let Some(dataset) = datasets.get(key.dataset_id) else {
            warn!(dataset = key.dataset_id, "dataset closed under a live query; skipping");
            return Ok(None);
        };

        match Self::load(key, dataset) {
            Ok(page) => Ok(Some(self.insert(key, page))),
            Err(e) => {
                warn!(
                    dataset = key.dataset_id,
                    page = key.page_id,
                    error = %e,
                    "skipping unreadable page"
                );
                Ok(None)
            }
        }
    }

    /// Resident lookup without loading; does not refresh recency.
    pub fn peek(&self, key: PageKey) -> Option<SharedPage> {
        self.map.get(&key).map(Arc::clone)
    }

    fn hit(&mut self, key: PageKey) -> Option<SharedPage> {
        let page = Arc::clone(self.map.get(&key)?);
        self.touch(key);
        trace!(dataset = key.dataset_id, page = key.page_id, "cache hit");
        Some(page)
    }

    /// Evicts until the next insert fits, so an earlier all-held overrun
    /// drains as soon as the holders are gone. Stops short when no page is
    /// evictable.
    fn make_room(&mut self, datasets: &mut Datasets) -> Result<()> {
        while self.map.len() >= self.capacity {
            if !self.evict_one(datasets)? {
                break;
            }
        }
        Ok(())
    }

    fn load(key: PageKey, dataset: &Dataset) -> Result<Page> {
        let mut page = Page::new(key.dataset_id, key.page_id);
        page.read(dataset.store())?;
        page.transform(dataset.translation());
        Ok(page)
    }

    fn insert(&mut self, key: PageKey, page: Page) -> SharedPage {
        let shared = Arc::new(RwLock::new(page));
        self.map.insert(key, Arc::clone(&shared));
        self.lru.push(key);
        trace!(dataset = key.dataset_id, page = key.page_id, "cache miss loaded");
        shared
    }

    /// Writes back one resident page if it is modified. The page stays
    /// resident either way.
    pub fn flush(&self, key: PageKey, datasets: &mut Datasets) -> Result<()> {
        self.write_back(key, datasets)
    }

    /// Writes back every modified resident page, in key order.
    pub fn flush_all(&self, datasets: &mut Datasets) -> Result<()> {
        let mut keys: Vec<PageKey> = self.map.keys().copied().collect();
        keys.sort_unstable();
        for key in keys {
            self.write_back(key, datasets)?;
        }
        Ok(())
    }

    /// Drops every page of one dataset, writing modified ones back first.
    /// Pages still held elsewhere leave the map and die with their holders.
    pub fn remove_dataset(&mut self, dataset_id: u32, datasets: &mut Datasets) -> Result<()> {
        let mut keys: Vec<PageKey> = self
            .map
            .keys()
            .filter(|k| k.dataset_id == dataset_id)
            .copied()
            .collect();
        keys.sort_unstable();

        for key in keys {
            self.write_back(key, datasets)?;
            self.map.remove(&key);
            self.lru.retain(|k| *k != key);
        }
        Ok(())
    }

    /// Empties the cache, writing back every modified page first.
    pub fn clear(&mut self, datasets: &mut Datasets) -> Result<()> {
        self.flush_all(datasets)?;
        self.map.clear();
        self.lru.clear();
        Ok(())
    }

    fn touch(&mut self, key: PageKey) {
        if let Some(i) = self.lru.iter().position(|k| *k == key) {
            self.lru.remove(i);
        }
        self.lru.push(key);
    }

    /// Evicts the least-recently-used sole-owner page, if any. Returns
    /// whether a page left the cache.
    fn evict_one(&mut self, datasets: &mut Datasets) -> Result<bool> {
        let victim = self.lru.iter().copied().find(|key| {
            self.map
                .get(key)
                .is_some_and(|page| Arc::strong_count(page) == 1)
        });

        let Some(key) = victim else {
            debug!(
                resident = self.map.len(),
                capacity = self.capacity,
                "every resident page is held; cache exceeds capacity"
            );
            return Ok(false);
        };

        self.write_back(key, datasets)?;
        self.map.remove(&key);
        self.lru.retain(|k| *k != key);
        debug!(dataset = key.dataset_id, page = key.page_id, "page evicted");

        Ok(true)
    }

    fn write_back(&self, key: PageKey, datasets: &mut Datasets) -> Result<()> {
        let Some(shared) = self.map.get(&key) else {
            return Ok(());
        };

        let mut page = shared.write();
        if !page.modified() {
            return Ok(());
        }

        let dataset = datasets.get_mut(key.dataset_id).ok_or_else(|| {
            Error::InvalidSelector(format!("dataset {} is not open", key.dataset_id))
        })?;

        let bytes = page.encode(dataset.store().scale(), dataset.store().offset());
        dataset.store_mut().write_page(key.page_id, &bytes)?;
        dataset.store_mut().sync()?;
        page.set_modified(false);

        debug!(
            dataset = key.dataset_id,
            page = key.page_id,
            bytes = bytes.len(),
            "page written back"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Dataset, DatasetOpenSettings};
    use crate::import::{import_points, ImportRecord, ImportSettings};
    use tempfile::tempdir;

    /// Imports a dataset spread far enough apart to split into several pages.
    fn registry_with_pages(dir: &std::path::Path, id: u32) -> (Datasets, u32) {
        let records: Vec<ImportRecord> = (0..120)
            .map(|i| ImportRecord {
                position: [(i % 30) as f64 * 3.0, (i / 30) as f64 * 25.0, 0.0],
                ..ImportRecord::default()
            })
            .collect();
        let path = dir.join(format!("d{id}.spf"));
        let settings = ImportSettings {
            leaf_capacity: 16,
            ..ImportSettings::default()
        };
        let summary = import_points(&path, &records, &settings).unwrap();

        let mut registry = Datasets::new();
        registry
            .insert(Dataset::open(id, &path, DatasetOpenSettings::default()).unwrap())
            .unwrap();
        (registry, summary.page_count)
    }

    #[test]
    fn repeated_acquire_returns_the_same_instance() {
        let dir = tempdir().unwrap();
        let (mut registry, _) = registry_with_pages(dir.path(), 0);
        let mut cache = PageCache::new(4);

        let key = PageKey::new(0, 0);
        let a = cache.acquire(key, &mut registry).unwrap();
        let b = cache.acquire(key, &mut registry).unwrap();

        assert!(Arc::ptr_eq(&a, &b));

        a.write().set_layer(0, 77);
        assert_eq!(b.read().layer(0), 77);
    }

    #[test]
    fn residency_stays_within_capacity() {
        let dir = tempdir().unwrap();
        let (mut registry, pages) = registry_with_pages(dir.path(), 0);
        assert!(pages >= 4);

        let mut cache = PageCache::new(2);
        for page_id in 0..pages {
            let page = cache.acquire(PageKey::new(0, page_id), &mut registry).unwrap();
            drop(page);
            assert!(cache.resident() <= 2);
        }
    }

    #[test]
    fn held_pages_are_never_evicted() {
        let dir = tempdir().unwrap();
        let (mut registry, pages) = registry_with_pages(dir.path(), 0);
        assert!(pages >= 3);

        let mut cache = PageCache::new(1);
        let held = cache.acquire(PageKey::new(0, 0), &mut registry).unwrap();

        let _other = cache.acquire(PageKey::new(0, 1), &mut registry).unwrap();
        assert!(cache.contains(PageKey::new(0, 0)));
        assert!(cache.resident() > cache.capacity());

        drop(held);
        let _third = cache.acquire(PageKey::new(0, 2), &mut registry).unwrap();
        assert!(cache.resident() <= 2);
    }

    #[test]
    fn overrun_drains_once_holders_release() {
        let dir = tempdir().unwrap();
        let (mut registry, pages) = registry_with_pages(dir.path(), 0);
        assert!(pages >= 5);

        let mut cache = PageCache::new(2);
        let held: Vec<SharedPage> = (0..4)
            .map(|id| cache.acquire(PageKey::new(0, id), &mut registry).unwrap())
            .collect();
        assert_eq!(cache.resident(), 4);

        drop(held);

        // The first unheld miss shrinks the cache back to its bound instead
        // of trading one-for-one at the inflated size.
        let next = cache.acquire(PageKey::new(0, 4), &mut registry).unwrap();
        drop(next);
        assert!(cache.resident() <= 2);

        for page_id in 0..pages {
            drop(cache.acquire(PageKey::new(0, page_id), &mut registry).unwrap());
            assert!(cache.resident() <= 2);
        }
    }

    #[test]
    fn eviction_writes_back_modified_pages() {
        let dir = tempdir().unwrap();
        let (mut registry, pages) = registry_with_pages(dir.path(), 0);
        assert!(pages >= 2);

        let mut cache = PageCache::new(1);
        let key = PageKey::new(0, 0);

        {
            let page = cache.acquire(key, &mut registry).unwrap();
            page.write().set_classification(0, 42);
        }

        // Forces eviction of page 0.
        let _other = cache.acquire(PageKey::new(0, 1), &mut registry).unwrap();
        assert!(!cache.contains(key));

        let fresh = cache.acquire(key, &mut registry).unwrap();
        assert_eq!(fresh.read().classification(0), 42);
        assert!(!fresh.read().modified());
    }

    #[test]
    fn flush_persists_without_evicting() {
        let dir = tempdir().unwrap();
        let (mut registry, _) = registry_with_pages(dir.path(), 0);
        let mut cache = PageCache::new(4);
        let key = PageKey::new(0, 0);

        let page = cache.acquire(key, &mut registry).unwrap();
        page.write().set_elevation(1, 12.5);

        cache.flush(key, &mut registry).unwrap();
        assert!(cache.contains(key));
        assert!(!page.read().modified());

        let store = crate::store::PageStore::open(registry.get(0).unwrap().path()).unwrap();
        let mut reread = Page::new(0, 0);
        reread.read(&store).unwrap();
        assert_eq!(reread.elevation(1), 12.5);
    }

    #[test]
    fn remove_dataset_flushes_and_forgets() {
        let dir = tempdir().unwrap();
        let (mut registry, _) = registry_with_pages(dir.path(), 0);
        let mut cache = PageCache::new(4);
        let key = PageKey::new(0, 0);

        {
            let page = cache.acquire(key, &mut registry).unwrap();
            page.write().set_layer(2, 9);
        }

        cache.remove_dataset(0, &mut registry).unwrap();
        assert_eq!(cache.resident(), 0);

        let fresh = cache.acquire(key, &mut registry).unwrap();
        assert_eq!(fresh.read().layer(2), 9);
    }

    #[test]
    fn unknown_dataset_is_invalid_selector() {
        let dir = tempdir().unwrap();
        let (mut registry, _) = registry_with_pages(dir.path(), 0);
        let mut cache = PageCache::new(4);

        assert!(matches!(
            cache.acquire(PageKey::new(5, 0), &mut registry),
            Err(Error::InvalidSelector(_))
        ));
    }

    #[test]
    fn resilient_acquire_skips_what_it_cannot_read() {
        let dir = tempdir().unwrap();
        let (mut registry, pages) = registry_with_pages(dir.path(), 0);
        let mut cache = PageCache::new(4);

        // Out-of-range page id fails the directory lookup.
        let skipped = cache
            .acquire_resilient(PageKey::new(0, pages + 7), &mut registry)
            .unwrap();
        assert!(skipped.is_none());

        // A closed dataset is stale, not an error.
        let stale = cache
            .acquire_resilient(PageKey::new(5, 0), &mut registry)
            .unwrap();
        assert!(stale.is_none());

        let good = cache
            .acquire_resilient(PageKey::new(0, 0), &mut registry)
            .unwrap();
        assert!(good.is_some());
    }
}
