//! # Query Cursor
//!
//! The one road to point data. A [`Query`] binds a predicate ([`Where`]) to
//! an editor session, plans the set of candidate pages by walking each
//! dataset's octree, and then iterates matching points through a cursor,
//! faulting pages in and out of the shared cache as it goes. Reads and edits
//! both happen at the cursor position; there is no bulk array access.
//!
//! ## Execution
//!
//! ```text
//! set_where(w)      store the predicate, drop any previous plan
//! exec()            octree traversal per dataset -> candidate page list
//! next_point()?     advance the cursor; loads + selects pages on demand
//!   x(), layer()    read the current point
//!   set_layer(v)    edit the current point (page marked modified)
//! flush()?          write back every page this query edited
//! ```
//!
//! ## Determinism
//!
//! Candidates are collected per dataset in registry order, and within a
//! dataset in the octree's depth-first leaf order, which is also increasing
//! page-id order. Two executions of the same predicate over the same session
//! visit identical points in identical order.
//!
//! ## Resilience
//!
//! A page that fails to load mid-scan (truncated file, checksum mismatch) is
//! logged and skipped; the scan completes over the readable remainder. Only
//! failures that risk losing edits elsewhere, such as an eviction write-back
//! error, abort the scan.
//!
//! ## Cursor Contract
//!
//! Point accessors ([`x`](Query::x), [`classification`](Query::classification)
//! and friends) require a positioned cursor: the last
//! [`next_point`](Query::next_point) returned `true`. Calling them otherwise
//! panics; it is a caller bug on the order of indexing out of bounds, not a
//! recoverable condition. Introspection methods ([`dataset_id`](Query::dataset_id),
//! [`page`](Query::page)) return `Option` instead and never panic.
//!
//! Two queries interleaving point iteration over the same page would clobber
//! each other's selection masks; sessions serialize heavy queries through the
//! worker, and render consumers read the mask single-threaded.

mod predicate;

pub use predicate::{ClassificationSet, LayerSet, Where};

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cache::SharedPage;
use crate::config::STEP_TIME_BUDGET;
use crate::dataset::Dataset;
use crate::editor::EditorState;
use crate::error::Result;
use crate::index::LeafHit;
use crate::page::{Page, PageKey, PageState};

const CURSOR_CONTRACT: &str =
    "query cursor is not positioned; call next_point() until it returns true";

/// One matched leaf of one dataset, in execution order.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    dataset_id: u32,
    hit: LeafHit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// No plan; `exec` has not run since construction or the last `set_where`.
    Idle,
    /// A plan exists and the cursor may advance.
    Executing,
    /// The cursor ran off the end of the plan.
    Exhausted,
}

struct CurrentPage {
    key: PageKey,
    page: SharedPage,
    /// Position in the page's selection mask; `usize::MAX` before the first
    /// point.
    point: usize,
}

/// Stateful cursor over every point matching a predicate.
pub struct Query {
    core: Arc<Mutex<EditorState>>,
    where_: Where,
    candidates: Vec<Candidate>,
    phase: Phase,
    /// Index into `candidates` of the current page; `usize::MAX` before the
    /// first page.
    page_cursor: usize,
    current: Option<CurrentPage>,
    /// Index into `candidates` for phased state stepping.
    state_cursor: usize,
    /// Pages this query has edited and not yet flushed.
    touched: Vec<PageKey>,
    max_results: Option<usize>,
    result_count: usize,
}

impl Query {
    pub(crate) fn new(core: Arc<Mutex<EditorState>>) -> Self {
        Self {
            core,
            where_: Where::new(),
            candidates: Vec::new(),
            phase: Phase::Idle,
            page_cursor: usize::MAX,
            current: None,
            state_cursor: 0,
            touched: Vec::new(),
            max_results: None,
            result_count: 0,
        }
    }

    /// Replaces the predicate and drops the current plan. Pending edits stay
    /// marked; a later [`flush`](Self::flush) still writes them.
    pub fn set_where(&mut self, where_: Where) {
        self.where_ = where_;
        self.candidates.clear();
        self.rewind();
        self.phase = Phase::Idle;
    }

    pub fn where_clause(&self) -> &Where {
        &self.where_
    }

    /// Plans the query: walks each traversed dataset's octree and collects
    /// the leaves its region touches, then rewinds the cursor.
    ///
    /// With an explicit dataset list in the predicate, exactly those ids are
    /// traversed, enabled or not; ids that are not open match nothing.
    /// Without a list, every enabled dataset is traversed in registry order.
    pub fn exec(&mut self) {
        self.candidates.clear();
        self.rewind();

        let core_handle = Arc::clone(&self.core);
        let core = core_handle.lock();

        match self.where_.datasets() {
            Some(ids) => {
                for &id in ids {
                    if let Some(dataset) = core.datasets.get(id) {
                        collect_hits(&self.where_, dataset, &mut self.candidates);
                    }
                }
            }
            None => {
                for dataset in core.datasets.iter().filter(|d| d.is_enabled()) {
                    collect_hits(&self.where_, dataset, &mut self.candidates);
                }
            }
        }

        drop(core);

        self.phase = Phase::Executing;
        debug!(pages = self.candidates.len(), "query planned");
    }

    /// Advances to the next candidate page, acquiring it and computing its
    /// selection mask. Pages that fail to load are skipped. Returns `false`
    /// when no candidate remains.
    ///
    /// Point iteration calls this internally; calling it directly suits
    /// whole-page consumers like the renderer.
    pub fn next_page(&mut self) -> Result<bool> {
        self.current = None;

        if self.phase != Phase::Executing {
            return Ok(false);
        }

        loop {
            let next = self.page_cursor.wrapping_add(1);
            if next >= self.candidates.len() {
                self.phase = Phase::Exhausted;
                return Ok(false);
            }
            self.page_cursor = next;

            let candidate = self.candidates[next];
            let key = PageKey::new(candidate.dataset_id, candidate.hit.page);

            let acquired = {
                let mut core = self.core.lock();
                core.acquire_page(key)?
            };
            let Some(shared) = acquired else { continue };

            shared.write().select(&self.where_, candidate.hit.partial);

            self.current = Some(CurrentPage {
                key,
                page: shared,
                point: usize::MAX,
            });
            return Ok(true);
        }
    }

    /// Advances the cursor to the next matching point, crossing page
    /// boundaries as needed. Returns `false` once every match was visited
    /// or the result budget is spent.
    pub fn next_point(&mut self) -> Result<bool> {
        if let Some(max) = self.max_results {
            if self.result_count >= max {
                return Ok(false);
            }
        }

        loop {
            if let Some(current) = &mut self.current {
                let next = current.point.wrapping_add(1);
                if next < current.page.read().selection_len() {
                    current.point = next;
                    self.result_count += 1;
                    return Ok(true);
                }
            }

            if !self.next_page()? {
                return Ok(false);
            }
        }
    }

    /// Rewinds the cursor over the existing plan without re-traversing the
    /// octrees. The predicate and any pending edits are untouched.
    pub fn reset(&mut self) {
        self.rewind();
        if self.phase == Phase::Exhausted {
            self.phase = Phase::Executing;
        }
    }

    /// Drops the plan and the predicate, returning the query to its
    /// just-constructed state. Edits already made remain marked on their
    /// pages and still reach disk through [`flush`](Self::flush) or
    /// eviction.
    pub fn clear(&mut self) {
        self.candidates.clear();
        self.where_ = Where::new();
        self.rewind();
        self.phase = Phase::Idle;
    }

    fn rewind(&mut self) {
        self.current = None;
        self.page_cursor = usize::MAX;
        self.state_cursor = 0;
        self.result_count = 0;
    }

    /// Caps how many points [`next_point`](Self::next_point) yields; `None`
    /// removes the cap. Interactive previews use this to stay responsive on
    /// predicates that match millions of points.
    pub fn set_maximum_results(&mut self, limit: Option<usize>) {
        self.max_results = limit;
    }

    /// Points yielded since the last plan or rewind.
    pub fn result_count(&self) -> usize {
        self.result_count
    }

    /// Candidate pages in the current plan.
    pub fn candidate_pages(&self) -> usize {
        self.candidates.len()
    }

    /// Pages finished by phased stepping out of the total planned, for
    /// progress reporting.
    pub fn progress(&self) -> (usize, usize) {
        (
            self.state_cursor.min(self.candidates.len()),
            self.candidates.len(),
        )
    }

    /// Rewinds every resident candidate page to `state` and restarts phased
    /// stepping from the first page. The renderer drops pages back to
    /// [`PageState::Transformed`] after a predicate change, forcing
    /// re-selection without re-reading anything from disk.
    pub fn set_state(&mut self, state: PageState) {
        let core = self.core.lock();
        for candidate in &self.candidates {
            let key = PageKey::new(candidate.dataset_id, candidate.hit.page);
            if let Some(page) = core.cache.peek(key) {
                page.write().set_state(state);
            }
        }
        drop(core);
        self.state_cursor = 0;
    }

    /// Runs page state machines for one time-boxed step.
    ///
    /// Pages advance in plan order, each stepping `Empty -> Loaded ->
    /// Transformed -> Selected -> Rendered`. The call returns `true` while
    /// work remains, holding the session lock for at most about one step
    /// budget so interactive work interleaves; the caller (usually the
    /// worker thread) keeps calling until `false`. Pages that fail mid-step
    /// are logged and skipped.
    pub fn next_state(&mut self) -> Result<bool> {
        if self.phase == Phase::Idle {
            return Ok(false);
        }

        let started = Instant::now();
        let mut core = self.core.lock();

        while self.state_cursor < self.candidates.len() {
            let candidate = self.candidates[self.state_cursor];
            let key = PageKey::new(candidate.dataset_id, candidate.hit.page);

            let Some(shared) = core.acquire_page(key)? else {
                self.state_cursor += 1;
                continue;
            };
            let Some(dataset) = core.datasets.get(candidate.dataset_id) else {
                self.state_cursor += 1;
                continue;
            };

            let mut page = shared.write();
            loop {
                match page.next_state(
                    dataset.store(),
                    dataset.translation(),
                    &self.where_,
                    candidate.hit.partial,
                ) {
                    Ok(true) => {
                        if started.elapsed() >= STEP_TIME_BUDGET {
                            return Ok(true);
                        }
                    }
                    Ok(false) => {
                        self.state_cursor += 1;
                        break;
                    }
                    Err(e) => {
                        warn!(
                            dataset = key.dataset_id,
                            page = key.page_id,
                            error = %e,
                            "state step failed; skipping page"
                        );
                        self.state_cursor += 1;
                        break;
                    }
                }
            }

            if started.elapsed() >= STEP_TIME_BUDGET {
                return Ok(self.state_cursor < self.candidates.len());
            }
        }

        Ok(false)
    }

    /// Writes back every page this query edited, in key order. On failure
    /// the remaining marks are kept so a retry flushes the rest.
    pub fn flush(&mut self) -> Result<()> {
        if self.touched.is_empty() {
            return Ok(());
        }

        let mut core = self.core.lock();
        let state = &mut *core;

        self.touched.sort_unstable();
        for &key in &self.touched {
            state.cache.flush(key, &mut state.datasets)?;
        }
        self.touched.clear();
        Ok(())
    }

    // Cursor position introspection; total order is (registry order,
    // page id, mask position).

    pub fn dataset_id(&self) -> Option<u32> {
        self.current.as_ref().map(|c| c.key.dataset_id)
    }

    pub fn page_id(&self) -> Option<u32> {
        self.current.as_ref().map(|c| c.key.page_id)
    }

    /// Shared handle to the current page, for render buffer access.
    pub fn page(&self) -> Option<SharedPage> {
        self.current.as_ref().map(|c| Arc::clone(&c.page))
    }

    /// Matching points in the current page.
    pub fn selection_size(&self) -> Option<usize> {
        self.current
            .as_ref()
            .map(|c| c.page.read().selection_len())
    }

    /// All points in the current page, matching or not.
    pub fn page_point_count(&self) -> Option<usize> {
        self.current.as_ref().map(|c| c.page.read().point_count())
    }

    // Point accessors; all panic without a positioned cursor.

    pub fn position(&self) -> [f64; 3] {
        self.with_point(|page, i| page.position(i))
    }

    pub fn x(&self) -> f64 {
        self.with_point(|page, i| page.x(i))
    }

    pub fn y(&self) -> f64 {
        self.with_point(|page, i| page.y(i))
    }

    pub fn z(&self) -> f64 {
        self.with_point(|page, i| page.z(i))
    }

    pub fn intensity(&self) -> f64 {
        self.with_point(|page, i| page.intensity(i))
    }

    pub fn return_number(&self) -> u8 {
        self.with_point(|page, i| page.return_number(i))
    }

    pub fn number_of_returns(&self) -> u8 {
        self.with_point(|page, i| page.number_of_returns(i))
    }

    pub fn classification(&self) -> u8 {
        self.with_point(|page, i| page.classification(i))
    }

    pub fn user_data(&self) -> u8 {
        self.with_point(|page, i| page.user_data(i))
    }

    pub fn gps_time(&self) -> f64 {
        self.with_point(|page, i| page.gps_time(i))
    }

    pub fn color(&self) -> [f64; 3] {
        self.with_point(|page, i| page.color(i))
    }

    pub fn layer(&self) -> u32 {
        self.with_point(|page, i| page.layer(i))
    }

    pub fn elevation(&self) -> f64 {
        self.with_point(|page, i| page.elevation(i))
    }

    pub fn descriptor(&self) -> f64 {
        self.with_point(|page, i| page.descriptor(i))
    }

    pub fn density(&self) -> f64 {
        self.with_point(|page, i| page.density(i))
    }

    // Point mutators; the page is marked modified and remembered for flush.

    pub fn set_classification(&mut self, v: u8) {
        self.with_point_mut(|page, i| page.set_classification(i, v));
    }

    pub fn set_layer(&mut self, v: u32) {
        self.with_point_mut(|page, i| page.set_layer(i, v));
    }

    pub fn set_elevation(&mut self, v: f64) {
        self.with_point_mut(|page, i| page.set_elevation(i, v));
    }

    pub fn set_descriptor(&mut self, v: f64) {
        self.with_point_mut(|page, i| page.set_descriptor(i, v));
    }

    pub fn set_density(&mut self, v: f64) {
        self.with_point_mut(|page, i| page.set_density(i, v));
    }

    /// Marks the current page modified without changing a value; algorithms
    /// that edit through [`page`](Self::page) directly call this so the edit
    /// reaches disk.
    pub fn set_modified(&mut self) {
        self.with_point_mut(|page, _| page.set_modified(true));
    }

    fn with_point<R>(&self, f: impl FnOnce(&Page, usize) -> R) -> R {
        let current = self.current.as_ref().expect(CURSOR_CONTRACT);
        let page = current.page.read();
        let i = *page.selection().get(current.point).expect(CURSOR_CONTRACT);
        f(&page, i as usize)
    }

    fn with_point_mut<R>(&mut self, f: impl FnOnce(&mut Page, usize) -> R) -> R {
        let (key, point, shared) = {
            let current = self.current.as_ref().expect(CURSOR_CONTRACT);
            (current.key, current.point, Arc::clone(&current.page))
        };

        let mut page = shared.write();
        let i = *page.selection().get(point).expect(CURSOR_CONTRACT);
        let result = f(&mut page, i as usize);
        drop(page);

        if !self.touched.contains(&key) {
            self.touched.push(key);
        }
        result
    }
}

/// Collects `dataset`'s leaves touched by the predicate's region, with the
/// region moved into the dataset's file coordinates first.
fn collect_hits(where_: &Where, dataset: &Dataset, out: &mut Vec<Candidate>) {
    let t = dataset.translation();
    let region_local = where_.region().translated([-t[0], -t[1], -t[2]]);

    for hit in dataset.index().select_nodes(&region_local) {
        out.push(Candidate {
            dataset_id: dataset.id(),
            hit,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PageCache;
    use crate::dataset::{Dataset, DatasetOpenSettings, Datasets};
    use crate::geometry::Box3;
    use crate::import::{import_points, ImportRecord, ImportSettings};
    use std::path::Path;
    use tempfile::tempdir;

    /// 10 x `rows` grid at unit spacing, shifted by `origin`.
    fn grid_records(rows: usize, origin: [f64; 3]) -> Vec<ImportRecord> {
        (0..rows * 10)
            .map(|i| ImportRecord {
                position: [
                    origin[0] + (i % 10) as f64,
                    origin[1] + (i / 10) as f64,
                    origin[2],
                ],
                intensity: 0.5,
                classification: 1,
                ..ImportRecord::default()
            })
            .collect()
    }

    fn session(
        dir: &Path,
        datasets: Vec<(u32, [f64; 3], Vec<ImportRecord>)>,
    ) -> Arc<Mutex<EditorState>> {
        let mut registry = Datasets::new();
        for (id, translation, records) in datasets {
            let path = dir.join(format!("d{id}.spf"));
            let settings = ImportSettings {
                leaf_capacity: 16,
                ..ImportSettings::default()
            };
            import_points(&path, &records, &settings).unwrap();

            let open = DatasetOpenSettings {
                translation,
                ..DatasetOpenSettings::default()
            };
            registry
                .insert(Dataset::open(id, &path, open).unwrap())
                .unwrap();
        }

        Arc::new(Mutex::new(EditorState {
            datasets: registry,
            cache: PageCache::new(64),
            view: Where::new(),
            label: String::new(),
        }))
    }

    #[test]
    fn full_scan_visits_every_point_in_a_stable_order() {
        let dir = tempdir().unwrap();
        let core = session(
            dir.path(),
            vec![
                (0, [0.0; 3], grid_records(4, [0.0; 3])),
                (1, [0.0; 3], grid_records(3, [50.0, 0.0, 0.0])),
            ],
        );

        let mut first = Vec::new();
        let mut query = Query::new(Arc::clone(&core));
        query.exec();
        while query.next_point().unwrap() {
            first.push((query.dataset_id().unwrap(), query.x(), query.y()));
        }
        assert_eq!(first.len(), 70);
        assert_eq!(query.result_count(), 70);

        // Dataset 0 in full before dataset 1.
        let split = first.iter().position(|&(d, _, _)| d == 1).unwrap();
        assert_eq!(split, 40);
        assert!(first[split..].iter().all(|&(d, _, _)| d == 1));

        let mut second = Vec::new();
        query.reset();
        while query.next_point().unwrap() {
            second.push((query.dataset_id().unwrap(), query.x(), query.y()));
        }
        assert_eq!(first, second);
    }

    #[test]
    fn box_region_restricts_the_scan() {
        let dir = tempdir().unwrap();
        let core = session(dir.path(), vec![(0, [0.0; 3], grid_records(10, [0.0; 3]))]);

        let mut where_ = Where::new();
        where_.set_box(Box3::new([2.0, 3.0, -1.0], [5.0, 6.0, 1.0]));

        let mut query = Query::new(core);
        query.set_where(where_);
        query.exec();

        let mut seen = 0;
        while query.next_point().unwrap() {
            let p = query.position();
            assert!((2.0..=5.0).contains(&p[0]));
            assert!((3.0..=6.0).contains(&p[1]));
            seen += 1;
        }
        // x in {2,3,4,5} and y in {3,4,5,6}.
        assert_eq!(seen, 16);
    }

    #[test]
    fn region_follows_the_dataset_translation() {
        let dir = tempdir().unwrap();
        // Points at file x in 0..10 but placed at world x in 1000..1010.
        let core = session(
            dir.path(),
            vec![(0, [1000.0, 0.0, 0.0], grid_records(2, [0.0; 3]))],
        );

        let mut where_ = Where::new();
        where_.set_box(Box3::new([1000.0, 0.0, -1.0], [1003.0, 1.0, 1.0]));

        let mut query = Query::new(core);
        query.set_where(where_);
        query.exec();

        let mut seen = 0;
        while query.next_point().unwrap() {
            assert!(query.x() >= 1000.0);
            assert!(query.x() <= 1003.0);
            seen += 1;
        }
        // x in {1000..1003} and y in {0, 1}.
        assert_eq!(seen, 8);
    }

    #[test]
    fn disabled_datasets_are_skipped_unless_named() {
        let dir = tempdir().unwrap();
        let core = session(
            dir.path(),
            vec![
                (0, [0.0; 3], grid_records(2, [0.0; 3])),
                (1, [0.0; 3], grid_records(3, [50.0, 0.0, 0.0])),
            ],
        );
        core.lock().datasets.get_mut(1).unwrap().set_enabled(false);

        let mut query = Query::new(Arc::clone(&core));
        query.exec();
        let mut seen = 0;
        while query.next_point().unwrap() {
            assert_eq!(query.dataset_id(), Some(0));
            seen += 1;
        }
        assert_eq!(seen, 20);

        // Naming the dataset overrides the enabled flag.
        let mut where_ = Where::new();
        where_.set_datasets(Some(vec![1]));
        query.set_where(where_);
        query.exec();
        let mut named = 0;
        while query.next_point().unwrap() {
            assert_eq!(query.dataset_id(), Some(1));
            named += 1;
        }
        assert_eq!(named, 30);
    }

    #[test]
    fn stale_dataset_ids_match_nothing() {
        let dir = tempdir().unwrap();
        let core = session(dir.path(), vec![(0, [0.0; 3], grid_records(2, [0.0; 3]))]);

        let mut where_ = Where::new();
        where_.set_datasets(Some(vec![9]));

        let mut query = Query::new(core);
        query.set_where(where_);
        query.exec();
        assert!(!query.next_point().unwrap());
        assert_eq!(query.result_count(), 0);
    }

    #[test]
    fn max_results_caps_the_scan() {
        let dir = tempdir().unwrap();
        let core = session(dir.path(), vec![(0, [0.0; 3], grid_records(10, [0.0; 3]))]);

        let mut query = Query::new(core);
        query.set_maximum_results(Some(25));
        query.exec();

        let mut seen = 0;
        while query.next_point().unwrap() {
            seen += 1;
        }
        assert_eq!(seen, 25);
        assert_eq!(query.result_count(), 25);
    }

    #[test]
    fn edits_reach_disk_through_flush() {
        let dir = tempdir().unwrap();
        let core = session(dir.path(), vec![(0, [0.0; 3], grid_records(4, [0.0; 3]))]);
        let store_path = core.lock().datasets.get(0).unwrap().path().to_path_buf();

        let mut where_ = Where::new();
        where_.set_box(Box3::new([0.0, 0.0, -1.0], [3.0, 0.0, 1.0]));

        let mut query = Query::new(Arc::clone(&core));
        query.set_where(where_);
        query.exec();
        while query.next_point().unwrap() {
            query.set_classification(5);
            query.set_layer(2);
        }
        assert_eq!(query.result_count(), 4);
        query.flush().unwrap();

        // Fresh store, fresh pages: the edits must come back from disk.
        let store = crate::store::PageStore::open(&store_path).unwrap();
        let mut relabeled = 0;
        for page_id in 0..store.page_count() {
            let mut page = Page::new(0, page_id);
            page.read(&store).unwrap();
            for i in 0..page.point_count() {
                if page.classification(i) == 5 {
                    assert_eq!(page.layer(i), 2);
                    assert_eq!(page.y(i), 0.0);
                    assert!(page.x(i) <= 3.0);
                    relabeled += 1;
                }
            }
        }
        assert_eq!(relabeled, 4);
    }

    #[test]
    fn phased_stepping_finishes_every_candidate() {
        let dir = tempdir().unwrap();
        let core = session(dir.path(), vec![(0, [0.0; 3], grid_records(10, [0.0; 3]))]);

        let mut query = Query::new(Arc::clone(&core));
        query.exec();
        assert!(query.candidate_pages() > 1);

        while query.next_state().unwrap() {}
        let (done, total) = query.progress();
        assert_eq!(done, total);

        // Every candidate page ended fully processed and resident.
        let state = core.lock();
        for candidate in &query.candidates {
            let key = PageKey::new(candidate.dataset_id, candidate.hit.page);
            let page = state.cache.peek(key).unwrap();
            assert_eq!(page.read().state(), PageState::Rendered);
            assert!(!page.read().render_position().is_empty());
        }
    }

    #[test]
    fn set_state_restarts_phased_stepping() {
        let dir = tempdir().unwrap();
        let core = session(dir.path(), vec![(0, [0.0; 3], grid_records(6, [0.0; 3]))]);

        let mut query = Query::new(Arc::clone(&core));
        query.exec();
        while query.next_state().unwrap() {}

        query.set_state(PageState::Transformed);
        let (done, total) = query.progress();
        assert_eq!(done, 0);
        assert!(total > 0);

        while query.next_state().unwrap() {}
        let state = core.lock();
        for candidate in &query.candidates {
            let key = PageKey::new(candidate.dataset_id, candidate.hit.page);
            let page = state.cache.peek(key).unwrap();
            assert_eq!(page.read().state(), PageState::Rendered);
        }
    }

    #[test]
    fn cursor_survives_a_small_cache() {
        let dir = tempdir().unwrap();
        let core = session(dir.path(), vec![(0, [0.0; 3], grid_records(10, [0.0; 3]))]);
        core.lock().cache = PageCache::new(2);

        let mut query = Query::new(core);
        query.exec();
        assert!(query.candidate_pages() > 2);

        let mut seen = 0;
        while query.next_point().unwrap() {
            let _ = query.z();
            seen += 1;
        }
        assert_eq!(seen, 100);
    }

    #[test]
    #[should_panic(expected = "query cursor is not positioned")]
    fn accessors_demand_a_positioned_cursor() {
        let dir = tempdir().unwrap();
        let core = session(dir.path(), vec![(0, [0.0; 3], grid_records(2, [0.0; 3]))]);

        let query = Query::new(core);
        let _ = query.x();
    }

    #[test]
    fn exhausted_query_reports_no_position() {
        let dir = tempdir().unwrap();
        let core = session(dir.path(), vec![(0, [0.0; 3], grid_records(2, [0.0; 3]))]);

        let mut query = Query::new(core);
        query.exec();
        while query.next_point().unwrap() {}

        assert_eq!(query.dataset_id(), None);
        assert!(query.page().is_none());
        assert_eq!(query.selection_size(), None);
    }
}
