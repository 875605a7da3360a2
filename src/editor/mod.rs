//! # Editor Facade
//!
//! The facade that owns everything a running editor session shares: the
//! dataset registry, the page cache, and the view-level filters. All of it
//! sits behind one coarse mutex.
//!
//! ## Concurrency Contract
//!
//! The lock is coarse by design: queries, the paging worker, and the GUI
//! thread take it for one short step at a time (load one page, advance one
//! state, flush one key) and release it between steps, so a long-running
//! scan never starves interactive work for more than a single step. Page
//! contents live behind their own per-page `RwLock`, which means point
//! accessors on an already-acquired page never touch the editor lock at all.
//!
//! Lock order is editor lock first, page lock second. No code path takes
//! them in the other order, so the two levels cannot deadlock.
//!
//! ## Usage Example
//!
//! ```ignore
//! use silvadb::{DatasetOpenSettings, Editor};
//!
//! let editor = Editor::builder().cache_capacity(64).build();
//! let id = editor.open_dataset("plot42.spf", DatasetOpenSettings::default())?;
//!
//! let mut query = editor.query();
//! query.exec();
//! while query.next_point()? {
//!     // read or edit the current point
//! }
//! query.flush()?;
//! editor.save_project("plot42.json")?;
//! ```

mod builder;

pub use builder::EditorBuilder;

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::cache::{PageCache, SharedPage};
use crate::context::Context;
use crate::dataset::{Dataset, DatasetOpenSettings, DatasetSettings, Datasets};
use crate::error::{Error, Result};
use crate::geometry::{Box3, Region};
use crate::page::PageKey;
use crate::project::ProjectFile;
use crate::query::{ClassificationSet, LayerSet, Query, Where};

/// Everything behind the editor's coarse lock.
pub(crate) struct EditorState {
    pub(crate) datasets: Datasets,
    pub(crate) cache: PageCache,
    pub(crate) view: Where,
    pub(crate) label: String,
}

impl EditorState {
    /// Loads the page for a query step, skipping pages that cannot be read.
    ///
    /// `Ok(None)` means the requested page is unreadable or its dataset is
    /// gone, and the scan should move on. `Err` means an eviction write-back
    /// failed, which risks losing edits and must stop the caller.
    pub(crate) fn acquire_page(&mut self, key: PageKey) -> Result<Option<SharedPage>> {
        self.cache.acquire_resilient(key, &mut self.datasets)
    }
}

/// Shared handle to one editor session.
///
/// Cloning is cheap and every clone works on the same session; hand clones
/// to worker threads rather than wrapping the editor in another lock.
#[derive(Clone)]
pub struct Editor {
    core: Arc<Mutex<EditorState>>,
    context: Arc<Context>,
}

impl Editor {
    pub fn builder() -> EditorBuilder {
        EditorBuilder::new()
    }

    pub(crate) fn with_capacity(cache_capacity: usize, context: Arc<Context>) -> Self {
        Self {
            core: Arc::new(Mutex::new(EditorState {
                datasets: Datasets::new(),
                cache: PageCache::new(cache_capacity),
                view: Where::new(),
                label: String::new(),
            })),
            context,
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Opens the point file at `path` and adds it to the session under the
    /// smallest free dataset id, which is returned.
    ///
    /// With `center_on_open` set and other datasets already open, the given
    /// translation is replaced so the new dataset's center lands on the
    /// current project center. Scans from separate field campaigns rarely
    /// share an origin; centering makes the second scan show up next to the
    /// first instead of kilometers away.
    pub fn open_dataset<P: AsRef<Path>>(
        &self,
        path: P,
        settings: DatasetOpenSettings,
    ) -> Result<u32> {
        let mut core = self.core.lock();

        let id = core.datasets.next_id();
        let center = settings.center_on_open;
        let mut dataset = Dataset::open(id, path, settings)?;

        if center && !core.datasets.is_empty() {
            let project = core.datasets.boundary();
            if !project.is_empty() {
                let pc = project.center();
                let fc = dataset.boundary().center();
                dataset.set_translation([pc[0] - fc[0], pc[1] - fc[1], pc[2] - fc[2]]);
            }
        }

        core.datasets.insert(dataset)?;
        Ok(id)
    }

    /// Flushes and drops the dataset's cached pages, then forgets it.
    pub fn close_dataset(&self, id: u32) -> Result<()> {
        let mut core = self.core.lock();
        let state = &mut *core;

        if !state.datasets.contains(id) {
            return Err(Error::InvalidSelector(format!("dataset {id} is not open")));
        }

        state.cache.remove_dataset(id, &mut state.datasets)?;
        state.datasets.remove(id);
        debug!(id, "dataset closed");
        Ok(())
    }

    pub fn dataset_count(&self) -> usize {
        self.core.lock().datasets.len()
    }

    /// Dataset ids in the order queries traverse them.
    pub fn dataset_ids(&self) -> Vec<u32> {
        self.core.lock().datasets.iter().map(|d| d.id()).collect()
    }

    /// Snapshot of one dataset's persisted settings.
    pub fn dataset_settings(&self, id: u32) -> Option<DatasetSettings> {
        self.core.lock().datasets.get(id).map(|d| d.settings())
    }

    pub fn set_dataset_enabled(&self, id: u32, enabled: bool) -> Result<()> {
        let mut core = self.core.lock();
        let dataset = core
            .datasets
            .get_mut(id)
            .ok_or_else(|| Error::InvalidSelector(format!("dataset {id} is not open")))?;
        dataset.set_enabled(enabled);
        Ok(())
    }

    pub fn set_dataset_label(&self, id: u32, label: impl Into<String>) -> Result<()> {
        let mut core = self.core.lock();
        let dataset = core
            .datasets
            .get_mut(id)
            .ok_or_else(|| Error::InvalidSelector(format!("dataset {id} is not open")))?;
        dataset.set_label(label);
        Ok(())
    }

    /// Moves a dataset in project space.
    ///
    /// Resident pages were transformed with the old placement, so they are
    /// flushed and dropped first; pages loaded afterward pick up the new
    /// translation.
    pub fn set_dataset_translation(&self, id: u32, translation: [f64; 3]) -> Result<()> {
        let mut core = self.core.lock();
        let state = &mut *core;

        if !state.datasets.contains(id) {
            return Err(Error::InvalidSelector(format!("dataset {id} is not open")));
        }

        state.cache.remove_dataset(id, &mut state.datasets)?;
        if let Some(dataset) = state.datasets.get_mut(id) {
            dataset.set_translation(translation);
        }
        Ok(())
    }

    /// Union boundary of every open dataset in project space.
    pub fn boundary(&self) -> Box3 {
        self.core.lock().datasets.boundary()
    }

    pub fn point_count(&self) -> u64 {
        self.core.lock().datasets.point_count()
    }

    /// Classification codes the view shows. Stored on the session; render
    /// queries pick it up through [`query_view`](Self::query_view).
    pub fn set_classifications_enabled(&self, set: ClassificationSet) {
        self.core.lock().view.set_classifications(set);
    }

    /// Layers the view shows.
    pub fn set_layers_enabled(&self, set: LayerSet) {
        self.core.lock().view.set_layers(set);
    }

    /// Region the view clips to; [`Region::None`] shows everything.
    pub fn set_clip_region(&self, region: Region) {
        self.core.lock().view.set_region(region);
    }

    /// Current view filters as a predicate, for callers building their own
    /// render query.
    pub fn view_where(&self) -> Where {
        self.core.lock().view.clone()
    }

    /// A fresh query over this session with an empty predicate.
    pub fn query(&self) -> Query {
        Query::new(Arc::clone(&self.core))
    }

    /// A query seeded with the session's view filters.
    pub fn query_view(&self) -> Query {
        let mut query = self.query();
        query.set_where(self.view_where());
        query
    }

    /// Acquires one page directly, bypassing query traversal. Used by render
    /// consumers that already know the page id; all load errors propagate.
    pub fn page(&self, key: PageKey) -> Result<SharedPage> {
        let mut core = self.core.lock();
        let state = &mut *core;
        state.cache.acquire(key, &mut state.datasets)
    }

    /// Writes every modified resident page back to its store.
    pub fn flush_all(&self) -> Result<()> {
        let mut core = self.core.lock();
        let state = &mut *core;
        state.cache.flush_all(&mut state.datasets)
    }

    pub fn cache_capacity(&self) -> usize {
        self.core.lock().cache.capacity()
    }

    pub fn cache_resident(&self) -> usize {
        self.core.lock().cache.resident()
    }

    pub fn project_label(&self) -> String {
        self.core.lock().label.clone()
    }

    pub fn set_project_label(&self, label: impl Into<String>) {
        self.core.lock().label = label.into();
    }

    /// Replaces the session with the project recorded at `path`.
    ///
    /// Every dataset named by the project file is reopened before the
    /// current session is touched; a project that fails to open leaves the
    /// session as it was. Modified pages of the outgoing session are
    /// flushed before the swap.
    pub fn open_project<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let project = ProjectFile::load(&path)?;

        let mut incoming = Datasets::new();
        for settings in &project.datasets {
            incoming.insert(Dataset::from_settings(settings)?)?;
        }

        let mut core = self.core.lock();
        let state = &mut *core;
        state.cache.clear(&mut state.datasets)?;
        state.datasets = incoming;
        state.label = project.label;

        debug!(
            path = %path.as_ref().display(),
            datasets = state.datasets.len(),
            "project opened"
        );
        Ok(())
    }

    /// Flushes modified pages and writes the session's project file.
    ///
    /// Flushing first keeps the pair on disk consistent: a project file
    /// never points at stores missing edits the session already made.
    pub fn save_project<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let project = {
            let mut core = self.core.lock();
            let state = &mut *core;
            state.cache.flush_all(&mut state.datasets)?;

            ProjectFile {
                version: ProjectFile::VERSION,
                label: state.label.clone(),
                datasets: state.datasets.iter().map(|d| d.settings()).collect(),
            }
        };

        project.save(path)
    }
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.core.lock();
        f.debug_struct("Editor")
            .field("datasets", &core.datasets.len())
            .field("cache_resident", &core.cache.resident())
            .field("cache_capacity", &core.cache.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::{import_points, ImportRecord, ImportSettings};
    use tempfile::tempdir;

    fn import_grid(path: &Path, n: usize, origin: [f64; 3]) {
        let records: Vec<ImportRecord> = (0..n)
            .map(|i| ImportRecord {
                position: [
                    origin[0] + (i % 10) as f64,
                    origin[1] + (i / 10) as f64,
                    origin[2],
                ],
                ..ImportRecord::default()
            })
            .collect();
        import_points(path, &records, &ImportSettings::default()).unwrap();
    }

    #[test]
    fn open_assigns_the_smallest_free_id() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.spf");
        let b = dir.path().join("b.spf");
        let c = dir.path().join("c.spf");
        import_grid(&a, 40, [0.0; 3]);
        import_grid(&b, 40, [0.0; 3]);
        import_grid(&c, 40, [0.0; 3]);

        let editor = Editor::builder().cache_capacity(8).build();
        assert_eq!(editor.open_dataset(&a, DatasetOpenSettings::default()).unwrap(), 0);
        assert_eq!(editor.open_dataset(&b, DatasetOpenSettings::default()).unwrap(), 1);

        editor.close_dataset(0).unwrap();
        assert_eq!(editor.open_dataset(&c, DatasetOpenSettings::default()).unwrap(), 0);
        assert_eq!(editor.dataset_ids(), vec![1, 0]);
    }

    #[test]
    fn closing_an_unknown_dataset_is_invalid_selector() {
        let editor = Editor::builder().cache_capacity(8).build();
        assert!(matches!(
            editor.close_dataset(3),
            Err(Error::InvalidSelector(_))
        ));
    }

    #[test]
    fn center_on_open_moves_the_second_scan_to_the_first() {
        let dir = tempdir().unwrap();
        let near = dir.path().join("near.spf");
        let far = dir.path().join("far.spf");
        import_grid(&near, 100, [0.0, 0.0, 0.0]);
        import_grid(&far, 100, [5000.0, 5000.0, 0.0]);

        let editor = Editor::builder().cache_capacity(8).build();
        editor.open_dataset(&near, DatasetOpenSettings::default()).unwrap();

        let settings = DatasetOpenSettings {
            center_on_open: true,
            ..DatasetOpenSettings::default()
        };
        let far_id = editor.open_dataset(&far, settings).unwrap();

        let placed = editor.dataset_settings(far_id).unwrap();
        let boundary = editor.boundary();
        assert!(placed.translation[0] < -4000.0);
        assert!(boundary.extent(0) < 20.0);
    }

    #[test]
    fn translation_change_survives_resident_pages() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plot.spf");
        import_grid(&path, 60, [0.0; 3]);

        let editor = Editor::builder().cache_capacity(8).build();
        let id = editor.open_dataset(&path, DatasetOpenSettings::default()).unwrap();

        // Make a page resident under the old placement.
        let page = editor.page(PageKey::new(id, 0)).unwrap();
        let old_x = page.read().x(0);
        drop(page);

        editor.set_dataset_translation(id, [10.0, 0.0, 0.0]).unwrap();
        assert_eq!(editor.cache_resident(), 0);

        let page = editor.page(PageKey::new(id, 0)).unwrap();
        let new_x = page.read().x(0);
        assert!((new_x - old_x - 10.0).abs() < 1e-9);
    }

    #[test]
    fn project_roundtrip_restores_the_session() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.spf");
        let b = dir.path().join("b.spf");
        import_grid(&a, 40, [0.0; 3]);
        import_grid(&b, 40, [100.0, 0.0, 0.0]);

        let project_path = dir.path().join("stand.json");

        let editor = Editor::builder().cache_capacity(8).build();
        editor.set_project_label("spruce stand 7");
        editor.open_dataset(&a, DatasetOpenSettings::default()).unwrap();
        let settings = DatasetOpenSettings {
            label: Some("understory".to_string()),
            translation: [0.0, 0.0, 5.0],
            ..DatasetOpenSettings::default()
        };
        editor.open_dataset(&b, settings).unwrap();
        editor.save_project(&project_path).unwrap();

        let restored = Editor::builder().cache_capacity(8).build();
        restored.open_project(&project_path).unwrap();

        assert_eq!(restored.project_label(), "spruce stand 7");
        assert_eq!(restored.dataset_ids(), vec![0, 1]);
        let b_settings = restored.dataset_settings(1).unwrap();
        assert_eq!(b_settings.label, "understory");
        assert_eq!(b_settings.translation, [0.0, 0.0, 5.0]);
    }

    #[test]
    fn open_project_failure_keeps_the_session() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.spf");
        import_grid(&a, 40, [0.0; 3]);

        let editor = Editor::builder().cache_capacity(8).build();
        editor.open_dataset(&a, DatasetOpenSettings::default()).unwrap();

        let missing = dir.path().join("no-such-project.json");
        assert!(editor.open_project(&missing).is_err());
        assert_eq!(editor.dataset_count(), 1);
    }
}
