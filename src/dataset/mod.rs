//! # Dataset
//!
//! One opened point-cloud source: its page store, its octree, and the
//! project-level placement metadata (translation, label, color, enabled
//! flag). Opening validates that the two files describe the same import;
//! a point file paired with a stale index is rejected rather than queried.
//!
//! Coordinates live in three spaces. Records store quantized integers; the
//! file header's scale/offset maps them to file coordinates; the dataset
//! translation places file coordinates in the shared project space. Pages
//! apply the translation when they load, so everything downstream of the
//! cache works in project space.

mod registry;

pub use registry::Datasets;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::OCTREE_FILE_EXT;
use crate::error::{Error, Result};
use crate::geometry::Box3;
use crate::index::SpatialIndex;
use crate::store::PageStore;

/// Options for adding a dataset to a project.
#[derive(Debug, Clone)]
pub struct DatasetOpenSettings {
    pub label: Option<String>,
    pub enabled: bool,
    pub translation: [f64; 3],
    /// When set, the facade replaces `translation` so the new dataset's
    /// center lands on the current project center.
    pub center_on_open: bool,
    pub color: [f64; 3],
    pub date_created: Option<String>,
}

impl Default for DatasetOpenSettings {
    fn default() -> Self {
        Self {
            label: None,
            enabled: true,
            translation: [0.0; 3],
            center_on_open: false,
            color: [1.0; 3],
            date_created: None,
        }
    }
}

/// Project-file form of a dataset; everything needed to reopen it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSettings {
    pub id: u32,
    pub label: String,
    pub path: PathBuf,
    pub enabled: bool,
    pub translation: [f64; 3],
    pub color: [f64; 3],
    #[serde(default)]
    pub date_created: String,
}

/// One dataset: store, index, placement.
#[derive(Debug)]
pub struct Dataset {
    id: u32,
    label: String,
    path: PathBuf,
    enabled: bool,
    translation: [f64; 3],
    color: [f64; 3],
    date_created: String,
    store: PageStore,
    index: SpatialIndex,
}

impl Dataset {
    /// Opens the point file at `path` and its sibling index.
    pub fn open<P: AsRef<Path>>(id: u32, path: P, settings: DatasetOpenSettings) -> Result<Self> {
        let path = path.as_ref();

        let label = settings.label.unwrap_or_else(|| default_label(path));

        Self::open_inner(
            id,
            path,
            label,
            settings.enabled,
            settings.translation,
            settings.color,
            settings.date_created.unwrap_or_default(),
        )
    }

    /// Reopens a dataset recorded in a project file.
    pub fn from_settings(settings: &DatasetSettings) -> Result<Self> {
        Self::open_inner(
            settings.id,
            &settings.path,
            settings.label.clone(),
            settings.enabled,
            settings.translation,
            settings.color,
            settings.date_created.clone(),
        )
    }

    fn open_inner(
        id: u32,
        path: &Path,
        label: String,
        enabled: bool,
        translation: [f64; 3],
        color: [f64; 3],
        date_created: String,
    ) -> Result<Self> {
        let store = PageStore::open(path)?;

        let index_path = path.with_extension(OCTREE_FILE_EXT);
        let index = SpatialIndex::load(&index_path)?;

        // The two files commit together at import; disagreement means one
        // was replaced on its own.
        if index.leaf_count() != store.page_count() as usize {
            return Err(Error::format(
                &index_path,
                format!(
                    "index has {} leaves but the point file has {} pages",
                    index.leaf_count(),
                    store.page_count()
                ),
            ));
        }
        let indexed_points = index.node(0).map(|n| n.size).unwrap_or(0);
        if indexed_points != store.point_count() {
            return Err(Error::format(
                &index_path,
                format!(
                    "index covers {} points but the point file has {}",
                    indexed_points,
                    store.point_count()
                ),
            ));
        }

        debug!(
            id,
            label,
            points = store.point_count(),
            pages = store.page_count(),
            "dataset opened"
        );

        Ok(Self {
            id,
            label,
            path: path.to_path_buf(),
            enabled,
            translation,
            color,
            date_created,
            store,
            index,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn translation(&self) -> [f64; 3] {
        self.translation
    }

    /// Moves the dataset in project space. Affects pages loaded afterward;
    /// resident pages keep the placement they were transformed with until
    /// they are evicted.
    pub fn set_translation(&mut self, translation: [f64; 3]) {
        self.translation = translation;
    }

    pub fn color(&self) -> [f64; 3] {
        self.color
    }

    pub fn set_color(&mut self, color: [f64; 3]) {
        self.color = color;
    }

    pub fn date_created(&self) -> &str {
        &self.date_created
    }

    /// Boundary in file coordinates.
    pub fn boundary(&self) -> &Box3 {
        self.store.boundary()
    }

    /// Boundary in project space.
    pub fn translated_boundary(&self) -> Box3 {
        self.store.boundary().translated(self.translation)
    }

    pub fn point_count(&self) -> u64 {
        self.store.point_count()
    }

    pub fn page_count(&self) -> u32 {
        self.store.page_count()
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    pub fn store(&self) -> &PageStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut PageStore {
        &mut self.store
    }

    /// Snapshot for the project file.
    pub fn settings(&self) -> DatasetSettings {
        DatasetSettings {
            id: self.id,
            label: self.label.clone(),
            path: self.path.clone(),
            enabled: self.enabled,
            translation: self.translation,
            color: self.color,
            date_created: self.date_created.clone(),
        }
    }
}

fn default_label(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string())
}
