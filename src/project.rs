//! # Project Persistence
//!
//! A project file is a small JSON document naming the datasets of a session
//! and how they sit in project space. Point data never passes through it;
//! the heavy state lives in the per-dataset store and index files the
//! project merely points at, so saving a project is cheap no matter how
//! many points are open.
//!
//! ```json
//! {
//!   "version": 1,
//!   "label": "spruce stand 7",
//!   "datasets": [
//!     {
//!       "id": 0,
//!       "label": "ground survey",
//!       "path": "plots/plot42.spf",
//!       "enabled": true,
//!       "translation": [0.0, 0.0, 0.0],
//!       "color": [1.0, 1.0, 1.0],
//!       "date_created": "2026-03-14"
//!     }
//!   ]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::DatasetSettings;
use crate::error::{Error, Result};

/// On-disk form of one editor session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub version: u32,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub datasets: Vec<DatasetSettings>,
}

impl ProjectFile {
    pub const VERSION: u32 = 1;

    pub fn new(label: impl Into<String>) -> Self {
        Self {
            version: Self::VERSION,
            label: label.into(),
            datasets: Vec::new(),
        }
    }

    /// Reads and validates a project file. Files written by a newer build
    /// are rejected rather than half-understood.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        let project: ProjectFile = serde_json::from_slice(&bytes)
            .map_err(|e| Error::format(path, format!("not a valid project file: {e}")))?;

        if project.version > Self::VERSION {
            return Err(Error::format(
                path,
                format!(
                    "project version {} is newer than this build understands",
                    project.version
                ),
            ));
        }

        debug!(path = %path.display(), datasets = project.datasets.len(), "project loaded");
        Ok(project)
    }

    /// Writes the project through a sibling temp file and a rename, so a
    /// crash mid-save leaves the previous file intact.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| Error::format(path, format!("project serialization failed: {e}")))?;

        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &json).map_err(|e| Error::io(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| Error::io(path, e))?;

        debug!(path = %path.display(), datasets = self.datasets.len(), "project saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn sample_project() -> ProjectFile {
        let mut project = ProjectFile::new("beech plot");
        project.datasets.push(DatasetSettings {
            id: 0,
            label: "canopy".to_string(),
            path: PathBuf::from("plots/canopy.spf"),
            enabled: true,
            translation: [0.0, 0.0, 0.0],
            color: [1.0, 1.0, 1.0],
            date_created: "2026-01-05".to_string(),
        });
        project.datasets.push(DatasetSettings {
            id: 3,
            label: "understory".to_string(),
            path: PathBuf::from("plots/understory.spf"),
            enabled: false,
            translation: [12.5, -3.0, 0.0],
            color: [0.2, 0.8, 0.2],
            date_created: String::new(),
        });
        project
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stand.json");

        let project = sample_project();
        project.save(&path).unwrap();

        let loaded = ProjectFile::load(&path).unwrap();
        assert_eq!(loaded, project);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stand.json");
        std::fs::write(&path, r#"{"version": 1}"#).unwrap();

        let loaded = ProjectFile::load(&path).unwrap();
        assert_eq!(loaded.label, "");
        assert!(loaded.datasets.is_empty());
    }

    #[test]
    fn newer_version_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stand.json");
        std::fs::write(&path, r#"{"version": 99, "label": "x", "datasets": []}"#).unwrap();

        assert!(matches!(
            ProjectFile::load(&path),
            Err(Error::Format { .. })
        ));
    }

    #[test]
    fn malformed_json_is_a_format_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stand.json");
        std::fs::write(&path, b"{ not json").unwrap();

        assert!(matches!(
            ProjectFile::load(&path),
            Err(Error::Format { .. })
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.json");

        assert!(matches!(ProjectFile::load(&path), Err(Error::Io { .. })));
    }
}
