//! # Dataset Registry
//!
//! Open datasets in insertion order. Queries iterate datasets in this order,
//! which is what pins the cross-dataset half of result ordering; the id map
//! is only an access path.

use hashbrown::HashMap;

use crate::error::{Error, Result};
use crate::geometry::Box3;

use super::Dataset;

#[derive(Debug, Default)]
pub struct Datasets {
    datasets: Vec<Dataset>,
    id_map: HashMap<u32, usize>,
}

impl Datasets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, dataset: Dataset) -> Result<()> {
        let id = dataset.id();
        if self.id_map.contains_key(&id) {
            return Err(Error::InvalidSelector(format!(
                "dataset id {id} is already open"
            )));
        }
        self.id_map.insert(id, self.datasets.len());
        self.datasets.push(dataset);
        Ok(())
    }

    pub fn remove(&mut self, id: u32) -> Option<Dataset> {
        let slot = self.id_map.remove(&id)?;
        let dataset = self.datasets.remove(slot);
        for (i, d) in self.datasets.iter().enumerate() {
            self.id_map.insert(d.id(), i);
        }
        Some(dataset)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.id_map.contains_key(&id)
    }

    pub fn get(&self, id: u32) -> Option<&Dataset> {
        self.id_map.get(&id).map(|&slot| &self.datasets[slot])
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Dataset> {
        self.id_map
            .get(&id)
            .map(|&slot| &mut self.datasets[slot])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dataset> {
        self.datasets.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Dataset> {
        self.datasets.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    /// Smallest id not currently in use.
    pub fn next_id(&self) -> u32 {
        let mut id = 0;
        while self.id_map.contains_key(&id) {
            id += 1;
        }
        id
    }

    /// Union of all datasets' project-space boundaries.
    pub fn boundary(&self) -> Box3 {
        let mut boundary = Box3::default();
        for dataset in &self.datasets {
            boundary.extend_box(&dataset.translated_boundary());
        }
        boundary
    }

    pub fn point_count(&self) -> u64 {
        self.datasets.iter().map(|d| d.point_count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetOpenSettings;
    use crate::import::{import_points, ImportRecord, ImportSettings};
    use tempfile::tempdir;

    fn open_sample(dir: &std::path::Path, name: &str, id: u32, shift: f64) -> Dataset {
        let path = dir.join(name);
        let records: Vec<ImportRecord> = (0..20)
            .map(|i| ImportRecord {
                position: [i as f64, 0.0, 0.0],
                ..ImportRecord::default()
            })
            .collect();
        import_points(&path, &records, &ImportSettings::default()).unwrap();

        let settings = DatasetOpenSettings {
            translation: [shift, 0.0, 0.0],
            ..DatasetOpenSettings::default()
        };
        Dataset::open(id, &path, settings).unwrap()
    }

    #[test]
    fn insert_get_remove() {
        let dir = tempdir().unwrap();
        let mut registry = Datasets::new();

        registry.insert(open_sample(dir.path(), "a.spf", 0, 0.0)).unwrap();
        registry.insert(open_sample(dir.path(), "b.spf", 3, 0.0)).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains(3));
        assert_eq!(registry.get(3).unwrap().id(), 3);
        assert_eq!(registry.next_id(), 1);

        let removed = registry.remove(0).unwrap();
        assert_eq!(removed.id(), 0);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(3).unwrap().id(), 3);
        assert!(registry.remove(0).is_none());
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let dir = tempdir().unwrap();
        let mut registry = Datasets::new();

        registry.insert(open_sample(dir.path(), "a.spf", 1, 0.0)).unwrap();
        let dup = open_sample(dir.path(), "b.spf", 1, 0.0);

        assert!(matches!(
            registry.insert(dup),
            Err(Error::InvalidSelector(_))
        ));
    }

    #[test]
    fn boundary_unions_translated_datasets() {
        let dir = tempdir().unwrap();
        let mut registry = Datasets::new();
        assert!(registry.boundary().is_empty());

        registry.insert(open_sample(dir.path(), "a.spf", 0, 0.0)).unwrap();
        registry.insert(open_sample(dir.path(), "b.spf", 1, 100.0)).unwrap();

        let boundary = registry.boundary();
        assert_eq!(boundary.min()[0], 0.0);
        assert_eq!(boundary.max()[0], 119.0);
        assert_eq!(registry.point_count(), 40);
    }

    #[test]
    fn iteration_follows_insertion_order() {
        let dir = tempdir().unwrap();
        let mut registry = Datasets::new();

        registry.insert(open_sample(dir.path(), "a.spf", 5, 0.0)).unwrap();
        registry.insert(open_sample(dir.path(), "b.spf", 2, 0.0)).unwrap();
        registry.insert(open_sample(dir.path(), "c.spf", 9, 0.0)).unwrap();

        let ids: Vec<u32> = registry.iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec![5, 2, 9]);
    }
}
