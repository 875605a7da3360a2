//! # Query Predicates
//!
//! The [`Where`] bundle a query evaluates: one spatial region plus the
//! attribute filters. Every filter starts disabled and matches everything;
//! enabling happens implicitly when values are inserted or a range is set.
//!
//! Classification codes fit in a fixed 256-bit array. Layer ids are sparse
//! u32s chosen by users, so membership lives in a roaring bitmap instead.

use roaring::RoaringBitmap;

use crate::geometry::{Box3, Range, Region};

/// Membership filter over the 256 LAS classification codes.
#[derive(Debug, Clone, Default)]
pub struct ClassificationSet {
    bits: [u64; 4],
    enabled: bool,
}

impl ClassificationSet {
    pub fn from_codes<I: IntoIterator<Item = u8>>(codes: I) -> Self {
        let mut set = Self::default();
        for code in codes {
            set.insert(code);
        }
        set
    }

    /// Adds a code and enables the filter.
    pub fn insert(&mut self, code: u8) {
        self.bits[code as usize / 64] |= 1 << (code % 64);
        self.enabled = true;
    }

    pub fn remove(&mut self, code: u8) {
        self.bits[code as usize / 64] &= !(1 << (code % 64));
    }

    pub fn contains(&self, code: u8) -> bool {
        self.bits[code as usize / 64] & (1 << (code % 64)) != 0
    }

    /// True when the filter is disabled or the code is a member.
    pub fn matches(&self, code: u8) -> bool {
        !self.enabled || self.contains(code)
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Membership filter over user-defined layer ids.
#[derive(Debug, Clone, Default)]
pub struct LayerSet {
    set: RoaringBitmap,
    enabled: bool,
}

impl LayerSet {
    pub fn from_layers<I: IntoIterator<Item = u32>>(layers: I) -> Self {
        let mut set = Self::default();
        for layer in layers {
            set.insert(layer);
        }
        set
    }

    /// Adds a layer and enables the filter.
    pub fn insert(&mut self, layer: u32) {
        self.set.insert(layer);
        self.enabled = true;
    }

    pub fn remove(&mut self, layer: u32) {
        self.set.remove(layer);
    }

    pub fn contains(&self, layer: u32) -> bool {
        self.set.contains(layer)
    }

    /// True when the filter is disabled or the layer is a member.
    pub fn matches(&self, layer: u32) -> bool {
        !self.enabled || self.set.contains(layer)
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn len(&self) -> u64 {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

/// The full predicate: spatial region, attribute filters, and an optional
/// explicit dataset list.
#[derive(Debug, Clone, Default)]
pub struct Where {
    region: Region,
    classifications: ClassificationSet,
    layers: LayerSet,
    intensity: Range,
    elevation: Range,
    descriptor: Range,
    density: Range,
    datasets: Option<Vec<u32>>,
}

impl Where {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn set_region(&mut self, region: Region) {
        self.region = region;
    }

    pub fn set_box(&mut self, b: Box3) {
        self.region = Region::Box(b);
    }

    pub fn set_sphere(&mut self, center: [f64; 3], radius: f64) {
        self.region = Region::Sphere { center, radius };
    }

    pub fn set_cone(&mut self, apex: [f64; 3], bottom_z: f64, angle: f64) {
        self.region = Region::Cone {
            apex,
            bottom_z,
            angle,
        };
    }

    pub fn set_cylinder(&mut self, a: [f64; 3], b: [f64; 3], radius: f64) {
        self.region = Region::Cylinder { a, b, radius };
    }

    pub fn classifications(&self) -> &ClassificationSet {
        &self.classifications
    }

    pub fn set_classifications(&mut self, set: ClassificationSet) {
        self.classifications = set;
    }

    pub fn layers(&self) -> &LayerSet {
        &self.layers
    }

    pub fn set_layers(&mut self, set: LayerSet) {
        self.layers = set;
    }

    pub fn intensity(&self) -> &Range {
        &self.intensity
    }

    pub fn set_intensity(&mut self, range: Range) {
        self.intensity = range;
    }

    pub fn elevation(&self) -> &Range {
        &self.elevation
    }

    pub fn set_elevation(&mut self, range: Range) {
        self.elevation = range;
    }

    pub fn descriptor(&self) -> &Range {
        &self.descriptor
    }

    pub fn set_descriptor(&mut self, range: Range) {
        self.descriptor = range;
    }

    pub fn density(&self) -> &Range {
        &self.density
    }

    pub fn set_density(&mut self, range: Range) {
        self.density = range;
    }

    /// Restricts the query to these dataset ids; `None` means every enabled
    /// dataset.
    pub fn set_datasets(&mut self, datasets: Option<Vec<u32>>) {
        self.datasets = datasets;
    }

    pub fn datasets(&self) -> Option<&[u32]> {
        self.datasets.as_deref()
    }
}
