//! # Page
//!
//! The in-memory unit of caching: one leaf's points decoded into typed
//! arrays, plus the transient per-query state layered on top of them.
//!
//! A page moves through a small forward-only state machine driven by the
//! query pipeline:
//!
//! ```text
//! Empty ──read──> Loaded ──transform──> Transformed ──select──> Selected ──render──> Rendered
//!   ▲                                        ▲                      ▲
//!   └── eviction drops the page;             └──── set_state ───────┘
//!       a fresh acquire re-reads                   rewinds for a new pass
//! ```
//!
//! `set_state` only rewinds (or jumps to `Rendered` to mark a page done);
//! `next_state` advances exactly one step, which is what lets the query
//! layer time-box its progress. Decoded point data and the translation to
//! world coordinates survive a rewind; only selection and render output are
//! recomputed.
//!
//! The `modified` flag is independent of the state machine: any attribute
//! write sets it, and only a successful write-back clears it.

mod codec;

use crate::error::Result;
use crate::geometry::{Box3, Region};
use crate::query::Where;
use crate::store::PageStore;

/// Cache key of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageKey {
    pub dataset_id: u32,
    pub page_id: u32,
}

impl PageKey {
    pub fn new(dataset_id: u32, page_id: u32) -> Self {
        Self {
            dataset_id,
            page_id,
        }
    }
}

/// Processing state of a page within a query pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PageState {
    Empty,
    Loaded,
    Transformed,
    Selected,
    Rendered,
}

/// One page's decoded points and per-query working state.
#[derive(Debug)]
pub struct Page {
    dataset_id: u32,
    page_id: u32,
    state: PageState,
    modified: bool,
    translated: bool,
    translation: [f64; 3],
    point_count: usize,

    position: Vec<f64>,
    intensity: Vec<f64>,
    return_number: Vec<u8>,
    number_of_returns: Vec<u8>,
    classification: Vec<u8>,
    user_data: Vec<u8>,
    gps_time: Vec<f64>,
    color: Vec<f64>,
    layer: Vec<u32>,
    elevation: Vec<f64>,
    descriptor: Vec<f64>,
    density: Vec<f64>,

    boundary: Box3,
    selection: Vec<u32>,
    render_position: Vec<f32>,
    render_color: Vec<f32>,
}

impl Page {
    pub fn new(dataset_id: u32, page_id: u32) -> Self {
        Self {
            dataset_id,
            page_id,
            state: PageState::Empty,
            modified: false,
            translated: false,
            translation: [0.0; 3],
            point_count: 0,
            position: Vec::new(),
            intensity: Vec::new(),
            return_number: Vec::new(),
            number_of_returns: Vec::new(),
            classification: Vec::new(),
            user_data: Vec::new(),
            gps_time: Vec::new(),
            color: Vec::new(),
            layer: Vec::new(),
            elevation: Vec::new(),
            descriptor: Vec::new(),
            density: Vec::new(),
            boundary: Box3::default(),
            selection: Vec::new(),
            render_position: Vec::new(),
            render_color: Vec::new(),
        }
    }

    pub fn key(&self) -> PageKey {
        PageKey::new(self.dataset_id, self.page_id)
    }

    pub fn dataset_id(&self) -> u32 {
        self.dataset_id
    }

    pub fn page_id(&self) -> u32 {
        self.page_id
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    /// Rewinds the state machine, or jumps to `Rendered` to mark the page
    /// done. Forward requests to any other state are ignored.
    pub fn set_state(&mut self, state: PageState) {
        if state < self.state || state == PageState::Rendered {
            self.state = state;
        }
    }

    pub fn modified(&self) -> bool {
        self.modified
    }

    pub fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
    }

    pub fn point_count(&self) -> usize {
        self.point_count
    }

    /// Page bounding box: file coordinates after `read`, world coordinates
    /// after `transform`.
    pub fn boundary(&self) -> &Box3 {
        &self.boundary
    }

    /// Decodes the page's records from the store, replacing any content.
    ///
    /// Local modifications are discarded; callers that care flush first.
    pub fn read(&mut self, store: &PageStore) -> Result<()> {
        let bytes = store.read_page(self.page_id)?;
        codec::decode_records(self, &bytes, store.scale(), store.offset(), &store.path())?;

        self.state = PageState::Loaded;
        self.modified = false;
        self.translated = false;
        self.translation = [0.0; 3];
        self.selection.clear();
        self.render_position.clear();
        self.render_color.clear();

        Ok(())
    }

    /// Moves decoded positions into world coordinates. The shift happens at
    /// most once per residency; repeated calls only advance the state.
    pub fn transform(&mut self, translation: [f64; 3]) {
        if self.state == PageState::Empty {
            return;
        }

        if !self.translated {
            for p in self.position.chunks_exact_mut(3) {
                p[0] += translation[0];
                p[1] += translation[1];
                p[2] += translation[2];
            }
            self.boundary.translate(translation);
            self.translated = true;
            self.translation = translation;
        }

        if self.state == PageState::Loaded {
            self.state = PageState::Transformed;
        }
    }

    /// Computes the selection mask: all points, narrowed by the region test
    /// (unless the index proved full containment) and each enabled attribute
    /// filter, by in-place compaction. Point data is never copied.
    pub fn select(&mut self, where_: &Where, partial: bool) {
        self.selection = (0..self.point_count as u32).collect();

        if partial && !matches!(where_.region(), Region::None) {
            let region = where_.region();
            let mut selection = std::mem::take(&mut self.selection);
            selection.retain(|&i| {
                let p = self.position_at(i as usize);
                region.contains(p[0], p[1], p[2])
            });
            self.selection = selection;
        }

        if where_.classifications().is_enabled() {
            let filter = where_.classifications();
            let mut selection = std::mem::take(&mut self.selection);
            selection.retain(|&i| filter.contains(self.classification[i as usize]));
            self.selection = selection;
        }

        if where_.layers().is_enabled() {
            let filter = where_.layers();
            let mut selection = std::mem::take(&mut self.selection);
            selection.retain(|&i| filter.contains(self.layer[i as usize]));
            self.selection = selection;
        }

        if where_.intensity().is_enabled() {
            let range = where_.intensity();
            let mut selection = std::mem::take(&mut self.selection);
            selection.retain(|&i| range.contains(self.intensity[i as usize]));
            self.selection = selection;
        }

        if where_.elevation().is_enabled() {
            let range = where_.elevation();
            let mut selection = std::mem::take(&mut self.selection);
            selection.retain(|&i| range.contains(self.elevation[i as usize]));
            self.selection = selection;
        }

        if where_.descriptor().is_enabled() {
            let range = where_.descriptor();
            let mut selection = std::mem::take(&mut self.selection);
            selection.retain(|&i| range.contains(self.descriptor[i as usize]));
            self.selection = selection;
        }

        if where_.density().is_enabled() {
            let range = where_.density();
            let mut selection = std::mem::take(&mut self.selection);
            selection.retain(|&i| range.contains(self.density[i as usize]));
            self.selection = selection;
        }

        self.state = PageState::Selected;
    }

    /// Fills the `f32` render buffers from the selected points.
    pub fn render(&mut self) {
        self.render_position.clear();
        self.render_position.reserve(self.selection.len() * 3);
        self.render_color.clear();
        self.render_color.reserve(self.selection.len() * 3);

        for &i in &self.selection {
            let i = i as usize;
            self.render_position.extend_from_slice(&[
                self.position[i * 3] as f32,
                self.position[i * 3 + 1] as f32,
                self.position[i * 3 + 2] as f32,
            ]);
            self.render_color.extend_from_slice(&[
                self.color[i * 3] as f32,
                self.color[i * 3 + 1] as f32,
                self.color[i * 3 + 2] as f32,
            ]);
        }

        self.state = PageState::Rendered;
    }

    /// Advances the state machine one step. Returns `true` while a further
    /// step remains.
    pub fn next_state(
        &mut self,
        store: &PageStore,
        translation: [f64; 3],
        where_: &Where,
        partial: bool,
    ) -> Result<bool> {
        match self.state {
            PageState::Empty => {
                self.read(store)?;
                Ok(true)
            }
            PageState::Loaded => {
                self.transform(translation);
                Ok(true)
            }
            PageState::Transformed => {
                self.select(where_, partial);
                Ok(true)
            }
            PageState::Selected => {
                self.render();
                Ok(false)
            }
            PageState::Rendered => Ok(false),
        }
    }

    /// Serializes the page for write-back; exactly reverses decoding. The
    /// translation undone is the one `transform` applied, so a dataset moved
    /// while this page was resident still writes back correct coordinates.
    pub fn encode(&self, scale: [f64; 3], offset: [f64; 3]) -> Vec<u8> {
        codec::encode_records(self, scale, offset)
    }

    fn position_at(&self, i: usize) -> [f64; 3] {
        [
            self.position[i * 3],
            self.position[i * 3 + 1],
            self.position[i * 3 + 2],
        ]
    }

    pub fn position(&self, i: usize) -> [f64; 3] {
        self.position_at(i)
    }

    pub fn x(&self, i: usize) -> f64 {
        self.position[i * 3]
    }

    pub fn y(&self, i: usize) -> f64 {
        self.position[i * 3 + 1]
    }

    pub fn z(&self, i: usize) -> f64 {
        self.position[i * 3 + 2]
    }

    pub fn intensity(&self, i: usize) -> f64 {
        self.intensity[i]
    }

    pub fn return_number(&self, i: usize) -> u8 {
        self.return_number[i]
    }

    pub fn number_of_returns(&self, i: usize) -> u8 {
        self.number_of_returns[i]
    }

    pub fn classification(&self, i: usize) -> u8 {
        self.classification[i]
    }

    pub fn user_data(&self, i: usize) -> u8 {
        self.user_data[i]
    }

    pub fn gps_time(&self, i: usize) -> f64 {
        self.gps_time[i]
    }

    pub fn color(&self, i: usize) -> [f64; 3] {
        [
            self.color[i * 3],
            self.color[i * 3 + 1],
            self.color[i * 3 + 2],
        ]
    }

    pub fn layer(&self, i: usize) -> u32 {
        self.layer[i]
    }

    pub fn elevation(&self, i: usize) -> f64 {
        self.elevation[i]
    }

    pub fn descriptor(&self, i: usize) -> f64 {
        self.descriptor[i]
    }

    pub fn density(&self, i: usize) -> f64 {
        self.density[i]
    }

    pub fn set_classification(&mut self, i: usize, v: u8) {
        self.classification[i] = v;
        self.modified = true;
    }

    pub fn set_layer(&mut self, i: usize, v: u32) {
        self.layer[i] = v;
        self.modified = true;
    }

    pub fn set_elevation(&mut self, i: usize, v: f64) {
        self.elevation[i] = v;
        self.modified = true;
    }

    pub fn set_descriptor(&mut self, i: usize, v: f64) {
        self.descriptor[i] = v;
        self.modified = true;
    }

    pub fn set_density(&mut self, i: usize, v: f64) {
        self.density[i] = v;
        self.modified = true;
    }

    /// Selection mask: indices of points matching the last `select`.
    pub fn selection(&self) -> &[u32] {
        &self.selection
    }

    pub fn selection_len(&self) -> usize {
        self.selection.len()
    }

    pub fn render_position(&self) -> &[f32] {
        &self.render_position
    }

    pub fn render_color(&self) -> &[f32] {
        &self.render_color
    }
}
