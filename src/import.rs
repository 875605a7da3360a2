//! # Dataset Import
//!
//! Turns a slice of parsed point records into the on-disk pair a dataset
//! opens from: the point file and its octree index. Parsing LAS/LAZ is a
//! collaborator's job; this module starts from records already in memory.
//!
//! Positions are quantized to the configured scale before the octree is
//! built, so the tree is constructed over exactly the coordinates a page
//! will decode later. Building over the raw input instead would let a point
//! near an octant plane quantize across it and end up filed in a leaf whose
//! box no longer contains it.
//!
//! Commit order: the point file is written to a temporary sibling and
//! renamed into place, then the index does the same. A crash in between
//! leaves a point file with a stale index, which dataset open detects and
//! rejects.

use std::path::{Path, PathBuf};

use tracing::debug;
use zerocopy::{FromZeros, IntoBytes};

use crate::config::{DEFAULT_LEAF_CAPACITY, OCTREE_FILE_EXT, OCTREE_MAX_DEPTH};
use crate::error::{Error, Result};
use crate::geometry::Box3;
use crate::index::IndexBuilder;
use crate::store::{PageStore, PointRecord, FLAG_COLOR, FLAG_GPS_TIME, FLAG_INTENSITY};

/// One parsed input point. Intensity and color are normalized 0..1 the same
/// way pages hold them in memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportRecord {
    pub position: [f64; 3],
    pub intensity: f64,
    pub return_number: u8,
    pub number_of_returns: u8,
    pub classification: u8,
    pub user_data: u8,
    pub gps_time: f64,
    pub color: [f64; 3],
    pub layer: u32,
    pub elevation: f64,
    pub descriptor: f64,
    pub density: f64,
}

#[derive(Debug, Clone)]
pub struct ImportSettings {
    /// Quantization step per axis; positions round to multiples of this.
    pub scale: [f64; 3],
    /// Coordinate origin baked into the file; defaults to the input minimum.
    pub offset: Option<[f64; 3]>,
    pub leaf_capacity: u64,
    pub max_depth: u32,
    /// Attribute-presence flags written to the header.
    pub flags: u16,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            scale: [0.001; 3],
            offset: None,
            leaf_capacity: DEFAULT_LEAF_CAPACITY,
            max_depth: OCTREE_MAX_DEPTH,
            flags: FLAG_INTENSITY | FLAG_COLOR | FLAG_GPS_TIME,
        }
    }
}

#[derive(Debug)]
pub struct ImportSummary {
    pub point_count: u64,
    pub page_count: u32,
    pub node_count: usize,
    pub boundary: Box3,
    pub point_path: PathBuf,
    pub index_path: PathBuf,
}

fn denormalize_u16(v: f64) -> u16 {
    (v.clamp(0.0, 1.0) * 65535.0).round() as u16
}

/// Imports `records` into a point file at `path` and an index beside it.
pub fn import_points(
    path: &Path,
    records: &[ImportRecord],
    settings: &ImportSettings,
) -> Result<ImportSummary> {
    if records.is_empty() {
        return Err(Error::IndexBuild("cannot import zero points".into()));
    }
    if settings.scale.iter().any(|s| !s.is_finite() || *s <= 0.0) {
        return Err(Error::IndexBuild(format!(
            "scale {:?} is not positive",
            settings.scale
        )));
    }
    for (i, record) in records.iter().enumerate() {
        if record.position.iter().any(|c| !c.is_finite()) {
            return Err(Error::IndexBuild(format!(
                "record {i} has a non-finite coordinate"
            )));
        }
    }

    let scale = settings.scale;
    let raw_boundary = Box3::from_points(records.iter().map(|r| r.position));
    let offset = settings.offset.unwrap_or(raw_boundary.min());

    // Quantize up front and index the dequantized result, so leaf placement
    // and page decoding agree bit for bit.
    let mut quantized: Vec<[i32; 3]> = Vec::with_capacity(records.len());
    let mut positions: Vec<[f64; 3]> = Vec::with_capacity(records.len());
    for record in records {
        let q = [
            ((record.position[0] - offset[0]) / scale[0]).round() as i32,
            ((record.position[1] - offset[1]) / scale[1]).round() as i32,
            ((record.position[2] - offset[2]) / scale[2]).round() as i32,
        ];
        quantized.push(q);
        positions.push([
            q[0] as f64 * scale[0] + offset[0],
            q[1] as f64 * scale[1] + offset[1],
            q[2] as f64 * scale[2] + offset[2],
        ]);
    }

    let boundary = Box3::from_points(positions.iter().copied());

    let built = IndexBuilder::new(boundary)
        .leaf_capacity(settings.leaf_capacity)
        .max_depth(settings.max_depth)
        .build(&positions)?;

    let page_spans = built.index.page_spans();
    let page_count = page_spans.len() as u32;

    let tmp = path.with_extension("spf.tmp");
    {
        let mut store = PageStore::create(
            &tmp,
            records.len() as u64,
            page_count,
            settings.flags,
            scale,
            offset,
            &boundary,
        )?;

        let mut bytes = Vec::new();
        for (page_id, &(from, size)) in page_spans.iter().enumerate() {
            bytes.clear();
            for pos in from..from + size {
                let input = built.order[pos as usize] as usize;
                let record = &records[input];
                let q = quantized[input];

                let mut out = PointRecord::new_zeroed();
                out.set_position(q[0], q[1], q[2]);
                out.set_intensity(denormalize_u16(record.intensity));
                out.set_return_number(record.return_number);
                out.set_number_of_returns(record.number_of_returns);
                out.set_classification(record.classification);
                out.set_user_data(record.user_data);
                out.set_gps_time(record.gps_time);
                out.set_color(
                    denormalize_u16(record.color[0]),
                    denormalize_u16(record.color[1]),
                    denormalize_u16(record.color[2]),
                );
                out.set_layer(record.layer);
                out.set_elevation(record.elevation);
                out.set_descriptor(record.descriptor);
                out.set_density(record.density);
                bytes.extend_from_slice(out.as_bytes());
            }
            store.write_page(page_id as u32, &bytes)?;
        }

        store.sync()?;
    }
    std::fs::rename(&tmp, path).map_err(|e| Error::io(path, e))?;

    let index_path = path.with_extension(OCTREE_FILE_EXT);
    built.index.save(&index_path)?;

    debug!(
        points = records.len(),
        pages = page_count,
        nodes = built.index.node_count(),
        path = %path.display(),
        "dataset imported"
    );

    Ok(ImportSummary {
        point_count: records.len() as u64,
        page_count,
        node_count: built.index.node_count(),
        boundary,
        point_path: path.to_path_buf(),
        index_path,
    })
}
