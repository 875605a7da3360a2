//! # Page Record Codec
//!
//! Conversion between the packed 64-byte disk records and the decoded typed
//! arrays a [`Page`] holds in memory. Decoding descales integer positions to
//! file-coordinate `f64` and normalizes u16 intensity/color samples to 0..1;
//! encoding reverses both, undoing the dataset translation if the page has
//! been transformed to world coordinates.

use std::path::Path;

use zerocopy::{FromBytes, FromZeros, IntoBytes};

use crate::config::{POINT_RECORD_SIZE, SCALE_U16};
use crate::error::{Error, Result};
use crate::geometry::Box3;
use crate::store::PointRecord;

use super::Page;

fn denormalize_u16(v: f64) -> u16 {
    (v.clamp(0.0, 1.0) * 65535.0).round() as u16
}

/// Fills `page`'s typed arrays from raw record bytes.
pub(super) fn decode_records(
    page: &mut Page,
    bytes: &[u8],
    scale: [f64; 3],
    offset: [f64; 3],
    path: &Path,
) -> Result<()> {
    let records = <[PointRecord]>::ref_from_bytes(bytes)
        .map_err(|_| Error::format(path, "page bytes are not whole point records"))?;

    let n = records.len();
    page.point_count = n;
    page.position = Vec::with_capacity(n * 3);
    page.intensity = Vec::with_capacity(n);
    page.return_number = Vec::with_capacity(n);
    page.number_of_returns = Vec::with_capacity(n);
    page.classification = Vec::with_capacity(n);
    page.user_data = Vec::with_capacity(n);
    page.gps_time = Vec::with_capacity(n);
    page.color = Vec::with_capacity(n * 3);
    page.layer = Vec::with_capacity(n);
    page.elevation = Vec::with_capacity(n);
    page.descriptor = Vec::with_capacity(n);
    page.density = Vec::with_capacity(n);

    let mut boundary = Box3::default();

    for record in records {
        let [xi, yi, zi] = record.position();
        let p = [
            xi as f64 * scale[0] + offset[0],
            yi as f64 * scale[1] + offset[1],
            zi as f64 * scale[2] + offset[2],
        ];
        page.position.extend_from_slice(&p);
        boundary.extend_point(p[0], p[1], p[2]);

        page.intensity.push(record.intensity() as f64 * SCALE_U16);
        page.return_number.push(record.return_number());
        page.number_of_returns.push(record.number_of_returns());
        page.classification.push(record.classification());
        page.user_data.push(record.user_data());
        page.gps_time.push(record.gps_time());

        let [r, g, b] = record.color();
        page.color.extend_from_slice(&[
            r as f64 * SCALE_U16,
            g as f64 * SCALE_U16,
            b as f64 * SCALE_U16,
        ]);

        page.layer.push(record.layer());
        page.elevation.push(record.elevation());
        page.descriptor.push(record.descriptor());
        page.density.push(record.density());
    }

    page.boundary = boundary;

    Ok(())
}

/// Serializes `page` back to record bytes, exact inverse of decoding.
pub(super) fn encode_records(page: &Page, scale: [f64; 3], offset: [f64; 3]) -> Vec<u8> {
    // Positions are world coordinates only after transform; an untransformed
    // page encodes straight from file coordinates.
    let t = if page.translated {
        page.translation
    } else {
        [0.0; 3]
    };

    let mut bytes = Vec::with_capacity(page.point_count * POINT_RECORD_SIZE);

    for i in 0..page.point_count {
        let mut record = PointRecord::new_zeroed();

        let p = &page.position[i * 3..i * 3 + 3];
        record.set_position(
            ((p[0] - t[0] - offset[0]) / scale[0]).round() as i32,
            ((p[1] - t[1] - offset[1]) / scale[1]).round() as i32,
            ((p[2] - t[2] - offset[2]) / scale[2]).round() as i32,
        );

        record.set_intensity(denormalize_u16(page.intensity[i]));
        record.set_return_number(page.return_number[i]);
        record.set_number_of_returns(page.number_of_returns[i]);
        record.set_classification(page.classification[i]);
        record.set_user_data(page.user_data[i]);
        record.set_gps_time(page.gps_time[i]);

        let c = &page.color[i * 3..i * 3 + 3];
        record.set_color(
            denormalize_u16(c[0]),
            denormalize_u16(c[1]),
            denormalize_u16(c[2]),
        );

        record.set_layer(page.layer[i]);
        record.set_elevation(page.elevation[i]);
        record.set_descriptor(page.descriptor[i]);
        record.set_density(page.density[i]);

        bytes.extend_from_slice(record.as_bytes());
    }

    bytes
}
