//! # On-Disk File Layouts
//!
//! Zero-copy header and record definitions for the two files that make up a
//! dataset on disk: the point file (`.spf`) and the octree index (`.idx`).
//!
//! All structures are `#[repr(C)]` with explicit little-endian fields so a
//! dataset written on one machine opens unchanged on another. Every layout
//! has a compile-time size assertion; changing a field without updating the
//! format version is a bug.
//!
//! ## Point File
//!
//! ```text
//! ┌────────────────────┬──────────────────────┬───────────────────────┐
//! │ PointFileHeader    │ DirectoryEntry × N   │ page data (variable)  │
//! │ 128 bytes          │ 32 bytes each        │ 64 bytes per point    │
//! └────────────────────┴──────────────────────┴───────────────────────┘
//! ```
//!
//! Pages are located through the directory, never by arithmetic on the data
//! region: a rewritten page that outgrew its slot is appended at the end of
//! the file and its directory entry repointed.
//!
//! ## Octree File
//!
//! ```text
//! ┌────────────────────┬──────────────────────┐
//! │ OctreeFileHeader   │ OctreeNodeRecord × N │
//! │ 128 bytes          │ 64 bytes each        │
//! └────────────────────┴──────────────────────┘
//! ```

use std::path::Path;

use zerocopy::little_endian::{I32, U16, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{
    DIRECTORY_ENTRY_SIZE, FILE_HEADER_SIZE, FORMAT_VERSION, OCTREE_NODE_SIZE, POINT_RECORD_SIZE,
};
use crate::error::{Error, Result};
use crate::geometry::Box3;

/// Magic bytes identifying a point file.
pub const POINT_MAGIC: [u8; 16] = *b"silva points v1\x00";

/// Magic bytes identifying an octree index file.
pub const OCTREE_MAGIC: [u8; 16] = *b"silva octree v1\x00";

/// Point file flag: intensity values are meaningful.
pub const FLAG_INTENSITY: u16 = 1 << 0;

/// Point file flag: RGB color values are meaningful.
pub const FLAG_COLOR: u16 = 1 << 1;

/// Point file flag: GPS time values are meaningful.
pub const FLAG_GPS_TIME: u16 = 1 << 2;

/// Point file flag: editing attributes (layer, elevation, descriptor,
/// density) have been written at least once.
pub const FLAG_EXTENDED: u16 = 1 << 3;

fn pack3(v: [f64; 3]) -> [U64; 3] {
    [
        U64::new(v[0].to_bits()),
        U64::new(v[1].to_bits()),
        U64::new(v[2].to_bits()),
    ]
}

fn unpack3(v: [U64; 3]) -> [f64; 3] {
    [
        f64::from_bits(v[0].get()),
        f64::from_bits(v[1].get()),
        f64::from_bits(v[2].get()),
    ]
}

/// Header at offset 0 of a point file.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct PointFileHeader {
    magic: [u8; 16],
    version: U16,
    flags: U16,
    page_count: U32,
    point_count: U64,
    scale: [U64; 3],
    offset: [U64; 3],
    min: [U64; 3],
    max: [U64; 3],
}

const _: () = assert!(std::mem::size_of::<PointFileHeader>() == FILE_HEADER_SIZE);

impl PointFileHeader {
    pub fn new(
        point_count: u64,
        page_count: u32,
        flags: u16,
        scale: [f64; 3],
        offset: [f64; 3],
        boundary: &Box3,
    ) -> Self {
        Self {
            magic: POINT_MAGIC,
            version: U16::new(FORMAT_VERSION),
            flags: U16::new(flags),
            page_count: U32::new(page_count),
            point_count: U64::new(point_count),
            scale: pack3(scale),
            offset: pack3(offset),
            min: pack3(boundary.min()),
            max: pack3(boundary.max()),
        }
    }

    pub fn from_bytes<'a>(bytes: &'a [u8], path: &Path) -> Result<&'a Self> {
        if bytes.len() < FILE_HEADER_SIZE {
            return Err(Error::format(path, "file too small for point header"));
        }

        let header = Self::ref_from_bytes(&bytes[..FILE_HEADER_SIZE])
            .map_err(|_| Error::format(path, "misaligned point header"))?;

        if header.magic != POINT_MAGIC {
            return Err(Error::format(path, "not a point file (bad magic)"));
        }
        if header.version.get() != FORMAT_VERSION {
            return Err(Error::format(
                path,
                format!("unsupported point file version {}", header.version.get()),
            ));
        }

        Ok(header)
    }

    pub fn point_count(&self) -> u64 {
        self.point_count.get()
    }

    pub fn page_count(&self) -> u32 {
        self.page_count.get()
    }

    pub fn flags(&self) -> u16 {
        self.flags.get()
    }

    pub fn scale(&self) -> [f64; 3] {
        unpack3(self.scale)
    }

    pub fn offset(&self) -> [f64; 3] {
        unpack3(self.offset)
    }

    pub fn boundary(&self) -> Box3 {
        Box3::new(unpack3(self.min), unpack3(self.max))
    }
}

/// One page directory slot. `byte_len == 0` marks a page that has not been
/// written yet.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct DirectoryEntry {
    offset: U64,
    byte_len: U64,
    point_count: U64,
    crc: U64,
}

const _: () = assert!(std::mem::size_of::<DirectoryEntry>() == DIRECTORY_ENTRY_SIZE);

impl DirectoryEntry {
    pub fn new(offset: u64, byte_len: u64, point_count: u64, crc: u64) -> Self {
        Self {
            offset: U64::new(offset),
            byte_len: U64::new(byte_len),
            point_count: U64::new(point_count),
            crc: U64::new(crc),
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset.get()
    }

    pub fn byte_len(&self) -> u64 {
        self.byte_len.get()
    }

    pub fn point_count(&self) -> u64 {
        self.point_count.get()
    }

    pub fn crc(&self) -> u64 {
        self.crc.get()
    }

    pub fn is_written(&self) -> bool {
        self.byte_len.get() != 0
    }
}

/// One point as stored on disk.
///
/// Positions are quantized integers; world coordinates are reconstructed as
/// `x * scale[0] + offset[0]` from the file header. Color channels are
/// 16-bit as in LAS. The last four fields are editing attributes that start
/// zeroed and are populated by tools.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct PointRecord {
    x: I32,
    y: I32,
    z: I32,
    intensity: U16,
    return_number: u8,
    number_of_returns: u8,
    classification: u8,
    user_data: u8,
    reserved0: [u8; 2],
    gps_time: U64,
    red: U16,
    green: U16,
    blue: U16,
    reserved1: [u8; 2],
    layer: U32,
    elevation: U64,
    descriptor: U64,
    density: U64,
}

const _: () = assert!(std::mem::size_of::<PointRecord>() == POINT_RECORD_SIZE);

impl PointRecord {
    pub fn position(&self) -> [i32; 3] {
        [self.x.get(), self.y.get(), self.z.get()]
    }

    pub fn set_position(&mut self, x: i32, y: i32, z: i32) {
        self.x = I32::new(x);
        self.y = I32::new(y);
        self.z = I32::new(z);
    }

    pub fn intensity(&self) -> u16 {
        self.intensity.get()
    }

    pub fn set_intensity(&mut self, v: u16) {
        self.intensity = U16::new(v);
    }

    pub fn return_number(&self) -> u8 {
        self.return_number
    }

    pub fn set_return_number(&mut self, v: u8) {
        self.return_number = v;
    }

    pub fn number_of_returns(&self) -> u8 {
        self.number_of_returns
    }

    pub fn set_number_of_returns(&mut self, v: u8) {
        self.number_of_returns = v;
    }

    pub fn classification(&self) -> u8 {
        self.classification
    }

    pub fn set_classification(&mut self, v: u8) {
        self.classification = v;
    }

    pub fn user_data(&self) -> u8 {
        self.user_data
    }

    pub fn set_user_data(&mut self, v: u8) {
        self.user_data = v;
    }

    pub fn gps_time(&self) -> f64 {
        f64::from_bits(self.gps_time.get())
    }

    pub fn set_gps_time(&mut self, v: f64) {
        self.gps_time = U64::new(v.to_bits());
    }

    pub fn color(&self) -> [u16; 3] {
        [self.red.get(), self.green.get(), self.blue.get()]
    }

    pub fn set_color(&mut self, r: u16, g: u16, b: u16) {
        self.red = U16::new(r);
        self.green = U16::new(g);
        self.blue = U16::new(b);
    }

    pub fn layer(&self) -> u32 {
        self.layer.get()
    }

    pub fn set_layer(&mut self, v: u32) {
        self.layer = U32::new(v);
    }

    pub fn elevation(&self) -> f64 {
        f64::from_bits(self.elevation.get())
    }

    pub fn set_elevation(&mut self, v: f64) {
        self.elevation = U64::new(v.to_bits());
    }

    pub fn descriptor(&self) -> f64 {
        f64::from_bits(self.descriptor.get())
    }

    pub fn set_descriptor(&mut self, v: f64) {
        self.descriptor = U64::new(v.to_bits());
    }

    pub fn density(&self) -> f64 {
        f64::from_bits(self.density.get())
    }

    pub fn set_density(&mut self, v: f64) {
        self.density = U64::new(v.to_bits());
    }
}

/// Header at offset 0 of an octree index file.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct OctreeFileHeader {
    magic: [u8; 16],
    version: U16,
    reserved0: U16,
    node_count: U32,
    leaf_capacity: U64,
    max_depth: U32,
    reserved1: U32,
    min: [U64; 3],
    max: [U64; 3],
    reserved2: [u8; 40],
}

const _: () = assert!(std::mem::size_of::<OctreeFileHeader>() == FILE_HEADER_SIZE);

impl OctreeFileHeader {
    pub fn new(node_count: u32, leaf_capacity: u64, max_depth: u32, boundary: &Box3) -> Self {
        Self {
            magic: OCTREE_MAGIC,
            version: U16::new(FORMAT_VERSION),
            reserved0: U16::new(0),
            node_count: U32::new(node_count),
            leaf_capacity: U64::new(leaf_capacity),
            max_depth: U32::new(max_depth),
            reserved1: U32::new(0),
            min: pack3(boundary.min()),
            max: pack3(boundary.max()),
            reserved2: [0; 40],
        }
    }

    pub fn from_bytes<'a>(bytes: &'a [u8], path: &Path) -> Result<&'a Self> {
        if bytes.len() < FILE_HEADER_SIZE {
            return Err(Error::format(path, "file too small for octree header"));
        }

        let header = Self::ref_from_bytes(&bytes[..FILE_HEADER_SIZE])
            .map_err(|_| Error::format(path, "misaligned octree header"))?;

        if header.magic != OCTREE_MAGIC {
            return Err(Error::format(path, "not an octree file (bad magic)"));
        }
        if header.version.get() != FORMAT_VERSION {
            return Err(Error::format(
                path,
                format!("unsupported octree file version {}", header.version.get()),
            ));
        }

        Ok(header)
    }

    pub fn node_count(&self) -> u32 {
        self.node_count.get()
    }

    pub fn leaf_capacity(&self) -> u64 {
        self.leaf_capacity.get()
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth.get()
    }

    pub fn boundary(&self) -> Box3 {
        Box3::new(unpack3(self.min), unpack3(self.max))
    }
}

/// One octree node as stored on disk.
///
/// `next[i] == 0` means "no child in octant i"; node 0 is the root and can
/// never be anyone's child. Leaves have all-zero `next` and carry the id of
/// the page holding their points.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct OctreeNodeRecord {
    from: U64,
    size: U64,
    page: U32,
    prev: U32,
    next: [U32; 8],
    reserved: [u8; 8],
}

const _: () = assert!(std::mem::size_of::<OctreeNodeRecord>() == OCTREE_NODE_SIZE);

impl OctreeNodeRecord {
    pub fn new(from: u64, size: u64, page: u32, prev: u32, next: [u32; 8]) -> Self {
        Self {
            from: U64::new(from),
            size: U64::new(size),
            page: U32::new(page),
            prev: U32::new(prev),
            next: next.map(U32::new),
            reserved: [0; 8],
        }
    }

    pub fn from(&self) -> u64 {
        self.from.get()
    }

    pub fn size(&self) -> u64 {
        self.size.get()
    }

    pub fn page(&self) -> u32 {
        self.page.get()
    }

    pub fn prev(&self) -> u32 {
        self.prev.get()
    }

    pub fn next(&self) -> [u32; 8] {
        self.next.map(|v| v.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use zerocopy::FromZeros;

    fn test_path() -> PathBuf {
        PathBuf::from("plot.spf")
    }

    #[test]
    fn point_header_roundtrip() {
        let boundary = Box3::new([0.0, 0.0, 0.0], [10.0, 20.0, 30.0]);
        let header = PointFileHeader::new(
            1_000_000,
            42,
            FLAG_INTENSITY | FLAG_COLOR,
            [0.001, 0.001, 0.001],
            [500_000.0, 5_400_000.0, 200.0],
            &boundary,
        );

        let bytes = header.as_bytes().to_vec();
        let parsed = PointFileHeader::from_bytes(&bytes, &test_path()).unwrap();

        assert_eq!(parsed.point_count(), 1_000_000);
        assert_eq!(parsed.page_count(), 42);
        assert_eq!(parsed.flags(), FLAG_INTENSITY | FLAG_COLOR);
        assert_eq!(parsed.scale(), [0.001, 0.001, 0.001]);
        assert_eq!(parsed.offset(), [500_000.0, 5_400_000.0, 200.0]);
        assert_eq!(parsed.boundary().max(), [10.0, 20.0, 30.0]);
    }

    #[test]
    fn point_header_rejects_bad_magic() {
        let boundary = Box3::new([0.0; 3], [1.0; 3]);
        let header = PointFileHeader::new(1, 1, 0, [1.0; 3], [0.0; 3], &boundary);

        let mut bytes = header.as_bytes().to_vec();
        bytes[0] = b'X';

        let err = PointFileHeader::from_bytes(&bytes, &test_path()).unwrap_err();
        assert!(matches!(err, crate::error::Error::Format { .. }));
    }

    #[test]
    fn point_header_rejects_short_buffer() {
        let bytes = [0u8; 64];
        assert!(PointFileHeader::from_bytes(&bytes, &test_path()).is_err());
    }

    #[test]
    fn point_header_rejects_future_version() {
        let boundary = Box3::new([0.0; 3], [1.0; 3]);
        let header = PointFileHeader::new(1, 1, 0, [1.0; 3], [0.0; 3], &boundary);

        let mut bytes = header.as_bytes().to_vec();
        bytes[16] = 99;

        assert!(PointFileHeader::from_bytes(&bytes, &test_path()).is_err());
    }

    #[test]
    fn directory_entry_written_flag() {
        let empty = DirectoryEntry::new(0, 0, 0, 0);
        let written = DirectoryEntry::new(128, 640, 10, 0xDEAD);

        assert!(!empty.is_written());
        assert!(written.is_written());
        assert_eq!(written.offset(), 128);
        assert_eq!(written.point_count(), 10);
    }

    #[test]
    fn point_record_field_roundtrip() {
        let mut record = PointRecord::new_zeroed();
        record.set_position(-12, 0, 77_000);
        record.set_intensity(4096);
        record.set_return_number(1);
        record.set_number_of_returns(3);
        record.set_classification(4);
        record.set_gps_time(123456.789);
        record.set_color(65535, 0, 32768);
        record.set_layer(7);
        record.set_elevation(1.25);
        record.set_descriptor(0.5);
        record.set_density(0.75);

        let bytes = record.as_bytes().to_vec();
        let parsed = PointRecord::ref_from_bytes(&bytes[..]).unwrap();

        assert_eq!(parsed.position(), [-12, 0, 77_000]);
        assert_eq!(parsed.intensity(), 4096);
        assert_eq!(parsed.return_number(), 1);
        assert_eq!(parsed.number_of_returns(), 3);
        assert_eq!(parsed.classification(), 4);
        assert_eq!(parsed.gps_time(), 123456.789);
        assert_eq!(parsed.color(), [65535, 0, 32768]);
        assert_eq!(parsed.layer(), 7);
        assert_eq!(parsed.elevation(), 1.25);
        assert_eq!(parsed.descriptor(), 0.5);
        assert_eq!(parsed.density(), 0.75);
    }

    #[test]
    fn octree_header_roundtrip() {
        let boundary = Box3::new([-5.0, -5.0, 0.0], [5.0, 5.0, 40.0]);
        let header = OctreeFileHeader::new(9, 10_000, 17, &boundary);

        let bytes = header.as_bytes().to_vec();
        let parsed = OctreeFileHeader::from_bytes(&bytes, &test_path()).unwrap();

        assert_eq!(parsed.node_count(), 9);
        assert_eq!(parsed.leaf_capacity(), 10_000);
        assert_eq!(parsed.max_depth(), 17);
        assert_eq!(parsed.boundary().min(), [-5.0, -5.0, 0.0]);
    }

    #[test]
    fn octree_node_roundtrip() {
        let node = OctreeNodeRecord::new(100, 5_000, 3, 0, [0, 2, 0, 0, 5, 0, 0, 8]);

        let bytes = node.as_bytes().to_vec();
        let parsed = OctreeNodeRecord::ref_from_bytes(&bytes[..]).unwrap();

        assert_eq!(parsed.from(), 100);
        assert_eq!(parsed.size(), 5_000);
        assert_eq!(parsed.page(), 3);
        assert_eq!(parsed.next(), [0, 2, 0, 0, 5, 0, 0, 8]);
    }
}
