//! # Page Store
//!
//! Persistent storage for one dataset's points, organized as fixed-layout
//! records grouped into variable-length pages. The matching octree index
//! (built at import time) maps spatial queries to page ids; this module only
//! knows how to get page bytes on and off disk.
//!
//! ## Write Strategy
//!
//! A page that is rewritten at its original size is updated in place. A page
//! whose size changed is appended at the end of the file and its directory
//! entry repointed, leaving a hole at the old location. Holes are only
//! reclaimed by re-importing the dataset; editing workloads shrink pages
//! rarely (point counts per page change only when points are deleted), so
//! the simplicity is worth the slack.
//!
//! The data bytes of an appended page are flushed before the directory entry
//! is repointed. A crash mid-write therefore leaves the old page intact and
//! readable; a torn in-place write is caught by the per-page checksum on the
//! next read.

mod headers;
mod mmap;

pub use headers::{
    DirectoryEntry, OctreeFileHeader, OctreeNodeRecord, PointFileHeader, PointRecord,
    FLAG_COLOR, FLAG_EXTENDED, FLAG_GPS_TIME, FLAG_INTENSITY, OCTREE_MAGIC, POINT_MAGIC,
};
pub use mmap::MmapFile;

use std::path::{Path, PathBuf};

use crc::{Crc, CRC_64_ECMA_182};
use zerocopy::{FromBytes, IntoBytes};

use crate::config::{DIRECTORY_ENTRY_SIZE, FILE_HEADER_SIZE, POINT_RECORD_SIZE};
use crate::error::{Error, Result};
use crate::geometry::Box3;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

/// Computes the checksum stored in a page's directory entry.
pub(crate) fn page_checksum(bytes: &[u8]) -> u64 {
    CRC64.checksum(bytes)
}

/// One dataset's point file: header, page directory, page data.
#[derive(Debug)]
pub struct PageStore {
    file: MmapFile,
    point_count: u64,
    page_count: u32,
    flags: u16,
    scale: [f64; 3],
    offset: [f64; 3],
    boundary: Box3,
}

impl PageStore {
    /// Creates a new point file with an all-unwritten page directory.
    ///
    /// The caller (normally the importer) follows up with one `write_page`
    /// per page; until then every directory entry reads back as unwritten.
    #[allow(clippy::too_many_arguments)]
    pub fn create<P: AsRef<Path>>(
        path: P,
        point_count: u64,
        page_count: u32,
        flags: u16,
        scale: [f64; 3],
        offset: [f64; 3],
        boundary: &Box3,
    ) -> Result<Self> {
        let path = path.as_ref();

        let initial_len =
            FILE_HEADER_SIZE as u64 + page_count as u64 * DIRECTORY_ENTRY_SIZE as u64;
        let mut file = MmapFile::create(path, initial_len)?;

        let header =
            PointFileHeader::new(point_count, page_count, flags, scale, offset, boundary);
        file.bytes_mut(0, FILE_HEADER_SIZE)?
            .copy_from_slice(header.as_bytes());

        // A fresh file is zero-filled, so the directory already marks every
        // page unwritten.

        Ok(Self {
            file,
            point_count,
            page_count,
            flags,
            scale,
            offset,
            boundary: *boundary,
        })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let file = MmapFile::open(path)?;

        if file.len() < FILE_HEADER_SIZE as u64 {
            return Err(Error::format(path, "file too small for point header"));
        }

        let header_bytes = file.bytes(0, FILE_HEADER_SIZE)?;
        let header = PointFileHeader::from_bytes(header_bytes, path)?;

        let point_count = header.point_count();
        let page_count = header.page_count();
        let flags = header.flags();
        let scale = header.scale();
        let offset = header.offset();
        let boundary = header.boundary();

        let directory_end =
            FILE_HEADER_SIZE as u64 + page_count as u64 * DIRECTORY_ENTRY_SIZE as u64;
        if file.len() < directory_end {
            return Err(Error::format(path, "truncated page directory"));
        }

        Ok(Self {
            file,
            point_count,
            page_count,
            flags,
            scale,
            offset,
            boundary,
        })
    }

    /// Reads a page's raw record bytes, validating the stored checksum.
    pub fn read_page(&self, page_id: u32) -> Result<Vec<u8>> {
        let entry = self.entry(page_id)?;

        if !entry.is_written() {
            return Err(Error::format(
                self.file.path(),
                format!("page {page_id} has never been written"),
            ));
        }

        let byte_len = entry.byte_len();
        if byte_len % POINT_RECORD_SIZE as u64 != 0
            || entry.point_count() * POINT_RECORD_SIZE as u64 != byte_len
        {
            return Err(Error::format(
                self.file.path(),
                format!("directory entry for page {page_id} is inconsistent"),
            ));
        }

        let bytes = self.file.bytes(entry.offset(), byte_len as usize)?;

        let crc = page_checksum(bytes);
        if crc != entry.crc() {
            return Err(Error::format(
                self.file.path(),
                format!("checksum mismatch in page {page_id}"),
            ));
        }

        Ok(bytes.to_vec())
    }

    /// Writes a page's record bytes, in place when the size is unchanged and
    /// by append otherwise.
    pub fn write_page(&mut self, page_id: u32, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() || bytes.len() % POINT_RECORD_SIZE != 0 {
            return Err(Error::format(
                self.file.path(),
                format!(
                    "page {page_id} write of {} bytes is not a whole number of records",
                    bytes.len()
                ),
            ));
        }

        let entry = self.entry(page_id)?;
        let byte_len = bytes.len() as u64;
        let point_count = byte_len / POINT_RECORD_SIZE as u64;
        let crc = page_checksum(bytes);

        let data_offset = if entry.is_written() && entry.byte_len() == byte_len {
            self.file
                .bytes_mut(entry.offset(), bytes.len())?
                .copy_from_slice(bytes);
            entry.offset()
        } else {
            let data_offset = self.file.len();
            self.file.grow(data_offset + byte_len)?;
            self.file
                .bytes_mut(data_offset, bytes.len())?
                .copy_from_slice(bytes);
            // Flush the data before the directory points at it; the old page
            // stays readable if this write never completes.
            self.file.sync()?;
            data_offset
        };

        let updated = DirectoryEntry::new(data_offset, byte_len, point_count, crc);
        self.write_entry(page_id, &updated)?;

        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync()
    }

    fn entry_offset(page_id: u32) -> u64 {
        FILE_HEADER_SIZE as u64 + page_id as u64 * DIRECTORY_ENTRY_SIZE as u64
    }

    fn entry(&self, page_id: u32) -> Result<DirectoryEntry> {
        if page_id >= self.page_count {
            return Err(Error::format(
                self.file.path(),
                format!(
                    "page id {page_id} out of range ({} pages)",
                    self.page_count
                ),
            ));
        }

        let bytes = self
            .file
            .bytes(Self::entry_offset(page_id), DIRECTORY_ENTRY_SIZE)?;
        let entry = DirectoryEntry::ref_from_bytes(bytes)
            .map_err(|_| Error::format(self.file.path(), "misaligned directory entry"))?;

        Ok(*entry)
    }

    fn write_entry(&mut self, page_id: u32, entry: &DirectoryEntry) -> Result<()> {
        self.file
            .bytes_mut(Self::entry_offset(page_id), DIRECTORY_ENTRY_SIZE)?
            .copy_from_slice(entry.as_bytes());
        Ok(())
    }

    pub fn point_count(&self) -> u64 {
        self.point_count
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Page point count from the directory, without touching page data.
    pub fn page_point_count(&self, page_id: u32) -> Result<u64> {
        Ok(self.entry(page_id)?.point_count())
    }

    pub fn flags(&self) -> u16 {
        self.flags
    }

    pub fn scale(&self) -> [f64; 3] {
        self.scale
    }

    pub fn offset(&self) -> [f64; 3] {
        self.offset
    }

    /// Boundary of all points in file coordinates.
    pub fn boundary(&self) -> &Box3 {
        &self.boundary
    }

    pub fn path(&self) -> PathBuf {
        self.file.path().to_path_buf()
    }
}
