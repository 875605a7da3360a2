//! # Memory-Mapped File Access
//!
//! `MmapFile` is the low-level building block under [`PageStore`]: a
//! read-write mapping of one dataset file with bounds-checked byte-range
//! access. Unlike a fixed-page pager, point pages are variable-length byte
//! ranges located by the page directory, so access here is byte-granular.
//!
//! ## Safety Considerations
//!
//! A mapped region becomes invalid when the file is remapped during
//! `grow()`. Rather than hazard pointers or epoch tracking, the borrow
//! checker enforces safety:
//!
//! ```text
//! bytes(&self, ..) -> &[u8]          // Immutable borrow of self
//! bytes_mut(&mut self, ..) -> &mut [u8]  // Mutable borrow of self
//! grow(&mut self, ..)                // Mutable borrow (exclusive)
//! ```
//!
//! Since `grow()` requires `&mut self`, no byte slice can outlive a remap.
//!
//! [`PageStore`]: super::PageStore

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::MmapMut;

use crate::error::{Error, Result};

#[derive(Debug)]
pub struct MmapFile {
    path: PathBuf,
    file: File,
    mmap: MmapMut,
    len: u64,
}

impl MmapFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| Error::io(path, e))?;

        let len = file.metadata().map_err(|e| Error::io(path, e))?.len();

        if len == 0 {
            return Err(Error::format(path, "file is empty"));
        }

        // SAFETY: MmapMut::map_mut is unsafe because memory-mapped files can
        // be modified externally, leading to undefined behavior. This is safe
        // because:
        // 1. The file is opened read+write and dataset files are not meant to
        //    be touched by other processes while open
        // 2. The mmap lifetime is tied to MmapFile, preventing use-after-unmap
        // 3. All access goes through bytes()/bytes_mut() which bounds-check
        //    the requested range against the mapped length
        let mmap = unsafe { MmapMut::map_mut(&file).map_err(|e| Error::io(path, e))? };

        Ok(Self {
            path: path.to_path_buf(),
            file,
            mmap,
            len,
        })
    }

    pub fn create<P: AsRef<Path>>(path: P, initial_len: u64) -> Result<Self> {
        let path = path.as_ref();

        if initial_len == 0 {
            return Err(Error::format(path, "initial length must be at least 1 byte"));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| Error::io(path, e))?;

        file.set_len(initial_len).map_err(|e| Error::io(path, e))?;

        // SAFETY: MmapMut::map_mut is unsafe because memory-mapped files can
        // be modified externally. This is safe because:
        // 1. The file was just created with truncate=true, so this process
        //    holds the only handle that matters
        // 2. The length was set to initial_len before mapping
        // 3. The mmap lifetime is tied to MmapFile, preventing use-after-unmap
        let mmap = unsafe { MmapMut::map_mut(&file).map_err(|e| Error::io(path, e))? };

        Ok(Self {
            path: path.to_path_buf(),
            file,
            mmap,
            len: initial_len,
        })
    }

    pub fn bytes(&self, offset: u64, len: usize) -> Result<&[u8]> {
        self.check_range(offset, len)?;
        let start = offset as usize;
        Ok(&self.mmap[start..start + len])
    }

    pub fn bytes_mut(&mut self, offset: u64, len: usize) -> Result<&mut [u8]> {
        self.check_range(offset, len)?;
        let start = offset as usize;
        Ok(&mut self.mmap[start..start + len])
    }

    fn check_range(&self, offset: u64, len: usize) -> Result<()> {
        let end = offset.checked_add(len as u64);
        match end {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(Error::io(
                &self.path,
                std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!(
                        "range {}..{} exceeds file length {}",
                        offset,
                        offset.saturating_add(len as u64),
                        self.len
                    ),
                ),
            )),
        }
    }

    pub fn grow(&mut self, new_len: u64) -> Result<()> {
        if new_len <= self.len {
            return Ok(());
        }

        self.mmap.flush().map_err(|e| Error::io(&self.path, e))?;

        self.file
            .set_len(new_len)
            .map_err(|e| Error::io(&self.path, e))?;

        // SAFETY: MmapMut::map_mut is unsafe because the old mapping becomes
        // invalid. This is safe because:
        // 1. grow() takes &mut self, so the borrow checker guarantees no
        //    outstanding byte slices into the old mapping
        // 2. The old mapping was flushed above before being dropped
        // 3. The file was extended to new_len before remapping
        self.mmap = unsafe { MmapMut::map_mut(&self.file).map_err(|e| Error::io(&self.path, e))? };

        self.len = new_len;

        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        self.mmap.flush().map_err(|e| Error::io(&self.path, e))
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
