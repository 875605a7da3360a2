//! Error taxonomy for the engine.
//!
//! Four failure classes cross the public API:
//!
//! - [`Error::Io`] - file open/read/write failure at the store boundary
//! - [`Error::Format`] - stored content inconsistent with the schema
//! - [`Error::IndexBuild`] - malformed or empty input at index construction
//! - [`Error::InvalidSelector`] - an operation names a dataset or layer that
//!   does not exist
//!
//! Propagation policy: errors local to one page during a scan are absorbed by
//! the query (the page is skipped and logged); errors that prevent opening a
//! dataset or committing an import propagate and abort only that operation.

use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// File open, read, write or rename failure.
    #[error("i/o failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Stored bytes disagree with the schema: bad magic, unsupported
    /// version, wrong record length or checksum mismatch.
    #[error("format error in {path}: {reason}")]
    Format { path: PathBuf, reason: String },

    /// Index construction rejected its input.
    #[error("index build failed: {0}")]
    IndexBuild(String),

    /// An operation referenced a dataset or layer id that is not open.
    #[error("invalid selector: {0}")]
    InvalidSelector(String),
}

impl Error {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Error::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn format(path: &Path, reason: impl Into<String>) -> Self {
        Error::Format {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}
