//! Crate-wide error type.
//!
//! One `thiserror` enum with a variant per failure category, rather than a
//! grab-bag of `anyhow`-style strings, so callers can match on what went
//! wrong.

use thiserror::Error;

use crate::backup::cancel::Cancelled;
use crate::backup::codec::CodecError;
use crate::backup::remote::RemoteFailure;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("corruption in {path} at block {blkno}: {reason}")]
    Corruption { path: String, blkno: u32, reason: String },

    #[error("{0}")]
    Cancelled(#[from] Cancelled),

    #[error("remote agent failure: {0}")]
    Remote(#[from] RemoteFailure),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("invalid argument: {0}")]
    Argument(String),
}

impl BackupError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        BackupError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn corruption(path: impl Into<String>, blkno: u32, reason: impl Into<String>) -> Self {
        BackupError::Corruption {
            path: path.into(),
            blkno,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
