//! Errors raised while storing, verifying and loading models

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use mindscore_core::error::{ErrorKind, KnownError};
use mindscore_core::protocol::ReferenceError;

/// Errors from the model store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Model reference string is malformed
    #[error("invalid model reference: {0}")]
    InvalidReference(#[from] ReferenceError),

    /// File bytes do not hash to the expected checksum
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Artifact path
        path: PathBuf,
        /// Checksum the caller asked for
        expected: String,
        /// Checksum of the bytes on disk
        actual: String,
    },

    /// Artifact bytes could not be serialized
    #[error("failed to encode model: {0}")]
    Encode(#[source] serde_json::Error),

    /// Artifact bytes are not a stored model
    #[error("failed to decode model at {path}: {source}")]
    Decode {
        /// Artifact path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// No cache entry for the checksum
    #[error("model not found in cache: {checksum}")]
    NotFound {
        /// Requested checksum
        checksum: String,
    },

    /// Filesystem failure
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// No model registered for the identity and kind
    #[error("no {kind} model registered for {identity}")]
    NoModel {
        /// Identity searched
        identity: String,
        /// Model kind searched
        kind: String,
    },

    /// Registry database failure
    #[error("registry error: {0}")]
    Registry(#[from] rusqlite::Error),

    /// A lock was poisoned by a panicking holder
    #[error("model store lock poisoned")]
    Locked,
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

impl KnownError for StoreError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::ModelLoading
    }

    fn code(&self) -> u16 {
        match self {
            Self::InvalidReference(_) => 1311,
            Self::ChecksumMismatch { .. } => 1312,
            Self::Encode(_) | Self::Decode { .. } => 1313,
            Self::NotFound { .. } => 1314,
            Self::Io { .. } | Self::Registry(_) | Self::Locked => 1315,
            Self::NoModel { .. } => 1316,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::InvalidReference(_) => "Model Name Error",
            Self::ChecksumMismatch { .. } => "Checksum Mismatch Error",
            Self::Encode(_) | Self::Decode { .. } => "Model Format Error",
            Self::NotFound { .. } => "Model Not Found Error",
            Self::Io { .. } | Self::Registry(_) | Self::Locked => "Model Storage Error",
            Self::NoModel { .. } => "No Model Error",
        }
    }
}
