//! Diagnostic dumps of failed requests
//!
//! Each failure is written as one JSON document under a per-day directory:
//! `<dumps>/<YYYYMMDD>/<kind>-dump.<YYYYMMDD-HHMMSS>-<uuid>.json`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Which request failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DumpKind {
    /// Train request
    Train,
    /// Predict request
    Predict,
}

impl DumpKind {
    /// File name prefix
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Train => "train-dump",
            Self::Predict => "predict-dump",
        }
    }
}

/// Errors writing a dump
#[derive(Debug, Error)]
pub enum DumpError {
    /// Directory or file could not be written
    #[error("failed to write dump {path}: {source}")]
    Io {
        /// Target path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Payload could not be encoded
    #[error("failed to encode dump: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Writes failure dumps below a root directory.
#[derive(Clone, Debug)]
pub struct DumpWriter {
    root: PathBuf,
}

impl DumpWriter {
    /// Writer rooted at `root`; nothing is created until the first dump
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `body` and return the file it went to.
    pub fn write<T: Serialize>(&self, kind: DumpKind, body: &T) -> Result<PathBuf, DumpError> {
        let now = Local::now();
        let dir = self.root.join(now.format("%Y%m%d").to_string());
        let path = dir.join(format!(
            "{}.{}-{}.json",
            kind.prefix(),
            now.format("%Y%m%d-%H%M%S"),
            Uuid::new_v4()
        ));

        let bytes = serde_json::to_vec_pretty(body)?;
        fs::create_dir_all(&dir).map_err(|source| DumpError::Io { path: dir.clone(), source })?;
        fs::write(&path, bytes).map_err(|source| DumpError::Io { path: path.clone(), source })?;

        debug!(path = %path.display(), "Dumped failed request");
        Ok(path)
    }

    /// [`Self::write`], logging instead of failing
    pub fn write_logged<T: Serialize>(&self, kind: DumpKind, body: &T) -> Option<PathBuf> {
        match self.write(kind, body) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(error = %e, kind = kind.prefix(), "Could not write failure dump");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dump_layout() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DumpWriter::new(dir.path().join("dumps"));

        let path = writer
            .write(DumpKind::Predict, &json!({"error": "not enough data"}))
            .unwrap();

        let day = path.parent().unwrap();
        assert_eq!(day.parent().unwrap(), writer.root());
        assert_eq!(day.file_name().unwrap().len(), "YYYYMMDD".len());

        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("predict-dump."));
        assert!(name.ends_with(".json"));

        let back: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(back["error"], "not enough data");
    }

    #[test]
    fn test_dumps_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DumpWriter::new(dir.path());

        let a = writer.write(DumpKind::Train, &json!({})).unwrap();
        let b = writer.write(DumpKind::Train, &json!({})).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_unwritable_root_is_logged() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();

        let writer = DumpWriter::new(&blocker);
        assert!(writer.write_logged(DumpKind::Train, &json!({})).is_none());
    }
}
