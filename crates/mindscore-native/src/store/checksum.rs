//! Content-checksummed model artifacts
//!
//! Artifacts are JSON documents `{"model": .., "info": ..}`. The SHA-256 of
//! the exact bytes on disk identifies an artifact; a read whose bytes hash to
//! anything else is refused before deserialization.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use mindscore_core::protocol::ModelReference;
use mindscore_core::types::ModelInfo;

use super::error::{StoreError, StoreResult};

/// Extension of stored artifacts
pub const MODEL_EXTENSION: &str = "model";

/// On-disk layout of an artifact
#[derive(Serialize, Deserialize)]
struct Artifact<M> {
    model: M,
    info: ModelInfo,
}

/// Borrowed form used when writing
#[derive(Serialize)]
struct ArtifactRef<'a, M> {
    model: &'a M,
    info: &'a ModelInfo,
}

/// Lowercase hex SHA-256 of `bytes`
#[must_use]
pub fn checksum_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Lowercase hex SHA-256 of the file at `path`
pub fn checksum_file(path: &Path) -> StoreResult<String> {
    let bytes = fs::read(path).map_err(|e| StoreError::io(path, e))?;
    Ok(checksum_bytes(&bytes))
}

/// Writes, verifies and reads checksummed model artifacts.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChecksumSystem;

impl ChecksumSystem {
    /// Create a checksum system
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// A fresh `<sha256>.model` file name for `info`.
    ///
    /// Hashes the identity with the current time and a random number, so two
    /// calls never collide in practice.
    #[must_use]
    pub fn generate_random_filename(&self, info: &ModelInfo) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let salt: f64 = rand::thread_rng().gen();

        let digest = checksum_bytes(format!("{info}-{now}-{salt}").as_bytes());
        format!("{digest}.{MODEL_EXTENSION}")
    }

    /// Serialize `model` with its `info` to `dst` and return the checksum.
    ///
    /// Parent directories are created. The artifact is written to a
    /// temporary file in the destination directory and renamed into place,
    /// then read back so the checksum covers exactly what is on disk.
    pub fn save_model<M: Serialize>(&self, info: &ModelInfo, model: &M, dst: &Path) -> StoreResult<String> {
        let parent = match dst.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| StoreError::io(&parent, e))?;

        let bytes = serde_json::to_vec(&ArtifactRef { model, info }).map_err(StoreError::Encode)?;

        let mut tmp = NamedTempFile::new_in(&parent).map_err(|e| StoreError::io(&parent, e))?;
        tmp.write_all(&bytes).map_err(|e| StoreError::io(tmp.path(), e))?;
        tmp.as_file().sync_all().map_err(|e| StoreError::io(tmp.path(), e))?;
        tmp.persist(dst).map_err(|e| StoreError::io(dst, e.error))?;

        let checksum = checksum_file(dst)?;
        info!(path = %dst.display(), checksum = %checksum, "Model saved");
        Ok(checksum)
    }

    /// Read the artifact at `path`, refusing it unless its bytes hash to
    /// `expected_checksum` (compared case-insensitively).
    pub fn read_model<M: DeserializeOwned>(
        &self,
        path: &Path,
        expected_checksum: &str,
    ) -> StoreResult<(M, ModelInfo, String)> {
        let bytes = fs::read(path).map_err(|e| StoreError::io(path, e))?;
        let actual = checksum_bytes(&bytes);

        if !actual.eq_ignore_ascii_case(expected_checksum) {
            warn!(path = %path.display(), expected = %expected_checksum, actual = %actual, "Checksum mismatch");
            return Err(StoreError::ChecksumMismatch {
                path: path.to_path_buf(),
                expected: expected_checksum.to_string(),
                actual,
            });
        }

        let artifact: Artifact<M> = serde_json::from_slice(&bytes).map_err(|source| StoreError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

        info!(path = %path.display(), checksum = %actual, "Model loaded");
        Ok((artifact.model, artifact.info, actual))
    }

    /// Read the artifact a reference points at
    pub fn read_reference<M: DeserializeOwned>(&self, reference: &ModelReference) -> StoreResult<(M, ModelInfo, String)> {
        self.read_model(reference.path(), reference.checksum())
    }

    /// Check that the file behind `reference` still has its checksum
    pub fn verify(&self, reference: &ModelReference) -> StoreResult<()> {
        let actual = checksum_file(reference.path())?;
        if actual.eq_ignore_ascii_case(reference.checksum()) {
            Ok(())
        } else {
            Err(StoreError::ChecksumMismatch {
                path: reference.path().to_path_buf(),
                expected: reference.checksum().to_string(),
                actual,
            })
        }
    }
}
