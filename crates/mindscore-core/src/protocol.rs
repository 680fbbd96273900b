//! Wire formats shared with external callers
//!
//! - [`ModelReference`]: the `"<path>,<checksum>"` string produced by training
//!   and consumed by prediction
//! - [`Response`]: the success/error envelope returned for every request

use core::fmt;
use core::str::FromStr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, KnownError};

/// Length of a SHA-256 digest in hex characters
pub const CHECKSUM_HEX_LEN: usize = 64;

// ============================================================================
// Model Reference
// ============================================================================

/// Location and checksum of a stored model artifact.
///
/// Formats as `"<filesystem_path>,<sha256_hex>"`. Parsing splits on the last
/// comma so paths that contain commas survive the round trip.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModelReference {
    path: PathBuf,
    checksum: String,
}

impl ModelReference {
    /// Build a reference from its parts.
    pub fn new(path: impl Into<PathBuf>, checksum: impl Into<String>) -> Result<Self, ReferenceError> {
        let path = path.into();
        let checksum = checksum.into();

        if path.as_os_str().is_empty() {
            return Err(ReferenceError::EmptyPath);
        }
        if checksum.len() != CHECKSUM_HEX_LEN || !checksum.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ReferenceError::InvalidChecksum(checksum));
        }

        Ok(Self {
            path,
            checksum: checksum.to_ascii_lowercase(),
        })
    }

    /// Artifact path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lowercase hex SHA-256 of the artifact bytes
    #[must_use]
    pub fn checksum(&self) -> &str {
        &self.checksum
    }
}

impl fmt::Display for ModelReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.path.display(), self.checksum)
    }
}

impl FromStr for ModelReference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path, checksum) = s
            .rsplit_once(',')
            .ok_or_else(|| ReferenceError::MissingSeparator(s.to_string()))?;
        Self::new(path.trim(), checksum.trim())
    }
}

impl Serialize for ModelReference {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ModelReference {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors parsing a model reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReferenceError {
    /// No comma between path and checksum
    MissingSeparator(String),
    /// Path part is empty
    EmptyPath,
    /// Checksum part is not 64 hex characters
    InvalidChecksum(String),
}

impl fmt::Display for ReferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSeparator(raw) => write!(f, "model reference {raw:?} is not \"<path>,<checksum>\""),
            Self::EmptyPath => f.write_str("model reference has an empty path"),
            Self::InvalidChecksum(raw) => write!(f, "{raw:?} is not a SHA-256 hex digest"),
        }
    }
}

impl std::error::Error for ReferenceError {}

impl KnownError for ReferenceError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::ModelLoading
    }

    fn code(&self) -> u16 {
        1311
    }

    fn name(&self) -> &'static str {
        "Model Name Error"
    }
}

// ============================================================================
// Response Envelope
// ============================================================================

/// Structured result of a request.
///
/// Serializes with a `status` tag of `"success"` or `"error"`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response<T> {
    /// Request succeeded
    Success {
        /// Result payload
        body: T,
    },
    /// Request failed
    Error {
        /// Public message of the error kind
        msg: String,
        /// Detailed error name
        name: String,
        /// Detailed error code
        code: u16,
        /// Coarse error kind
        kind: ErrorKind,
        /// Error description
        detail: String,
        /// Echo of the request body
        body: serde_json::Value,
    },
}

impl<T> Response<T> {
    /// Wrap a successful payload
    pub fn success(body: T) -> Self {
        Self::Success { body }
    }

    /// Describe a failure
    pub fn error<E: KnownError + ?Sized>(err: &E, body: serde_json::Value) -> Self {
        let kind = err.kind();
        Self::Error {
            msg: kind.msg().to_string(),
            name: err.name().to_string(),
            code: err.code(),
            kind,
            detail: err.to_string(),
            body,
        }
    }

    /// True for the success variant
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PredictingError;

    const CHECKSUM: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    #[test]
    fn test_reference_round_trip_format() {
        let reference: ModelReference = format!("/srv/models/a.model,{CHECKSUM}").parse().unwrap();
        assert_eq!(reference.path(), Path::new("/srv/models/a.model"));
        assert_eq!(reference.checksum(), CHECKSUM);
        assert_eq!(reference.to_string(), format!("/srv/models/a.model,{CHECKSUM}"));
    }

    #[test]
    fn test_reference_splits_on_last_comma() {
        let reference: ModelReference = format!("/srv/a,b.model,{CHECKSUM}").parse().unwrap();
        assert_eq!(reference.path(), Path::new("/srv/a,b.model"));
    }

    #[test]
    fn test_reference_rejects_bad_input() {
        assert!(matches!(
            "no-separator".parse::<ModelReference>(),
            Err(ReferenceError::MissingSeparator(_))
        ));
        assert!(matches!(
            format!(",{CHECKSUM}").parse::<ModelReference>(),
            Err(ReferenceError::EmptyPath)
        ));
        assert!(matches!(
            "/srv/a.model,abc".parse::<ModelReference>(),
            Err(ReferenceError::InvalidChecksum(_))
        ));
    }

    #[test]
    fn test_reference_normalizes_case() {
        let upper = CHECKSUM.to_ascii_uppercase();
        let reference = ModelReference::new("/srv/a.model", upper).unwrap();
        assert_eq!(reference.checksum(), CHECKSUM);
    }

    #[test]
    fn test_error_envelope() {
        let err = PredictingError::ExceedMaximumAttempts { attempts: 10 };
        let response: Response<()> = Response::error(&err, serde_json::json!({"name": "n"}));

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["code"], 1515);
        assert_eq!(json["kind"], "inference");
        assert!(!response.is_success());
    }

    #[test]
    fn test_success_envelope() {
        let response = Response::success(serde_json::json!({"pred": 42}));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["body"]["pred"], 42);
    }
}
