//! EEG data sources
//!
//! The service reads labelled training records and fresh prediction records
//! through [`EegDataSource`]. [`FileDataSource`] serves JSON files laid out
//! per caller identity.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use mindscore_core::error::{ErrorKind, KnownError, SegmentError};
use mindscore_core::types::{EegSegment, ModelInfo, DEFAULT_SAMPLE_RATE_HZ};

/// Lookup key for data; the same identity a model is trained for
pub type DataQuery = ModelInfo;

/// Training records file name
pub const TRAIN_FILE: &str = "train.json";

/// Prediction records file name
pub const PREDICT_FILE: &str = "predict.json";

/// One uploaded block of EEG.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EegRecord {
    /// Time of the first sample
    pub created_at: DateTime<Utc>,
    /// Sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,
    /// Channels × samples
    pub data: Vec<Vec<f64>>,
    /// Class label; required for training records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

fn default_sample_rate() -> f64 {
    DEFAULT_SAMPLE_RATE_HZ
}

impl EegRecord {
    /// Validate into a segment
    pub fn to_segment(&self) -> Result<EegSegment, SegmentError> {
        EegSegment::new(self.created_at, self.sample_rate, self.data.clone())
    }
}

/// Errors reaching a data source
#[derive(Debug, Error)]
pub enum DataFetchError {
    /// No data stored for the identity
    #[error("no data at {path}")]
    NotFound {
        /// Expected location
        path: PathBuf,
    },

    /// Read failure
    #[error("failed to read {path}: {source}")]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// File is not a JSON array of records
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File being parsed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// Identity field that is not a single directory name
    #[error("invalid {field} {value:?}: must be a single path component")]
    InvalidIdentity {
        /// Offending identity field
        field: &'static str,
        /// Value as received
        value: String,
    },

    /// Backend-specific failure
    #[error("data source unavailable: {0}")]
    Unavailable(String),
}

impl KnownError for DataFetchError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::DataFetching
    }

    fn code(&self) -> u16 {
        ErrorKind::DataFetching.code()
    }

    fn name(&self) -> &'static str {
        "Data Fetching Error"
    }
}

/// Source of EEG records for an identity.
pub trait EegDataSource: Send + Sync {
    /// Labelled records to train on
    fn fetch_training(&self, query: &DataQuery) -> Result<Vec<EegRecord>, DataFetchError>;

    /// Most recent unlabelled records to score
    fn fetch_prediction(&self, query: &DataQuery) -> Result<Vec<EegRecord>, DataFetchError>;
}

/// Records stored as JSON files under
/// `<root>/<org_id>/<user_id>/<project_name>/<name>/{train,predict}.json`.
///
/// Files are re-read on every fetch so a device appending to
/// `predict.json` is picked up by the retry loop.
#[derive(Clone, Debug)]
pub struct FileDataSource {
    root: PathBuf,
}

impl FileDataSource {
    /// Serve records below `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the files of one identity.
    ///
    /// Every identity field must name exactly one directory below the root.
    pub fn identity_dir(&self, query: &DataQuery) -> Result<PathBuf, DataFetchError> {
        let parts = [
            ("org_id", &query.org_id),
            ("user_id", &query.user_id),
            ("project_name", &query.project_name),
            ("name", &query.name),
        ];

        let mut dir = self.root.clone();
        for (field, value) in parts {
            dir.push(path_component(field, value)?);
        }
        Ok(dir)
    }

    fn read_records(path: &Path) -> Result<Vec<EegRecord>, DataFetchError> {
        let bytes = fs::read(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => DataFetchError::NotFound { path: path.to_path_buf() },
            _ => DataFetchError::Io { path: path.to_path_buf(), source },
        })?;

        let records: Vec<EegRecord> = serde_json::from_slice(&bytes).map_err(|source| DataFetchError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        debug!(path = %path.display(), records = records.len(), "Read EEG records");
        Ok(records)
    }
}

fn path_component<'a>(field: &'static str, value: &'a str) -> Result<&'a Path, DataFetchError> {
    let path = Path::new(value);
    let mut components = path.components();
    let single = matches!((components.next(), components.next()), (Some(Component::Normal(_)), None));

    // `components()` folds "a/" and "a/." into "a"; reject separators outright.
    if single && !value.contains(['/', '\\']) {
        Ok(path)
    } else {
        Err(DataFetchError::InvalidIdentity {
            field,
            value: value.to_string(),
        })
    }
}

impl EegDataSource for FileDataSource {
    fn fetch_training(&self, query: &DataQuery) -> Result<Vec<EegRecord>, DataFetchError> {
        Self::read_records(&self.identity_dir(query)?.join(TRAIN_FILE))
    }

    fn fetch_prediction(&self, query: &DataQuery) -> Result<Vec<EegRecord>, DataFetchError> {
        Self::read_records(&self.identity_dir(query)?.join(PREDICT_FILE))
    }
}
