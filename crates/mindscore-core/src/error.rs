//! Error types for mindscore
//!
//! Every failure that can reach a caller belongs to one [`ErrorKind`]. The
//! kind fixes the public message, name and status code; the detailed enums
//! below carry their own numeric codes so a response can say exactly which
//! known condition was hit.

use core::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Error Kinds
// ============================================================================

/// Coarse classification of failures at the request boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or missing request fields
    Request,
    /// Brain-wave or behaviour data in the wrong shape
    DataFormat,
    /// Failure while fitting a model
    Training,
    /// Failure while scoring with a model
    Inference,
    /// Failure while locating, verifying or decoding a stored model
    ModelLoading,
    /// Upstream data source unavailable
    DataFetching,
}

impl ErrorKind {
    /// Human-readable message
    #[must_use]
    pub const fn msg(self) -> &'static str {
        match self {
            Self::Request => "Missing parameters, malformed fields or invalid request",
            Self::DataFormat => "Brain-wave or behaviour data has an invalid format",
            Self::Training => "An error occurred while training the model",
            Self::Inference => "An error occurred while running model inference",
            Self::ModelLoading => "An error occurred while loading the requested model",
            Self::DataFetching => "An error occurred while fetching data",
        }
    }

    /// Status name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Request => "Bad Request",
            Self::DataFormat => "Unprocessable Entity",
            Self::Training
            | Self::Inference
            | Self::ModelLoading
            | Self::DataFetching => "Internal Server Error",
        }
    }

    /// HTTP-style status code
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Request => 400,
            Self::DataFormat => 422,
            Self::Training
            | Self::Inference
            | Self::ModelLoading
            | Self::DataFetching => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.code(), self.msg())
    }
}

/// A failure that maps onto the public taxonomy.
pub trait KnownError: std::error::Error {
    /// Coarse kind
    fn kind(&self) -> ErrorKind;

    /// Detailed numeric code
    fn code(&self) -> u16;

    /// Short name of the detailed condition
    fn name(&self) -> &'static str;
}

// ============================================================================
// Segment Errors
// ============================================================================

/// Errors building or combining EEG segments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SegmentError {
    /// No channels or no samples
    Empty,
    /// Sample rate is zero, negative or not finite
    InvalidSampleRate {
        /// Offending value
        sample_rate: f64,
    },
    /// A row has a different length than row 0
    RaggedChannels {
        /// Offending row
        channel: usize,
        /// Length of row 0
        expected: usize,
        /// Length of the offending row
        got: usize,
    },
    /// Parts disagree on channel count
    ChannelMismatch {
        /// Channel count of the first part
        expected: usize,
        /// Channel count of the offending part
        got: usize,
    },
    /// Parts disagree on sample rate
    SampleRateMismatch {
        /// Sample rate of the first part
        expected: f64,
        /// Sample rate of the offending part
        got: f64,
    },
}

impl fmt::Display for SegmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("segment has no samples"),
            Self::InvalidSampleRate { sample_rate } => {
                write!(f, "invalid sample rate: {sample_rate} Hz")
            }
            Self::RaggedChannels { channel, expected, got } => {
                write!(f, "channel {channel} has {got} samples, expected {expected}")
            }
            Self::ChannelMismatch { expected, got } => {
                write!(f, "segment has {got} channels, expected {expected}")
            }
            Self::SampleRateMismatch { expected, got } => {
                write!(f, "segment sampled at {got} Hz, expected {expected} Hz")
            }
        }
    }
}

impl std::error::Error for SegmentError {}

// ============================================================================
// Request Errors
// ============================================================================

/// Errors validating an incoming request body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestError {
    /// Body is not a JSON object
    NotAnObject,
    /// A required key is absent or not a string
    MissingField {
        /// Key name
        field: &'static str,
    },
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject => f.write_str("request body must be a JSON object"),
            Self::MissingField { field } => write!(f, "missing or invalid field: {field}"),
        }
    }
}

impl std::error::Error for RequestError {}

impl KnownError for RequestError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Request
    }

    fn code(&self) -> u16 {
        ErrorKind::Request.code()
    }

    fn name(&self) -> &'static str {
        ErrorKind::Request.name()
    }
}

// ============================================================================
// Training Errors
// ============================================================================

/// Known failures while building a training set or fitting a model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TrainingError {
    /// Labels contain no usable class
    Label {
        /// What is missing
        reason: String,
    },
    /// Not enough data to train
    DataShortage {
        /// Seconds of data available
        got_secs: f64,
        /// Seconds of data required
        need_secs: f64,
    },
    /// Data cannot be split by the requested labels
    DataFormat {
        /// What is wrong
        reason: String,
    },
    /// The model fit itself failed
    ModelTraining {
        /// What failed
        reason: String,
    },
    /// Number of data records and labels differ
    DataLabelMismatch {
        /// Data record count
        data: usize,
        /// Label count
        labels: usize,
    },
    /// No model is routed for the project
    ProjectName {
        /// Requested project
        project_name: String,
    },
    /// Anything outside the list above
    Unexpected {
        /// What happened
        reason: String,
    },
}

impl fmt::Display for TrainingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Label { reason } => write!(f, "label error: {reason}"),
            Self::DataShortage { got_secs, need_secs } => {
                write!(f, "not enough data to train: {got_secs:.1}s available, {need_secs:.1}s required")
            }
            Self::DataFormat { reason } => write!(f, "training data format error: {reason}"),
            Self::ModelTraining { reason } => write!(f, "model training failed: {reason}"),
            Self::DataLabelMismatch { data, labels } => {
                write!(f, "{data} data records do not match {labels} labels")
            }
            Self::ProjectName { project_name } => write!(f, "unknown project name: {project_name}"),
            Self::Unexpected { reason } => write!(f, "unexpected training error: {reason}"),
        }
    }
}

impl std::error::Error for TrainingError {}

impl KnownError for TrainingError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::DataFormat { .. } => ErrorKind::DataFormat,
            _ => ErrorKind::Training,
        }
    }

    fn code(&self) -> u16 {
        match self {
            Self::Unexpected { .. } => 1410,
            Self::Label { .. } => 1411,
            Self::DataShortage { .. } => 1412,
            Self::DataFormat { .. } => 1413,
            Self::ModelTraining { .. } => 1414,
            Self::DataLabelMismatch { .. } => 1415,
            Self::ProjectName { .. } => 1416,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Unexpected { .. } => "Unexpected Error",
            Self::Label { .. } => "Label Error",
            Self::DataShortage { .. } => "Data Shortage Error",
            Self::DataFormat { .. } => "Data Format Error",
            Self::ModelTraining { .. } => "Model Error",
            Self::DataLabelMismatch { .. } => "Data & Label Mismatch Error",
            Self::ProjectName { .. } => "Project Name Error",
        }
    }
}

// ============================================================================
// Predicting Errors
// ============================================================================

/// Known failures while preparing data for, or running, inference.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PredictingError {
    /// Requested label has no model route
    Label {
        /// Requested label
        label: String,
    },
    /// Not enough fresh data yet
    DataShortage {
        /// Seconds of data available
        got_secs: f64,
        /// Seconds of data required
        need_secs: f64,
    },
    /// Fresh data has the wrong shape
    DataFormat {
        /// What is wrong
        reason: String,
    },
    /// The model cannot score this input
    Model {
        /// What failed
        reason: String,
    },
    /// Retry loop ran out of attempts
    ExceedMaximumAttempts {
        /// Attempts made
        attempts: u32,
    },
    /// Number of data records and labels differ
    DataLabelMismatch {
        /// Data record count
        data: usize,
        /// Label count
        labels: usize,
    },
    /// No model is routed for the project
    ProjectName {
        /// Requested project
        project_name: String,
    },
    /// Caller cancelled the request
    Cancelled,
    /// Caller deadline passed before a prediction succeeded
    DeadlineExceeded {
        /// Attempts made before the deadline
        attempts: u32,
    },
    /// Anything outside the list above
    Unexpected {
        /// What happened
        reason: String,
    },
}

impl PredictingError {
    /// Whether the retry loop may try again after this error.
    ///
    /// Only conditions that fresh data can fix are recoverable.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::DataShortage { .. } | Self::DataFormat { .. } | Self::DataLabelMismatch { .. } => true,
            Self::Label { .. }
            | Self::Model { .. }
            | Self::ExceedMaximumAttempts { .. }
            | Self::ProjectName { .. }
            | Self::Cancelled
            | Self::DeadlineExceeded { .. }
            | Self::Unexpected { .. } => false,
        }
    }
}

impl fmt::Display for PredictingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Label { label } => write!(f, "no model is routed for label {label:?}"),
            Self::DataShortage { got_secs, need_secs } => {
                write!(f, "not enough data to predict: {got_secs:.1}s available, {need_secs:.1}s required")
            }
            Self::DataFormat { reason } => write!(f, "prediction data format error: {reason}"),
            Self::Model { reason } => write!(f, "model cannot predict: {reason}"),
            Self::ExceedMaximumAttempts { attempts } => {
                write!(f, "prediction did not succeed within {attempts} attempts")
            }
            Self::DataLabelMismatch { data, labels } => {
                write!(f, "{data} data records do not match {labels} labels")
            }
            Self::ProjectName { project_name } => write!(f, "unknown project name: {project_name}"),
            Self::Cancelled => f.write_str("prediction cancelled"),
            Self::DeadlineExceeded { attempts } => {
                write!(f, "prediction deadline exceeded after {attempts} attempts")
            }
            Self::Unexpected { reason } => write!(f, "unexpected prediction error: {reason}"),
        }
    }
}

impl std::error::Error for PredictingError {}

impl KnownError for PredictingError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::DataFormat { .. } => ErrorKind::DataFormat,
            _ => ErrorKind::Inference,
        }
    }

    fn code(&self) -> u16 {
        match self {
            Self::Unexpected { .. } => 1510,
            Self::Label { .. } => 1511,
            Self::DataShortage { .. } => 1512,
            Self::DataFormat { .. } => 1513,
            Self::Model { .. } => 1514,
            Self::ExceedMaximumAttempts { .. } => 1515,
            Self::DataLabelMismatch { .. } => 1516,
            Self::ProjectName { .. } => 1517,
            Self::Cancelled => 1518,
            Self::DeadlineExceeded { .. } => 1519,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Unexpected { .. } => "Unexpected Error",
            Self::Label { .. } => "Label Error",
            Self::DataShortage { .. } => "Data Shortage Error",
            Self::DataFormat { .. } => "Data Format Error",
            Self::Model { .. } => "Model Error",
            Self::ExceedMaximumAttempts { .. } => "Exceed Maximum Predicting Times Error",
            Self::DataLabelMismatch { .. } => "Data & Label Mismatch Error",
            Self::ProjectName { .. } => "Project Name Error",
            Self::Cancelled => "Cancelled",
            Self::DeadlineExceeded { .. } => "Deadline Exceeded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_fields() {
        assert_eq!(ErrorKind::Request.code(), 400);
        assert_eq!(ErrorKind::DataFormat.code(), 422);
        assert_eq!(ErrorKind::ModelLoading.name(), "Internal Server Error");
    }

    #[test]
    fn test_only_data_conditions_are_recoverable() {
        assert!(PredictingError::DataShortage { got_secs: 1.0, need_secs: 5.0 }.is_recoverable());
        assert!(PredictingError::DataFormat { reason: "rows".into() }.is_recoverable());
        assert!(PredictingError::DataLabelMismatch { data: 1, labels: 2 }.is_recoverable());

        assert!(!PredictingError::Model { reason: "nan".into() }.is_recoverable());
        assert!(!PredictingError::Cancelled.is_recoverable());
        assert!(!PredictingError::ExceedMaximumAttempts { attempts: 10 }.is_recoverable());
    }

    #[test]
    fn test_detailed_codes() {
        let err = TrainingError::DataShortage { got_secs: 10.0, need_secs: 30.0 };
        assert_eq!(err.code(), 1412);
        assert_eq!(err.kind(), ErrorKind::Training);

        let err = PredictingError::DataFormat { reason: "x".into() };
        assert_eq!(err.code(), 1513);
        assert_eq!(err.kind(), ErrorKind::DataFormat);
    }
}
