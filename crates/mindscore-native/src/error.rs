//! Errors surfaced by the service facade

use thiserror::Error;

use mindscore_core::error::{ErrorKind, KnownError, PredictingError, RequestError, TrainingError};

use crate::pipeline::retry::{Recoverable, RetryError};
use crate::source::DataFetchError;
use crate::store::error::StoreError;

/// Any failure a train or predict request can end with.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed request
    #[error(transparent)]
    Request(#[from] RequestError),

    /// Known training failure
    #[error(transparent)]
    Training(#[from] TrainingError),

    /// Known prediction failure
    #[error(transparent)]
    Predicting(#[from] PredictingError),

    /// Model storage or loading failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Data source failure
    #[error(transparent)]
    DataFetch(#[from] DataFetchError),
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    fn known(&self) -> &dyn KnownError {
        match self {
            Self::Request(e) => e,
            Self::Training(e) => e,
            Self::Predicting(e) => e,
            Self::Store(e) => e,
            Self::DataFetch(e) => e,
        }
    }
}

impl KnownError for ServiceError {
    fn kind(&self) -> ErrorKind {
        self.known().kind()
    }

    fn code(&self) -> u16 {
        self.known().code()
    }

    fn name(&self) -> &'static str {
        self.known().name()
    }
}

impl Recoverable for ServiceError {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Predicting(e) => e.is_recoverable(),
            Self::Request(_) | Self::Training(_) | Self::Store(_) | Self::DataFetch(_) => false,
        }
    }
}

impl From<RetryError<ServiceError>> for ServiceError {
    fn from(err: RetryError<ServiceError>) -> Self {
        match err {
            RetryError::Exhausted { attempts, .. } => PredictingError::ExceedMaximumAttempts { attempts }.into(),
            RetryError::Aborted(e) => e,
            RetryError::Cancelled => PredictingError::Cancelled.into(),
            RetryError::DeadlineExceeded { attempts } => PredictingError::DeadlineExceeded { attempts }.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_follows_inner_error() {
        let err = ServiceError::from(RequestError::MissingField { field: "org_id" });
        assert_eq!(err.kind(), ErrorKind::Request);
        assert_eq!(err.code(), 400);

        let err = ServiceError::from(StoreError::NotFound { checksum: "abc".into() });
        assert_eq!(err.kind(), ErrorKind::ModelLoading);
        assert_eq!(err.code(), 1314);
        assert_eq!(err.to_string(), "model not found in cache: abc");

        let err = ServiceError::from(PredictingError::Cancelled);
        assert_eq!(err.kind(), ErrorKind::Inference);
        assert_eq!(err.name(), "Cancelled");
    }

    #[test]
    fn test_only_data_conditions_retry() {
        let shortage = ServiceError::from(PredictingError::DataShortage { got_secs: 1.0, need_secs: 5.0 });
        assert!(shortage.is_recoverable());

        let fetch = ServiceError::from(DataFetchError::Unavailable("down".into()));
        assert!(!fetch.is_recoverable());

        let exhausted = ServiceError::from(RetryError::Exhausted { attempts: 10, last: shortage });
        assert_eq!(exhausted.code(), 1515);
    }
}
