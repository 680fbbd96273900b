//! mindscore Core - shared types and utilities
//!
//! This crate provides the foundational types, math utilities, and wire
//! formats for the mindscore EEG scoring backend.
//!
//! # Modules
//!
//! - [`types`]: EEG bands, channels, segments and model identity
//! - [`error`]: Error kinds and the known training/prediction failures
//! - [`math`]: Statistics, integration and the logistic function
//! - [`protocol`]: Model reference strings and the response envelope
//!
//! # Example
//!
//! ```rust
//! use mindscore_core::types::{EegChannel, EegSegment};
//!
//! let rows = vec![vec![0.0; 1250]; 3];
//! let segment = EegSegment::new(chrono::Utc::now(), 250.0, rows).unwrap();
//!
//! assert_eq!(segment.channel(EegChannel::Fp1).map(<[f64]>::len), Some(1250));
//! assert!((segment.duration_secs() - 5.0).abs() < 1e-9);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod error;
pub mod math;
pub mod protocol;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{ErrorKind, KnownError, PredictingError, RequestError, SegmentError, TrainingError};
pub use math::{sigmoid, ChannelStats};
pub use protocol::{ModelReference, ReferenceError, Response};
pub use types::{EegBand, EegChannel, EegSegment, ModelInfo, DEFAULT_SAMPLE_RATE_HZ};
