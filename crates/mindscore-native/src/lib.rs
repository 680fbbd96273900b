//! mindscore native - EEG scoring, model storage, training and prediction
//!
//! This crate provides the host side of mindscore:
//! - Signal processing (Butterworth band-pass, zero-phase filtering, Welch PSD)
//! - Attention and memory scoring models over band-power ratios
//! - Checksummed model artifacts, an in-memory model cache and a registry
//! - Training pipeline and a bounded, cancellable prediction retry loop
//! - A service facade answering JSON train/predict requests
//!
//! # Modules
//!
//! - [`processing`]: Signal processing pipelines
//! - [`ml`]: Scoring models and training sets
//! - [`store`]: Model artifacts, cache and registry
//! - [`pipeline`]: Training and retry plumbing
//! - [`service`]: Request handling

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod dump;
pub mod error;
pub mod ml;
pub mod pipeline;
pub mod processing;
pub mod selector;
pub mod service;
pub mod source;
pub mod store;

// Re-export key types
pub use config::ServiceConfig;
pub use error::{ServiceError, ServiceResult};
pub use ml::{ModelKind, Prediction, TrainedModel};
pub use pipeline::{CancellationToken, RetryPolicy, TrainOutput};
pub use service::{MindscoreService, PredictRequest};
pub use source::{EegDataSource, EegRecord, FileDataSource};
pub use store::{ChecksumSystem, ModelCache, ModelRegistry, SqliteModelRegistry};
