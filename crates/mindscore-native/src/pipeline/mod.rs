//! Training and prediction plumbing
//!
//! - [`training`]: fit, store and register a model
//! - [`retry`]: bounded, cancellable retry used by prediction

pub mod retry;
pub mod training;

pub use retry::{CancellationToken, Recoverable, RetryError, RetryPolicy};
pub use training::{TrainOutput, TrainingPipeline};
