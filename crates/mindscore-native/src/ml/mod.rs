//! Scoring models
//!
//! - [`features`]: band-power ratio extraction
//! - [`ratio_model`]: attention and memory scorers
//! - [`baseline`]: constant placeholder model
//! - [`model`]: the stored model enum and predictions
//! - [`dataset`]: windows assembled from raw records

pub mod baseline;
pub mod dataset;
pub mod features;
pub mod model;
pub mod ratio_model;

pub use baseline::BaselineModel;
pub use dataset::{prediction_window, TrainingSet};
pub use features::{RatioExtractor, RatioKind};
pub use model::{ModelKind, Prediction, TrainedModel};
pub use ratio_model::{normalize_and_map, RatioScoreModel};
