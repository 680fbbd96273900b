//! Trained models as stored in artifacts
//!
//! [`TrainedModel`] is the serialized form written by the checksum system;
//! [`ModelKind`] names the variants for routing and file names.

use core::fmt;
use core::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use mindscore_core::error::{PredictingError, TrainingError};
use mindscore_core::types::EegSegment;

use super::baseline::BaselineModel;
use super::dataset::TrainingSet;
use super::features::RatioKind;
use super::ratio_model::RatioScoreModel;

/// Model families that can be routed to a project label.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Theta/beta attention scorer
    Attention,
    /// Alpha/theta memory scorer
    Memory,
    /// Constant placeholder
    Baseline,
}

impl ModelKind {
    /// Every kind
    pub const ALL: [Self; 3] = [Self::Attention, Self::Memory, Self::Baseline];

    /// Name used in file names and configuration
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Attention => "attention",
            Self::Memory => "memory",
            Self::Baseline => "baseline",
        }
    }

    /// Ratio scored by this kind, if any
    #[must_use]
    pub const fn ratio(self) -> Option<RatioKind> {
        match self {
            Self::Attention => Some(RatioKind::ThetaBeta),
            Self::Memory => Some(RatioKind::AlphaTheta),
            Self::Baseline => None,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unrecognized model kind name
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown model kind: {0}")]
pub struct UnknownModelKind(pub String);

impl FromStr for ModelKind {
    type Err = UnknownModelKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownModelKind(s.to_string()))
    }
}

/// Result of scoring one window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Score; 0-100 for the ratio models
    #[serde(rename = "pred_score")]
    pub score: f64,
    /// Class label, when the model assigns one
    #[serde(rename = "pred_label")]
    pub label: Option<i32>,
    /// Confidence in (0, 1)
    #[serde(rename = "pred_prob")]
    pub probability: f64,
    /// Model that produced the prediction
    pub model_kind: ModelKind,
}

/// A fitted model of any kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrainedModel {
    /// Attention scorer
    Attention(RatioScoreModel),
    /// Memory scorer
    Memory(RatioScoreModel),
    /// Constant placeholder
    Baseline(BaselineModel),
}

impl TrainedModel {
    /// Fit a model of `kind` on a labelled set
    pub fn train(kind: ModelKind, set: &TrainingSet) -> Result<Self, TrainingError> {
        let fit = |ratio| RatioScoreModel::train(ratio, set.sample_rate, &set.non_target, &set.target);

        match kind {
            ModelKind::Attention => fit(RatioKind::ThetaBeta).map(Self::Attention),
            ModelKind::Memory => fit(RatioKind::AlphaTheta).map(Self::Memory),
            ModelKind::Baseline => Ok(Self::Baseline(BaselineModel::default())),
        }
    }

    /// Kind of this model
    #[must_use]
    pub fn kind(&self) -> ModelKind {
        match self {
            Self::Attention(_) => ModelKind::Attention,
            Self::Memory(_) => ModelKind::Memory,
            Self::Baseline(_) => ModelKind::Baseline,
        }
    }

    /// Score one window
    pub fn predict(&self, segment: &EegSegment) -> Result<Prediction, PredictingError> {
        self.predict_with(segment, &mut rand::thread_rng())
    }

    /// Score one window with an explicit random source
    pub fn predict_with<R: Rng + ?Sized>(
        &self,
        segment: &EegSegment,
        rng: &mut R,
    ) -> Result<Prediction, PredictingError> {
        let model_kind = self.kind();
        match self {
            Self::Attention(model) | Self::Memory(model) => {
                let result = model.process_online_with(segment, rng)?;
                Ok(Prediction {
                    score: f64::from(result.score),
                    label: None,
                    probability: result.probability(),
                    model_kind,
                })
            }
            Self::Baseline(model) => Ok(Prediction {
                score: model.score,
                label: Some(model.label),
                probability: model.probability,
                model_kind,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_round_trip() {
        for kind in ModelKind::ALL {
            assert_eq!(kind.name().parse::<ModelKind>().unwrap(), kind);
        }
        assert_eq!("Attention".parse::<ModelKind>().unwrap(), ModelKind::Attention);
        assert!("sleep".parse::<ModelKind>().is_err());
    }

    #[test]
    fn test_baseline_prediction() {
        let model = TrainedModel::Baseline(BaselineModel::default());
        let segment = EegSegment::new(chrono::Utc::now(), 250.0, vec![vec![0.0; 4]; 3]).unwrap();

        let prediction = model.predict(&segment).unwrap();
        assert_eq!(prediction.label, Some(1));
        assert!((prediction.probability - 0.5).abs() < f64::EPSILON);

        let json = serde_json::to_value(&prediction).unwrap();
        assert_eq!(json["pred_label"], 1);
        assert_eq!(json["model_kind"], "baseline");
    }

    #[test]
    fn test_serialized_form_is_tagged() {
        let model = TrainedModel::Baseline(BaselineModel::default());
        let json = serde_json::to_value(&model).unwrap();
        assert_eq!(json["kind"], "baseline");

        let back: TrainedModel = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), ModelKind::Baseline);
    }
}
