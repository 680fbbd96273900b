//! Attention and memory scoring from band-power ratios
//!
//! A [`RatioScoreModel`] only exists in the trained state: it is built by
//! [`RatioScoreModel::train`] from labelled windows and then scores fresh
//! windows on a 0-100 scale.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use mindscore_core::error::{PredictingError, TrainingError};
use mindscore_core::math::constants::{MAX_SCORE, NORMALIZED_HALF_RANGE};
use mindscore_core::math::{sigmoid, ChannelStats};
use mindscore_core::types::{EegChannel, EegSegment};

use super::features::{FeatureError, RatioExtractor, RatioKind};
use crate::processing::filters::FilterError;

/// Per-channel ratio statistics of a trained model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RatioScoreModel {
    ratio: RatioKind,
    sample_rate: f64,
    fp1: ChannelStats,
    fp2: ChannelStats,
}

/// Intermediate values of one scoring call
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RatioScore {
    /// Raw ratio of FP1 and FP2
    pub ratios: [f64; 2],
    /// Sigmoid score in (0, 1) of FP1 and FP2
    pub channel_scores: [f64; 2],
    /// Channel average on the 0-100 scale
    pub score: u8,
}

impl RatioScore {
    /// Mean of the two channel scores
    #[must_use]
    pub fn probability(&self) -> f64 {
        (self.channel_scores[0] + self.channel_scores[1]) / 2.0
    }
}

impl RatioScoreModel {
    /// Fit the per-channel statistics.
    ///
    /// Windows of both classes are pooled; labels only decide which windows
    /// are collected, not how they are weighted.
    pub fn train(
        ratio: RatioKind,
        sample_rate: f64,
        non_target: &[EegSegment],
        target: &[EegSegment],
    ) -> Result<Self, TrainingError> {
        let extractor = RatioExtractor::new(ratio, sample_rate).map_err(|e| TrainingError::ModelTraining {
            reason: e.to_string(),
        })?;

        let mut fp1 = Vec::with_capacity(non_target.len() + target.len());
        let mut fp2 = Vec::with_capacity(fp1.capacity());

        for window in target.iter().chain(non_target) {
            if (window.sample_rate - sample_rate).abs() > f64::EPSILON {
                return Err(TrainingError::DataFormat {
                    reason: format!("window sampled at {} Hz, expected {sample_rate} Hz", window.sample_rate),
                });
            }

            let [r1, r2] = extractor.channel_ratios(window).map_err(|e| match e {
                FeatureError::MissingChannel { .. } => TrainingError::DataFormat { reason: e.to_string() },
                FeatureError::Filter(FilterError::SignalTooShort { got, .. }) => TrainingError::DataShortage {
                    got_secs: got as f64 / sample_rate,
                    need_secs: window_need_secs(&extractor),
                },
                FeatureError::Filter(_) => TrainingError::ModelTraining { reason: e.to_string() },
            })?;
            fp1.push(r1);
            fp2.push(r2);
        }

        let stats = |values: &[f64], channel: EegChannel| {
            ChannelStats::from_values(values).ok_or_else(|| TrainingError::ModelTraining {
                reason: if values.is_empty() {
                    "no training windows".to_string()
                } else {
                    format!("{} ratios are not finite", channel.name())
                },
            })
        };

        let model = Self {
            ratio,
            sample_rate,
            fp1: stats(&fp1, EegChannel::Fp1)?,
            fp2: stats(&fp2, EegChannel::Fp2)?,
        };

        debug!(
            ratio = ?ratio,
            windows = fp1.len(),
            fp1_mean = model.fp1.mean,
            fp2_mean = model.fp2.mean,
            "Ratio model trained"
        );

        Ok(model)
    }

    /// Ratio this model scores
    #[must_use]
    pub fn ratio(&self) -> RatioKind {
        self.ratio
    }

    /// Sample rate the model was trained at
    #[must_use]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Training statistics of a channel
    #[must_use]
    pub fn stats(&self, channel: EegChannel) -> &ChannelStats {
        match channel {
            EegChannel::Fp1 => &self.fp1,
            EegChannel::Fp2 => &self.fp2,
        }
    }

    /// Score a fresh window on the 0-100 scale
    pub fn process_online(&self, segment: &EegSegment) -> Result<u8, PredictingError> {
        self.process_online_with(segment, &mut rand::thread_rng())
            .map(|s| s.score)
    }

    /// Score a fresh window, drawing degenerate-span fallbacks from `rng`
    pub fn process_online_with<R: Rng + ?Sized>(
        &self,
        segment: &EegSegment,
        rng: &mut R,
    ) -> Result<RatioScore, PredictingError> {
        if (segment.sample_rate - self.sample_rate).abs() > f64::EPSILON {
            return Err(PredictingError::DataFormat {
                reason: format!(
                    "window sampled at {} Hz, model trained at {} Hz",
                    segment.sample_rate, self.sample_rate
                ),
            });
        }

        let extractor = RatioExtractor::new(self.ratio, self.sample_rate)
            .map_err(|e| PredictingError::Model { reason: e.to_string() })?;

        let ratios = extractor.channel_ratios(segment).map_err(|e| match e {
            FeatureError::MissingChannel { .. } => PredictingError::DataFormat { reason: e.to_string() },
            FeatureError::Filter(FilterError::SignalTooShort { got, .. }) => PredictingError::DataShortage {
                got_secs: got as f64 / self.sample_rate,
                need_secs: window_need_secs(&extractor),
            },
            FeatureError::Filter(_) => PredictingError::Model { reason: e.to_string() },
        })?;

        let channel_scores = [
            normalize_and_map(ratios[0], &self.fp1, rng),
            normalize_and_map(ratios[1], &self.fp2, rng),
        ];
        let result = RatioScore {
            ratios,
            channel_scores,
            score: to_score((channel_scores[0] + channel_scores[1]) / 2.0),
        };

        debug!(
            fp1_ratio = ratios[0],
            fp2_ratio = ratios[1],
            score = result.score,
            "Window scored"
        );

        Ok(result)
    }
}

/// Map a raw ratio to a (0, 1) score against training statistics.
///
/// The value is centered on the training mean and the training span is
/// rescaled onto the width of [-2, 2], so the mean maps to 0.5. The sign is
/// flipped so larger ratios give lower scores. A degenerate span
/// (`min == max`) falls back to a uniform draw from [-2, 2].
pub fn normalize_and_map<R: Rng + ?Sized>(value: f64, stats: &ChannelStats, rng: &mut R) -> f64 {
    let centered = value - stats.mean;

    let normalized = if stats.is_degenerate() {
        rng.gen_range(-NORMALIZED_HALF_RANGE..=NORMALIZED_HALF_RANGE)
    } else {
        centered / stats.span() * (2.0 * NORMALIZED_HALF_RANGE)
    };

    sigmoid(-normalized)
}

/// `floor(100 * p)` clamped to the score range
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_score(probability: f64) -> u8 {
    let max = f64::from(MAX_SCORE);
    if probability.is_nan() {
        return 0;
    }
    (max * probability).floor().clamp(0.0, max) as u8
}

/// Shortest window the filters accept, in seconds
fn window_need_secs(extractor: &RatioExtractor) -> f64 {
    extractor.min_samples() as f64 / extractor.sample_rate()
}
