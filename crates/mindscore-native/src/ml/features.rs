//! Feature extraction for the ratio models
//!
//! Each scored channel is reduced to a single band-power ratio: theta/beta
//! for attention, alpha/theta for memory.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use mindscore_core::types::{EegBand, EegChannel, EegSegment};

use crate::processing::fft::{BandPowers, SpectralAnalyzer};
use crate::processing::filters::{FilterError, SosFilter};

/// Pass band applied to every channel before band filtering
pub const PREPROCESS_BAND_HZ: (f64, f64) = (1.0, 30.0);

/// Butterworth prototype order used throughout
pub const FILTER_ORDER: usize = 3;

/// Which band-power ratio a model scores.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioKind {
    /// Theta / beta, rising when attention drops
    ThetaBeta,
    /// Alpha / theta, rising when memory load drops
    AlphaTheta,
}

impl RatioKind {
    /// (numerator, denominator) bands
    #[must_use]
    pub const fn bands(self) -> (EegBand, EegBand) {
        match self {
            Self::ThetaBeta => (EegBand::Theta, EegBand::Beta),
            Self::AlphaTheta => (EegBand::Alpha, EegBand::Theta),
        }
    }

    /// Ratio from a set of band powers, zero when the denominator is zero
    #[must_use]
    pub fn ratio(self, powers: &BandPowers) -> f64 {
        match self {
            Self::ThetaBeta => powers.theta_beta_ratio(),
            Self::AlphaTheta => powers.alpha_theta_ratio(),
        }
    }
}

/// Errors extracting ratio features
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FeatureError {
    /// Segment lacks a scored channel row
    #[error("segment has {rows} rows, channel {channel} needs row {index}")]
    MissingChannel {
        /// Channel label
        channel: &'static str,
        /// Row the channel lives in
        index: usize,
        /// Rows present
        rows: usize,
    },

    /// Filtering failed
    #[error(transparent)]
    Filter(#[from] FilterError),
}

/// Ratio feature extractor for one sample rate
#[derive(Clone, Debug)]
pub struct RatioExtractor {
    kind: RatioKind,
    sample_rate: f64,
    preprocess: SosFilter,
    numerator: (EegBand, SosFilter),
    denominator: (EegBand, SosFilter),
}

impl RatioExtractor {
    /// Design the filters for `kind` at `sample_rate`
    pub fn new(kind: RatioKind, sample_rate: f64) -> Result<Self, FilterError> {
        let (num, den) = kind.bands();
        let (low, high) = PREPROCESS_BAND_HZ;

        Ok(Self {
            kind,
            sample_rate,
            preprocess: SosFilter::butterworth_bandpass(FILTER_ORDER, sample_rate, low, high)?,
            numerator: (num, SosFilter::for_band(sample_rate, num)?),
            denominator: (den, SosFilter::for_band(sample_rate, den)?),
        })
    }

    /// Ratio this extractor computes
    #[must_use]
    pub fn kind(&self) -> RatioKind {
        self.kind
    }

    /// Sample rate the filters were designed for
    #[must_use]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Fewest samples per channel the filters accept
    #[must_use]
    pub fn min_samples(&self) -> usize {
        self.preprocess.pad_len() + 1
    }

    /// Powers of the two ratio bands in one channel
    pub fn band_powers(&self, samples: &[f64]) -> Result<BandPowers, FilterError> {
        let clean = self.preprocess.filtfilt(samples)?;
        let mut analyzer = SpectralAnalyzer::new(self.sample_rate);
        let mut powers = BandPowers::default();

        for (band, filter) in [&self.numerator, &self.denominator] {
            let filtered = filter.filtfilt(&clean)?;
            let power = analyzer.welch(&filtered).eeg_band_power(*band);
            match band {
                EegBand::Theta => powers.theta = power,
                EegBand::Alpha => powers.alpha = power,
                EegBand::Beta => powers.beta = power,
                EegBand::Delta | EegBand::Gamma => {}
            }
        }

        Ok(powers)
    }

    /// Ratio feature of one channel
    pub fn ratio(&self, samples: &[f64]) -> Result<f64, FilterError> {
        Ok(self.kind.ratio(&self.band_powers(samples)?))
    }

    /// Ratio features of FP1 and FP2, in [`EegChannel::ALL`] order
    pub fn channel_ratios(&self, segment: &EegSegment) -> Result<[f64; 2], FeatureError> {
        let mut ratios = [0.0; 2];
        for (slot, channel) in ratios.iter_mut().zip(EegChannel::ALL) {
            let samples = segment.channel(channel).ok_or(FeatureError::MissingChannel {
                channel: channel.name(),
                index: channel.index(),
                rows: segment.channel_count(),
            })?;
            *slot = self.ratio(samples)?;
        }
        Ok(ratios)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / 250.0).sin())
            .collect()
    }

    #[test]
    fn test_theta_tone_has_high_theta_beta_ratio() {
        let extractor = RatioExtractor::new(RatioKind::ThetaBeta, 250.0).unwrap();
        let theta_heavy = extractor.ratio(&tone(6.0, 1250)).unwrap();
        let beta_heavy = extractor.ratio(&tone(20.0, 1250)).unwrap();

        assert!(theta_heavy > 10.0, "theta-heavy ratio {theta_heavy}");
        assert!(beta_heavy < 0.1, "beta-heavy ratio {beta_heavy}");
    }

    #[test]
    fn test_alpha_theta_uses_alpha_band() {
        let extractor = RatioExtractor::new(RatioKind::AlphaTheta, 250.0).unwrap();
        let powers = extractor.band_powers(&tone(10.0, 1250)).unwrap();

        assert!(powers.alpha > powers.theta);
        assert_eq!(powers.beta, 0.0);
    }

    #[test]
    fn test_short_channel_is_rejected() {
        let extractor = RatioExtractor::new(RatioKind::ThetaBeta, 250.0).unwrap();
        assert!(matches!(
            extractor.ratio(&[1.0; 10]),
            Err(FilterError::SignalTooShort { got: 10, .. })
        ));
    }

    #[test]
    fn test_missing_channel() {
        let extractor = RatioExtractor::new(RatioKind::ThetaBeta, 250.0).unwrap();
        let segment = EegSegment::new(chrono::Utc::now(), 250.0, vec![vec![0.0; 1250]; 2]).unwrap();

        assert!(matches!(
            extractor.channel_ratios(&segment),
            Err(FeatureError::MissingChannel { channel: "FP2", index: 2, rows: 2 })
        ));
    }
}
