//! Math utilities for EEG scoring
//!
//! This module provides:
//! - Summary statistics over feature values ([`ChannelStats`])
//! - Numerical integration ([`trapezoid`])
//! - The logistic function used to map normalized features to scores

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Scoring constants
pub mod constants {
    /// Half-width of the interval a training span is rescaled onto
    pub const NORMALIZED_HALF_RANGE: f64 = 2.0;

    /// Largest score returned by the ratio models
    pub const MAX_SCORE: u8 = 100;
}

// ============================================================================
// Statistics
// ============================================================================

/// Mean, minimum and maximum of a feature collected during training.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    /// Arithmetic mean
    pub mean: f64,
    /// Smallest value
    pub min: f64,
    /// Largest value
    pub max: f64,
}

impl ChannelStats {
    /// Summarize a set of values.
    ///
    /// Returns `None` for an empty slice or when any value is not finite.
    #[must_use]
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() || values.iter().any(|v| !v.is_finite()) {
            return None;
        }

        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for &v in values {
            min = min.min(v);
            max = max.max(v);
            sum += v;
        }

        // Summation error can push the mean a hair outside [min, max].
        let mean = (sum / values.len() as f64).clamp(min, max);

        Some(Self { mean, min, max })
    }

    /// Width of the training span
    #[must_use]
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// True when every training value was identical
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.span() == 0.0
    }
}

// ============================================================================
// Numerical Helpers
// ============================================================================

/// Logistic sigmoid `1 / (1 + e^-x)`.
#[inline]
#[must_use]
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Integrate samples `y` over abscissae `x` with the trapezoidal rule.
///
/// Fewer than two points integrate to zero. Extra trailing elements of the
/// longer slice are ignored.
#[must_use]
pub fn trapezoid(y: &[f64], x: &[f64]) -> f64 {
    let n = y.len().min(x.len());
    if n < 2 {
        return 0.0;
    }

    (1..n)
        .map(|i| (x[i] - x[i - 1]) * (y[i] + y[i - 1]) * 0.5)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_bounds() {
        let stats = ChannelStats::from_values(&[3.0, 1.0, 2.0, 6.0]).unwrap();
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 6.0);
        assert!((stats.mean - 3.0).abs() < 1e-12);
        assert!((stats.span() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_stats_rejects_empty_and_nan() {
        assert!(ChannelStats::from_values(&[]).is_none());
        assert!(ChannelStats::from_values(&[1.0, f64::NAN]).is_none());
    }

    #[test]
    fn test_degenerate_stats() {
        let stats = ChannelStats::from_values(&[0.7, 0.7, 0.7]).unwrap();
        assert!(stats.is_degenerate());
        assert_eq!(stats.mean, 0.7);
    }

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!(sigmoid(40.0) > 0.999_999);
        assert!(sigmoid(-40.0) < 1e-6);
    }

    #[test]
    fn test_trapezoid_linear() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [0.0, 1.0, 2.0, 3.0];
        assert!((trapezoid(&y, &x) - 4.5).abs() < 1e-12);
        assert_eq!(trapezoid(&[1.0], &[0.0]), 0.0);
    }
}
