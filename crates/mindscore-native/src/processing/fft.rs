//! FFT-based spectral analysis
//!
//! Welch power spectral density estimation and band power integration.

use rustfft::{num_complex::Complex, FftPlanner};

use mindscore_core::math::trapezoid;
use mindscore_core::types::EegBand;

/// Longest Welch segment in samples
pub const MAX_SEGMENT_LEN: usize = 256;

/// One-sided power spectral density
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Psd {
    /// Bin frequencies in Hz
    pub freqs: Vec<f64>,
    /// Power density per bin (units² / Hz)
    pub power: Vec<f64>,
}

impl Psd {
    /// Integrated power between `low_hz` and `high_hz`, inclusive.
    ///
    /// Uses the trapezoidal rule over the bins inside the range; a range
    /// holding fewer than two bins integrates to zero.
    #[must_use]
    pub fn band_power(&self, low_hz: f64, high_hz: f64) -> f64 {
        let (freqs, power): (Vec<f64>, Vec<f64>) = self
            .freqs
            .iter()
            .zip(&self.power)
            .filter(|(&f, _)| f >= low_hz && f <= high_hz)
            .map(|(&f, &p)| (f, p))
            .unzip();

        trapezoid(&power, &freqs)
    }

    /// Integrated power of a standard EEG band
    #[must_use]
    pub fn eeg_band_power(&self, band: EegBand) -> f64 {
        let (low, high) = band.range_hz();
        self.band_power(low, high)
    }
}

/// Welch spectral estimator
pub struct SpectralAnalyzer {
    sample_rate: f64,
    planner: FftPlanner<f64>,
}

impl SpectralAnalyzer {
    /// Create a new spectral analyzer
    #[must_use]
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            planner: FftPlanner::new(),
        }
    }

    /// Sample rate in Hz
    #[must_use]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Estimate the PSD of `samples` with Welch's method.
    ///
    /// Segments of `min(256, n)` samples overlap by half, are mean-detrended
    /// and weighted by a periodic Hann window. Segment periodograms are
    /// density-scaled, folded to one side and averaged.
    pub fn welch(&mut self, samples: &[f64]) -> Psd {
        let n = samples.len();
        if n == 0 {
            return Psd::default();
        }

        let seg_len = n.min(MAX_SEGMENT_LEN);
        let overlap = seg_len / 2;
        let step = seg_len - overlap;
        let segments = (n - overlap) / step;

        let window = periodic_hann(seg_len);
        let scale = 1.0 / (self.sample_rate * window.iter().map(|w| w * w).sum::<f64>());

        let fft = self.planner.plan_fft_forward(seg_len);
        let mut buffer = vec![Complex::new(0.0, 0.0); seg_len];
        let mut scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        let n_freqs = seg_len / 2 + 1;
        let mut power = vec![0.0; n_freqs];

        for s in 0..segments {
            let segment = &samples[s * step..s * step + seg_len];
            let mean = segment.iter().sum::<f64>() / seg_len as f64;

            for ((slot, &x), &w) in buffer.iter_mut().zip(segment).zip(&window) {
                *slot = Complex::new((x - mean) * w, 0.0);
            }
            fft.process_with_scratch(&mut buffer, &mut scratch);

            for (acc, c) in power.iter_mut().zip(&buffer[..n_freqs]) {
                *acc += c.norm_sqr() * scale;
            }
        }

        // Fold negative frequencies; DC and (for even lengths) Nyquist are unique
        let fold_end = if seg_len % 2 == 0 { n_freqs - 1 } else { n_freqs };
        for p in power.iter_mut().take(fold_end).skip(1) {
            *p *= 2.0;
        }

        let count = segments.max(1) as f64;
        for p in &mut power {
            *p /= count;
        }

        let resolution = self.sample_rate / seg_len as f64;
        let freqs = (0..n_freqs).map(|k| k as f64 * resolution).collect();

        Psd { freqs, power }
    }
}

/// EEG band powers container
#[derive(Clone, Copy, Debug, Default)]
pub struct BandPowers {
    /// Theta band power (4-8 Hz)
    pub theta: f64,
    /// Alpha band power (8-13 Hz)
    pub alpha: f64,
    /// Beta band power (13-30 Hz)
    pub beta: f64,
}

impl BandPowers {
    /// Theta/beta ratio (attention metric)
    #[must_use]
    pub fn theta_beta_ratio(&self) -> f64 {
        if self.beta > 0.0 {
            self.theta / self.beta
        } else {
            0.0
        }
    }

    /// Alpha/theta ratio (memory metric)
    #[must_use]
    pub fn alpha_theta_ratio(&self) -> f64 {
        if self.theta > 0.0 {
            self.alpha / self.theta
        } else {
            0.0
        }
    }
}

/// Periodic Hann window, as used for spectral estimation
fn periodic_hann(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / size as f64).cos())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, amplitude: f64, len: usize, fs: f64) -> Vec<f64> {
        (0..len)
            .map(|i| amplitude * (2.0 * std::f64::consts::PI * freq * i as f64 / fs).sin())
            .collect()
    }

    #[test]
    fn test_welch_bins() {
        let mut analyzer = SpectralAnalyzer::new(250.0);
        let psd = analyzer.welch(&sine(10.0, 1.0, 1250, 250.0));

        assert_eq!(psd.freqs.len(), 129);
        assert_eq!(psd.power.len(), 129);
        assert!((psd.freqs[1] - 250.0 / 256.0).abs() < 1e-12);
        assert!((psd.freqs[128] - 125.0).abs() < 1e-12);
    }

    #[test]
    fn test_welch_peak_and_total_power() {
        let mut analyzer = SpectralAnalyzer::new(250.0);
        let psd = analyzer.welch(&sine(10.0, 1.0, 1250, 250.0));

        // Alpha should contain most of the power for a 10 Hz signal
        let alpha = psd.eeg_band_power(EegBand::Alpha);
        let total = psd.band_power(0.0, 125.0);
        assert!(alpha > total * 0.9);

        // Density scaling: integral equals the signal variance (A²/2)
        assert!((total - 0.5).abs() < 0.05, "total power {total}");
    }

    #[test]
    fn test_short_signal_uses_single_segment() {
        let mut analyzer = SpectralAnalyzer::new(250.0);
        let psd = analyzer.welch(&sine(20.0, 1.0, 100, 250.0));
        assert_eq!(psd.freqs.len(), 51);
        assert!(psd.power.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_band_power_empty_range() {
        let psd = Psd {
            freqs: vec![0.0, 1.0, 2.0],
            power: vec![1.0, 1.0, 1.0],
        };
        assert_eq!(psd.band_power(5.0, 6.0), 0.0);
        assert!((psd.band_power(0.0, 2.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_ratios_guard_zero_denominator() {
        let powers = BandPowers { theta: 1.0, alpha: 2.0, beta: 0.0 };
        assert_eq!(powers.theta_beta_ratio(), 0.0);
        assert!((powers.alpha_theta_ratio() - 2.0).abs() < 1e-12);
    }
}
