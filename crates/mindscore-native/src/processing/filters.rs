//! Digital filters for EEG processing
//!
//! Butterworth band-pass filters in second-order-section form, applied
//! forward and backward for zero phase distortion.

use mindscore_core::types::EegBand;
use rustfft::num_complex::Complex;
use thiserror::Error;

/// Imaginary parts below this are treated as real poles
const REAL_POLE_TOLERANCE: f64 = 1e-10;

/// Errors designing or applying a filter
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FilterError {
    /// Cutoffs must satisfy `0 < low < high < sample_rate / 2`
    #[error("invalid band {low_hz}-{high_hz} Hz at {sample_rate} Hz")]
    InvalidBand {
        /// Lower cutoff
        low_hz: f64,
        /// Upper cutoff
        high_hz: f64,
        /// Sample rate
        sample_rate: f64,
    },

    /// Filter order must be at least one
    #[error("filter order must be positive")]
    ZeroOrder,

    /// Signal is too short for edge padding
    #[error("signal has {got} samples, zero-phase filtering needs more than {need}")]
    SignalTooShort {
        /// Samples provided
        got: usize,
        /// Padding length that must be exceeded
        need: usize,
    },
}

/// Butterworth IIR filter coefficients (second-order section)
#[derive(Clone, Debug, PartialEq)]
pub struct BiquadCoeffs {
    /// Numerator coefficients [b0, b1, b2]
    pub b: [f64; 3],
    /// Denominator coefficients [a0=1, a1, a2]
    pub a: [f64; 3],
}

impl BiquadCoeffs {
    /// Gain at 0 Hz
    #[must_use]
    pub fn dc_gain(&self) -> f64 {
        self.b.iter().sum::<f64>() / self.a.iter().sum::<f64>()
    }

    /// Delay-line state after a unit step has settled
    fn step_state(&self) -> [f64; 2] {
        let y = self.dc_gain();
        [y - self.b[0], self.b[2] - self.a[2] * y]
    }
}

/// Second-order biquad filter section (transposed direct form II)
#[derive(Clone, Debug)]
struct Biquad {
    coeffs: BiquadCoeffs,
    /// State: [z1, z2]
    state: [f64; 2],
}

impl Biquad {
    /// Process a single sample
    fn filter(&mut self, input: f64) -> f64 {
        let [b0, b1, b2] = self.coeffs.b;
        let [_, a1, a2] = self.coeffs.a;

        let output = b0 * input + self.state[0];
        self.state[0] = b1 * input - a1 * output + self.state[1];
        self.state[1] = b2 * input - a2 * output;

        output
    }
}

/// Cascade of second-order sections.
#[derive(Clone, Debug, PartialEq)]
pub struct SosFilter {
    sections: Vec<BiquadCoeffs>,
}

impl SosFilter {
    /// Design a digital Butterworth band-pass filter.
    ///
    /// `order` is the prototype order; the band-pass cascade has `order`
    /// sections. Cutoffs are prewarped and mapped through the bilinear
    /// transform, so the response is -3 dB at both edges.
    pub fn butterworth_bandpass(
        order: usize,
        sample_rate: f64,
        low_hz: f64,
        high_hz: f64,
    ) -> Result<Self, FilterError> {
        if order == 0 {
            return Err(FilterError::ZeroOrder);
        }
        let nyquist = sample_rate / 2.0;
        if !(low_hz > 0.0 && low_hz < high_hz && high_hz < nyquist) {
            return Err(FilterError::InvalidBand { low_hz, high_hz, sample_rate });
        }

        let fs2 = 2.0 * sample_rate;
        let warp = |f: f64| fs2 * (std::f64::consts::PI * f / sample_rate).tan();
        let (wl, wh) = (warp(low_hz), warp(high_hz));
        let bw = wh - wl;
        let w0_sq = wl * wh;

        // Analog prototype poles, shifted onto the band
        let n = order as f64;
        let mut analog = Vec::with_capacity(2 * order);
        for k in 0..order {
            let m = (2 * k) as f64 - (n - 1.0);
            let proto = -Complex::from_polar(1.0, std::f64::consts::PI * m / (2.0 * n));
            let lp = proto * (bw / 2.0);
            let root = (lp * lp - w0_sq).sqrt();
            analog.push(lp + root);
            analog.push(lp - root);
        }

        let fs2c = Complex::new(fs2, 0.0);
        let denom = analog.iter().fold(Complex::new(1.0, 0.0), |acc, &p| acc * (fs2c - p));
        let gain = ((bw * fs2).powi(order as i32) / denom).re;

        let digital: Vec<Complex<f64>> = analog.iter().map(|&p| (fs2c + p) / (fs2c - p)).collect();

        // Band-pass zeros sit at z = +1 and z = -1, one of each per section
        let zero_pair = [1.0, 0.0, -1.0];
        let mut sections: Vec<BiquadCoeffs> = digital
            .iter()
            .filter(|p| p.im > REAL_POLE_TOLERANCE)
            .map(|p| BiquadCoeffs {
                b: zero_pair,
                a: [1.0, -2.0 * p.re, p.norm_sqr()],
            })
            .collect();

        let mut real: Vec<f64> = digital
            .iter()
            .filter(|p| p.im.abs() <= REAL_POLE_TOLERANCE)
            .map(|p| p.re)
            .collect();
        real.sort_by(f64::total_cmp);
        for pair in real.chunks(2) {
            let a = match *pair {
                [p1, p2] => [1.0, -(p1 + p2), p1 * p2],
                [p1] => [1.0, -p1, 0.0],
                _ => continue,
            };
            sections.push(BiquadCoeffs { b: zero_pair, a });
        }

        if let Some(first) = sections.first_mut() {
            for b in &mut first.b {
                *b *= gain;
            }
        }

        Ok(Self { sections })
    }

    /// Design the order-3 band-pass for a standard EEG band
    pub fn for_band(sample_rate: f64, band: EegBand) -> Result<Self, FilterError> {
        let (low, high) = band.range_hz();
        Self::butterworth_bandpass(3, sample_rate, low, high)
    }

    /// Section coefficients
    #[must_use]
    pub fn sections(&self) -> &[BiquadCoeffs] {
        &self.sections
    }

    /// Samples of odd extension added at each edge by [`Self::filtfilt`]
    #[must_use]
    pub fn pad_len(&self) -> usize {
        let trivial = self
            .sections
            .iter()
            .filter(|s| s.b[2] == 0.0)
            .count()
            .min(self.sections.iter().filter(|s| s.a[2] == 0.0).count());
        3 * (2 * self.sections.len() + 1 - trivial)
    }

    /// Per-section initial state for a steady input of `x0`
    fn initial_state(&self, x0: f64) -> Vec<[f64; 2]> {
        let mut scale = x0;
        self.sections
            .iter()
            .map(|s| {
                let [z0, z1] = s.step_state();
                let state = [z0 * scale, z1 * scale];
                scale *= s.dc_gain();
                state
            })
            .collect()
    }

    /// Run the cascade once over `signal`, in place.
    fn run(&self, signal: &mut [f64]) {
        let Some(&x0) = signal.first() else { return };

        for (coeffs, state) in self.sections.iter().zip(self.initial_state(x0)) {
            let mut biquad = Biquad { coeffs: coeffs.clone(), state };
            for x in signal.iter_mut() {
                *x = biquad.filter(*x);
            }
        }
    }

    /// Zero-phase forward-backward filtering.
    ///
    /// The signal is extended at both ends by odd reflection of
    /// [`Self::pad_len`] samples, and each pass starts from the steady state
    /// of its first sample.
    pub fn filtfilt(&self, signal: &[f64]) -> Result<Vec<f64>, FilterError> {
        let pad = self.pad_len();
        let n = signal.len();
        if n <= pad {
            return Err(FilterError::SignalTooShort { got: n, need: pad });
        }

        let first = signal[0];
        let last = signal[n - 1];
        let mut ext = Vec::with_capacity(n + 2 * pad);
        ext.extend((1..=pad).rev().map(|i| 2.0 * first - signal[i]));
        ext.extend_from_slice(signal);
        ext.extend((1..=pad).map(|i| 2.0 * last - signal[n - 1 - i]));

        self.run(&mut ext);
        ext.reverse();
        self.run(&mut ext);
        ext.reverse();

        Ok(ext[pad..pad + n].to_vec())
    }

    /// Magnitude response at `freq_hz`
    #[must_use]
    pub fn magnitude(&self, freq_hz: f64, sample_rate: f64) -> f64 {
        let z_inv = Complex::from_polar(1.0, -2.0 * std::f64::consts::PI * freq_hz / sample_rate);
        let z_inv2 = z_inv * z_inv;
        self.sections
            .iter()
            .map(|s| {
                let num = z_inv2 * s.b[2] + z_inv * s.b[1] + s.b[0];
                let den = z_inv2 * s.a[2] + z_inv * s.a[1] + s.a[0];
                (num / den).norm()
            })
            .product()
    }
}
