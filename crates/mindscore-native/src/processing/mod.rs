//! Signal processing pipelines
//!
//! This module provides signal processing for EEG scoring:
//! - [`filters`]: Butterworth band-pass design and zero-phase filtering
//! - [`fft`]: Welch spectral estimation and band power

pub mod fft;
pub mod filters;

pub use fft::{BandPowers, Psd, SpectralAnalyzer};
pub use filters::{FilterError, SosFilter};
