//! Core data types for mindscore
//!
//! This module defines the EEG data model shared by every crate:
//! - [`EegBand`]: standard frequency bands used for band-power features
//! - [`EegChannel`]: the frontal channels scored by the ratio models
//! - [`EegSegment`]: a timestamped channels × samples matrix
//! - [`ModelInfo`]: the identity a trained model belongs to

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SegmentError;

/// Headset sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE_HZ: f64 = 250.0;

// ============================================================================
// EEG Bands
// ============================================================================

/// EEG frequency bands
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EegBand {
    /// Delta: 0.5-4 Hz (deep sleep)
    Delta,
    /// Theta: 4-8 Hz (drowsiness, memory)
    Theta,
    /// Alpha: 8-13 Hz (relaxed, eyes closed)
    Alpha,
    /// Beta: 13-30 Hz (active thinking)
    Beta,
    /// Gamma: 30-100 Hz (cognitive processing)
    Gamma,
}

impl EegBand {
    /// Get the frequency range for this band (low, high) in Hz
    #[inline]
    #[must_use]
    pub const fn range_hz(self) -> (f64, f64) {
        match self {
            Self::Delta => (0.5, 4.0),
            Self::Theta => (4.0, 8.0),
            Self::Alpha => (8.0, 13.0),
            Self::Beta => (13.0, 30.0),
            Self::Gamma => (30.0, 100.0),
        }
    }

    /// Get the band name
    #[inline]
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Delta => "Delta",
            Self::Theta => "Theta",
            Self::Alpha => "Alpha",
            Self::Beta => "Beta",
            Self::Gamma => "Gamma",
        }
    }
}

impl fmt::Display for EegBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// EEG Channels
// ============================================================================

/// Frontal channels used for attention and memory scoring.
///
/// Row 0 of a headset segment is the reference electrode, rows 1 and 2 carry
/// FP1 and FP2.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EegChannel {
    /// Left frontal pole
    Fp1,
    /// Right frontal pole
    Fp2,
}

impl EegChannel {
    /// Scored channels in row order
    pub const ALL: [Self; 2] = [Self::Fp1, Self::Fp2];

    /// Row index of this channel within a segment
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Fp1 => 1,
            Self::Fp2 => 2,
        }
    }

    /// 10-20 system label
    #[inline]
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fp1 => "FP1",
            Self::Fp2 => "FP2",
        }
    }

    /// Minimum number of rows a segment needs to carry every scored channel
    #[must_use]
    pub const fn required_rows() -> usize {
        3
    }
}

// ============================================================================
// EEG Segment
// ============================================================================

/// A block of multichannel EEG recorded at a fixed sample rate.
///
/// Every row holds the same number of samples. Segments are immutable once
/// built; windowing and concatenation produce new segments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EegSegment {
    /// Creation time of the first sample
    pub created_at: DateTime<Utc>,
    /// Sample rate in Hz
    pub sample_rate: f64,
    /// Channel rows (channels × samples)
    channels: Vec<Vec<f64>>,
}

impl EegSegment {
    /// Build a segment, rejecting empty or ragged matrices.
    pub fn new(
        created_at: DateTime<Utc>,
        sample_rate: f64,
        channels: Vec<Vec<f64>>,
    ) -> Result<Self, SegmentError> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(SegmentError::InvalidSampleRate { sample_rate });
        }

        let expected = channels.first().map(Vec::len).ok_or(SegmentError::Empty)?;
        if expected == 0 {
            return Err(SegmentError::Empty);
        }

        if let Some((channel, row)) = channels.iter().enumerate().find(|(_, r)| r.len() != expected) {
            return Err(SegmentError::RaggedChannels {
                channel,
                expected,
                got: row.len(),
            });
        }

        Ok(Self {
            created_at,
            sample_rate,
            channels,
        })
    }

    /// Number of channel rows
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of samples per channel
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Covered duration in seconds
    #[must_use]
    pub fn duration_secs(&self) -> f64 {
        self.sample_count() as f64 / self.sample_rate
    }

    /// Samples of one row
    #[must_use]
    pub fn row(&self, index: usize) -> Option<&[f64]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Samples of a scored channel
    #[must_use]
    pub fn channel(&self, channel: EegChannel) -> Option<&[f64]> {
        self.row(channel.index())
    }

    /// All rows
    #[must_use]
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.channels
    }

    /// Concatenate segments along time, ordered by `created_at`.
    ///
    /// All parts must share channel count and sample rate.
    pub fn concat(parts: &[Self]) -> Result<Self, SegmentError> {
        let mut ordered: Vec<&Self> = parts.iter().collect();
        ordered.sort_by_key(|s| s.created_at);

        let first = ordered.first().ok_or(SegmentError::Empty)?;
        let channel_count = first.channel_count();
        let sample_rate = first.sample_rate;
        let total: usize = ordered.iter().map(|s| s.sample_count()).sum();

        let mut channels: Vec<Vec<f64>> = (0..channel_count).map(|_| Vec::with_capacity(total)).collect();

        for part in &ordered {
            if part.channel_count() != channel_count {
                return Err(SegmentError::ChannelMismatch {
                    expected: channel_count,
                    got: part.channel_count(),
                });
            }
            if (part.sample_rate - sample_rate).abs() > f64::EPSILON {
                return Err(SegmentError::SampleRateMismatch {
                    expected: sample_rate,
                    got: part.sample_rate,
                });
            }
            for (dst, src) in channels.iter_mut().zip(&part.channels) {
                dst.extend_from_slice(src);
            }
        }

        Ok(Self {
            created_at: first.created_at,
            sample_rate,
            channels,
        })
    }

    /// Copy `len` samples starting at `start`, or `None` if out of range.
    #[must_use]
    pub fn window(&self, start: usize, len: usize) -> Option<Self> {
        if len == 0 || start.checked_add(len)? > self.sample_count() {
            return None;
        }

        let offset_ms = (start as f64 / self.sample_rate * 1000.0).round() as i64;

        Some(Self {
            created_at: self.created_at + chrono::Duration::milliseconds(offset_ms),
            sample_rate: self.sample_rate,
            channels: self.channels.iter().map(|row| row[start..start + len].to_vec()).collect(),
        })
    }

    /// The most recent `len` samples, or `None` if the segment is shorter.
    #[must_use]
    pub fn tail(&self, len: usize) -> Option<Self> {
        let start = self.sample_count().checked_sub(len)?;
        self.window(start, len)
    }

    /// Cut into non-overlapping windows of `len` samples; a short remainder is dropped.
    #[must_use]
    pub fn split_windows(&self, len: usize) -> Vec<Self> {
        if len == 0 {
            return Vec::new();
        }
        (0..self.sample_count() / len)
            .filter_map(|i| self.window(i * len, len))
            .collect()
    }
}

// ============================================================================
// Model Identity
// ============================================================================

/// Identity of the caller a model is trained for.
///
/// The same four fields key data lookups, the model registry and the
/// metadata stored next to every artifact.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Free-form session or subject name
    pub name: String,
    /// Organisation ID
    pub org_id: String,
    /// User ID
    pub user_id: String,
    /// Project the model serves
    pub project_name: String,
}

impl ModelInfo {
    /// Create a new identity
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        org_id: impl Into<String>,
        user_id: impl Into<String>,
        project_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            org_id: org_id.into(),
            user_id: user_id.into(),
            project_name: project_name.into(),
        }
    }
}

impl fmt::Display for ModelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{name: {}, org_id: {}, user_id: {}, project_name: {}}}",
            self.name, self.org_id, self.user_id, self.project_name
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
