//! Assembling windows from raw records

use mindscore_core::error::{PredictingError, SegmentError, TrainingError};
use mindscore_core::types::{EegChannel, EegSegment};

use crate::config::SignalConfig;
use crate::source::EegRecord;

/// Labelled training windows split into target and non-target classes.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingSet {
    /// Sample rate shared by every window
    pub sample_rate: f64,
    /// Windows of every other label
    pub non_target: Vec<EegSegment>,
    /// Windows carrying the target label
    pub target: Vec<EegSegment>,
}

impl TrainingSet {
    /// Group records by label and cut each class into windows.
    ///
    /// Records of one class are joined in time order before windowing; a
    /// short tail of each class is dropped.
    pub fn from_records(
        records: &[EegRecord],
        target_label: &str,
        signal: &SignalConfig,
    ) -> Result<Self, TrainingError> {
        if records.is_empty() {
            return Err(TrainingError::DataShortage {
                got_secs: 0.0,
                need_secs: signal.train_secs,
            });
        }

        let labels = records.iter().filter(|r| r.label.is_some()).count();
        if labels != records.len() {
            return Err(TrainingError::DataLabelMismatch {
                data: records.len(),
                labels,
            });
        }

        let mut target = Vec::new();
        let mut non_target = Vec::new();
        for record in records {
            let segment = checked_segment(record, signal).map_err(|reason| TrainingError::DataFormat { reason })?;
            if record.label.as_deref() == Some(target_label) {
                target.push(segment);
            } else {
                non_target.push(segment);
            }
        }

        let got_secs: f64 = target.iter().chain(&non_target).map(EegSegment::duration_secs).sum();
        if got_secs < signal.train_secs {
            return Err(TrainingError::DataShortage {
                got_secs,
                need_secs: signal.train_secs,
            });
        }

        let window = signal.window_samples();
        let split = |class: &[EegSegment], name: &str| -> Result<Vec<EegSegment>, TrainingError> {
            if class.is_empty() {
                return Err(TrainingError::Label {
                    reason: format!("no records in the {name} class"),
                });
            }
            let joined = EegSegment::concat(class).map_err(|e| TrainingError::DataFormat { reason: e.to_string() })?;
            let windows = joined.split_windows(window);
            if windows.is_empty() {
                return Err(TrainingError::Label {
                    reason: format!(
                        "{name} class holds {:.1}s, shorter than one {:.1}s window",
                        joined.duration_secs(),
                        signal.window_secs
                    ),
                });
            }
            Ok(windows)
        };

        Ok(Self {
            sample_rate: signal.sample_rate,
            target: split(&target, &format!("target ({target_label})"))?,
            non_target: split(&non_target, "non-target")?,
        })
    }

    /// Total number of windows
    #[must_use]
    pub fn len(&self) -> usize {
        self.target.len() + self.non_target.len()
    }

    /// True when no windows were cut
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Join prediction records in time order and keep the latest window.
pub fn prediction_window(records: &[EegRecord], signal: &SignalConfig) -> Result<EegSegment, PredictingError> {
    let shortage = |got_secs| PredictingError::DataShortage {
        got_secs,
        need_secs: signal.predict_secs,
    };

    if records.is_empty() {
        return Err(shortage(0.0));
    }

    let segments = records
        .iter()
        .map(|r| checked_segment(r, signal))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|reason| PredictingError::DataFormat { reason })?;

    let joined = EegSegment::concat(&segments).map_err(|e| PredictingError::DataFormat { reason: e.to_string() })?;
    joined
        .tail(signal.predict_samples())
        .ok_or_else(|| shortage(joined.duration_secs()))
}

/// Record as a segment with the scored channels at the configured rate
fn checked_segment(record: &EegRecord, signal: &SignalConfig) -> Result<EegSegment, String> {
    let segment = record.to_segment().map_err(|e: SegmentError| e.to_string())?;

    if segment.channel_count() < EegChannel::required_rows() {
        return Err(format!(
            "record has {} channels, at least {} required",
            segment.channel_count(),
            EegChannel::required_rows()
        ));
    }
    if (segment.sample_rate - signal.sample_rate).abs() > f64::EPSILON {
        return Err(format!(
            "record sampled at {} Hz, expected {} Hz",
            segment.sample_rate, signal.sample_rate
        ));
    }

    Ok(segment)
}
