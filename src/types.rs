use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};

/// Descriptor of one decoded input channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub label: String,
    /// Physical dimension, always microvolts once the recording reaches the core
    pub unit: String,
    pub sample_rate: f64,
}

impl ChannelInfo {
    pub fn new(label: &str, sample_rate: f64) -> Self {
        ChannelInfo {
            label: label.to_string(),
            unit: "uV".to_string(),
            sample_rate,
        }
    }
}

/// A recording as handed over by the EDF decoding boundary.
///
/// Samples are stored channel-major (`samples[channel][sample]`) in physical
/// units. Every channel has the same length and sample rate.
#[derive(Debug, Clone)]
pub struct DecodedRecording {
    channels: Vec<ChannelInfo>,
    samples: Vec<Vec<f64>>,
}

impl DecodedRecording {
    /// Builds a recording, rejecting ragged or inconsistent input.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use edf2wineeg::{ChannelInfo, DecodedRecording};
    ///
    /// let channels = vec![ChannelInfo::new("Fp1", 250.0), ChannelInfo::new("Fp2", 250.0)];
    /// let samples = vec![vec![0.0; 500], vec![1.0; 500]];
    /// let recording = DecodedRecording::new(channels, samples)?;
    /// assert_eq!(recording.sample_count(), 500);
    /// assert!((recording.duration_secs() - 2.0).abs() < 1e-9);
    /// # Ok::<(), edf2wineeg::ConvertError>(())
    /// ```
    pub fn new(channels: Vec<ChannelInfo>, samples: Vec<Vec<f64>>) -> Result<Self> {
        if channels.is_empty() {
            return Err(ConvertError::InvalidRecording("recording has no channels".to_string()));
        }
        if channels.len() != samples.len() {
            return Err(ConvertError::InvalidRecording(format!(
                "{} channel descriptors but {} sample rows",
                channels.len(),
                samples.len()
            )));
        }

        let rate = channels[0].sample_rate;
        if !(rate.is_finite() && rate > 0.0) {
            return Err(ConvertError::InvalidRecording(format!("invalid sample rate {}", rate)));
        }
        if let Some(ch) = channels.iter().find(|c| (c.sample_rate - rate).abs() > 1e-6) {
            return Err(ConvertError::InvalidRecording(format!(
                "channel '{}' sampled at {} Hz, expected {} Hz",
                ch.label, ch.sample_rate, rate
            )));
        }

        let len = samples[0].len();
        if let Some(i) = samples.iter().position(|row| row.len() != len) {
            return Err(ConvertError::InvalidRecording(format!(
                "channel {} has {} samples, expected {}",
                i,
                samples[i].len(),
                len
            )));
        }

        Ok(DecodedRecording { channels, samples })
    }

    pub fn channels(&self) -> &[ChannelInfo] {
        &self.channels
    }

    pub fn samples(&self) -> &[Vec<f64>] {
        &self.samples
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel
    pub fn sample_count(&self) -> usize {
        self.samples[0].len()
    }

    pub fn sample_rate(&self) -> f64 {
        self.channels[0].sample_rate
    }

    pub fn duration_secs(&self) -> f64 {
        self.sample_count() as f64 / self.sample_rate()
    }

    pub fn labels(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.label.clone()).collect()
    }

    pub(crate) fn into_parts(self) -> (Vec<ChannelInfo>, Vec<Vec<f64>>) {
        (self.channels, self.samples)
    }
}

/// Scale and bias of one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationEntry {
    /// Physical units per integer code, always > 0
    pub scale: f64,
    /// Physical value represented by code 0
    pub offset: f64,
    /// On-disk calibration byte; `scale == unit * multiplier`
    pub multiplier: u8,
}

impl CalibrationEntry {
    pub fn to_code(&self, physical: f64) -> f64 {
        ((physical - self.offset) / self.scale).round()
    }

    pub fn to_physical(&self, code: i16) -> f64 {
        code as f64 * self.scale + self.offset
    }
}

/// Per-channel calibration in channel order.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationTable {
    /// Physical units represented by calibration byte value 1
    pub unit: f64,
    pub entries: Vec<CalibrationEntry>,
}

impl CalibrationTable {
    /// A table with every channel at `multiplier × unit`.
    pub fn uniform(unit: f64, multiplier: u8, channels: usize) -> Self {
        let entry = CalibrationEntry {
            scale: unit * multiplier as f64,
            offset: 0.0,
            multiplier,
        };
        CalibrationTable {
            unit,
            entries: vec![entry; channels],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Integer sample matrix produced by the re-encoder, channel-major.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedSamples {
    pub codes: Vec<Vec<i16>>,
    /// Clamp events per channel
    pub clipped: Vec<usize>,
}

impl EncodedSamples {
    pub fn channel_count(&self) -> usize {
        self.codes.len()
    }

    pub fn frame_count(&self) -> usize {
        self.codes.first().map_or(0, |c| c.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FindingCode {
    PowerOverflow,
    WeakSignal,
    AsymmetricScaling,
    DegenerateChannel,
    ClippedSamples,
    FieldOverflow,
    Resampled,
    ChannelsReordered,
    UnrecognizedLabels,
    ValidationFailed,
    CheckSkipped,
    Pass,
    Fail,
}

/// One advisory entry of a validation report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub code: FindingCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<usize>,
}

impl Finding {
    pub fn new(severity: Severity, code: FindingCode, message: impl Into<String>) -> Self {
        Finding {
            severity,
            code,
            message: message.into(),
            channel: None,
        }
    }

    pub fn for_channel(mut self, channel: usize) -> Self {
        self.channel = Some(channel);
        self
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.channel {
            Some(ch) => write!(f, "[{:?}] {:?} (ch {}): {}", self.severity, self.code, ch, self.message),
            None => write!(f, "[{:?}] {:?}: {}", self.severity, self.code, self.message),
        }
    }
}

/// Ordered, append-only list of findings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub created: String,
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    pub fn new() -> Self {
        ValidationReport {
            created: chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
            findings: Vec::new(),
        }
    }

    pub fn push(&mut self, finding: Finding) {
        self.findings.push(finding);
    }

    pub fn extend<I: IntoIterator<Item = Finding>>(&mut self, findings: I) {
        self.findings.extend(findings);
    }

    pub fn has(&self, code: FindingCode) -> bool {
        self.findings.iter().any(|f| f.code == code)
    }

    pub fn with_code(&self, code: FindingCode) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.code == code)
    }

    /// The terminal `Pass`/`Fail` finding, if the reporter has run.
    pub fn summary(&self) -> Option<&Finding> {
        self.findings
            .iter()
            .rev()
            .find(|f| matches!(f.code, FindingCode::Pass | FindingCode::Fail))
    }

    pub fn passed(&self) -> bool {
        self.summary().map_or(false, |f| f.code == FindingCode::Pass)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ConvertError::Config(format!("cannot serialise report: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_rejects_ragged_rows() {
        let channels = vec![ChannelInfo::new("A", 250.0), ChannelInfo::new("B", 250.0)];
        let result = DecodedRecording::new(channels, vec![vec![0.0; 10], vec![0.0; 9]]);
        assert!(matches!(result, Err(ConvertError::InvalidRecording(_))));
    }

    #[test]
    fn test_recording_rejects_mixed_rates() {
        let channels = vec![ChannelInfo::new("A", 250.0), ChannelInfo::new("B", 256.0)];
        let result = DecodedRecording::new(channels, vec![vec![0.0; 10], vec![0.0; 10]]);
        assert!(matches!(result, Err(ConvertError::InvalidRecording(_))));
    }

    #[test]
    fn test_calibration_entry_rounds_half_away_from_zero() {
        let entry = CalibrationEntry { scale: 1.0, offset: 0.0, multiplier: 1 };
        assert_eq!(entry.to_code(2.5), 3.0);
        assert_eq!(entry.to_code(-2.5), -3.0);
        assert_eq!(entry.to_code(2.4), 2.0);
    }

    #[test]
    fn test_report_summary_is_last_verdict() {
        let mut report = ValidationReport::new();
        report.push(Finding::new(Severity::Warning, FindingCode::WeakSignal, "weak"));
        assert!(report.summary().is_none());
        report.push(Finding::new(Severity::Info, FindingCode::Pass, "ok"));
        assert!(report.passed());

        let json = report.to_json().unwrap();
        assert!(json.contains("\"WeakSignal\""));
        let back: ValidationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
