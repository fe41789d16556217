use crate::error::{ConvertError, Result};
use crate::layout::{CODE_MAX, CODE_MIN};
use crate::types::{
    CalibrationTable, ChannelInfo, DecodedRecording, EncodedSamples, Finding, FindingCode, Severity,
};

/// Quantizes every sample under the channel's calibration.
///
/// `code = round((x - offset) / scale)`, rounding half away from zero and
/// clamped to the i16 range. Clamped and non-finite samples are counted per
/// channel in [`EncodedSamples::clipped`].
///
/// # Examples
///
/// ```rust
/// use edf2wineeg::{encoder, CalibrationTable, ChannelInfo, DecodedRecording};
///
/// let recording = DecodedRecording::new(
///     vec![ChannelInfo::new("Cz", 250.0)],
///     vec![vec![0.5, -1.5, 12.26, 40_000.0]],
/// )?;
/// let table = CalibrationTable::uniform(0.1, 1, 1);
/// let encoded = encoder::encode(&recording, &table)?;
/// assert_eq!(encoded.codes[0], vec![5, -15, 123, 32767]);
/// assert_eq!(encoded.clipped[0], 1);
/// # Ok::<(), edf2wineeg::ConvertError>(())
/// ```
pub fn encode(recording: &DecodedRecording, table: &CalibrationTable) -> Result<EncodedSamples> {
    if table.len() != recording.channel_count() {
        return Err(ConvertError::InvalidRecording(format!(
            "calibration table has {} entries for {} channels",
            table.len(),
            recording.channel_count()
        )));
    }

    let mut codes = Vec::with_capacity(recording.channel_count());
    let mut clipped = vec![0usize; recording.channel_count()];

    for (ch, (samples, entry)) in recording.samples().iter().zip(&table.entries).enumerate() {
        let row = samples
            .iter()
            .map(|&x| {
                let code = entry.to_code(x);
                if !code.is_finite() {
                    clipped[ch] += 1;
                    0
                } else if code > CODE_MAX as f64 {
                    clipped[ch] += 1;
                    CODE_MAX
                } else if code < CODE_MIN as f64 {
                    clipped[ch] += 1;
                    CODE_MIN
                } else {
                    code as i16
                }
            })
            .collect();
        codes.push(row);
    }

    Ok(EncodedSamples { codes, clipped })
}

impl EncodedSamples {
    /// One `ClippedSamples` warning per channel that had clamp events.
    pub fn clip_findings(&self) -> Vec<Finding> {
        self.clipped
            .iter()
            .enumerate()
            .filter(|&(_, &n)| n > 0)
            .map(|(ch, &n)| {
                Finding::new(
                    Severity::Warning,
                    FindingCode::ClippedSamples,
                    format!("{} of {} samples clamped to the code range", n, self.frame_count()),
                )
                .for_channel(ch)
            })
            .collect()
    }
}

/// Brings a recording to `target_rate` by linear interpolation.
///
/// The output holds `floor(n * target / source)` samples per channel. A
/// recording already at `target_rate` is returned unchanged.
pub fn resample(recording: DecodedRecording, target_rate: f64) -> Result<DecodedRecording> {
    let source_rate = recording.sample_rate();
    if (source_rate - target_rate).abs() < 1e-9 {
        return Ok(recording);
    }
    if !(target_rate.is_finite() && target_rate > 0.0) {
        return Err(ConvertError::InvalidRecording(format!("cannot resample to {} Hz", target_rate)));
    }

    let n_in = recording.sample_count();
    let n_out = (n_in as f64 * target_rate / source_rate).floor() as usize;
    let step = source_rate / target_rate;

    let (channels, samples) = recording.into_parts();
    let samples = samples
        .iter()
        .map(|row| {
            (0..n_out)
                .map(|j| {
                    let t = j as f64 * step;
                    let i = t.floor() as usize;
                    let frac = t - i as f64;
                    let a = row[i.min(n_in - 1)];
                    let b = row[(i + 1).min(n_in - 1)];
                    a + (b - a) * frac
                })
                .collect()
        })
        .collect();
    let channels = channels
        .into_iter()
        .map(|c| ChannelInfo { sample_rate: target_rate, ..c })
        .collect();

    log::info!("Resampled {} samples at {} Hz to {} at {} Hz", n_in, source_rate, n_out, target_rate);
    DecodedRecording::new(channels, samples)
}
