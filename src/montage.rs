use std::collections::HashMap;

use crate::error::{ConvertError, Result};
use crate::types::{DecodedRecording, Finding, FindingCode, Severity};
use crate::utils::normalize_label;

/// How input channels are placed into template channel slots.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMapping {
    /// `order[slot]` is the input channel written to template slot `slot`
    pub order: Vec<usize>,
    pub finding: Option<Finding>,
}

impl ChannelMapping {
    pub fn is_identity(&self) -> bool {
        self.order.iter().enumerate().all(|(slot, &ch)| slot == ch)
    }
}

/// Matches input labels against the template montage.
///
/// Labels are compared after [`normalize_label`]. A full one-to-one match
/// yields a reordering into template order; labels that match nothing at
/// all are taken positionally with a warning. Anything in between is an
/// unsupported layout.
///
/// ```rust
/// use edf2wineeg::montage::map_channels;
///
/// let template: Vec<String> = ["Fp1", "Fp2", "Cz"].iter().map(|s| s.to_string()).collect();
/// let input: Vec<String> = ["EEG Cz-REF", "EEG Fp1-REF", "EEG Fp2-REF"].iter().map(|s| s.to_string()).collect();
/// let mapping = map_channels(&input, &template)?;
/// assert_eq!(mapping.order, vec![1, 2, 0]);
/// # Ok::<(), edf2wineeg::ConvertError>(())
/// ```
pub fn map_channels(input: &[String], template: &[String]) -> Result<ChannelMapping> {
    if input.len() != template.len() {
        return Err(ConvertError::UnsupportedChannelLayout(format!(
            "{} input channels, template expects {}",
            input.len(),
            template.len()
        )));
    }

    let slots: HashMap<String, usize> = template
        .iter()
        .enumerate()
        .map(|(slot, label)| (normalize_label(label), slot))
        .collect();

    let mut order = vec![None; template.len()];
    let mut unmatched = Vec::new();
    for (ch, label) in input.iter().enumerate() {
        match slots.get(&normalize_label(label)) {
            Some(&slot) if order[slot].is_none() => order[slot] = Some(ch),
            Some(_) => {
                return Err(ConvertError::UnsupportedChannelLayout(format!("duplicate channel '{}'", label)));
            }
            None => unmatched.push(label.as_str()),
        }
    }

    if unmatched.len() == input.len() {
        return Ok(ChannelMapping {
            order: (0..input.len()).collect(),
            finding: Some(Finding::new(
                Severity::Warning,
                FindingCode::UnrecognizedLabels,
                "no input label matches the template montage; channels taken in file order",
            )),
        });
    }
    if !unmatched.is_empty() {
        return Err(ConvertError::UnsupportedChannelLayout(format!(
            "labels not in the template montage: {}",
            unmatched.join(", ")
        )));
    }

    let order: Vec<usize> = order.into_iter().flatten().collect();
    let mut mapping = ChannelMapping { order, finding: None };
    if !mapping.is_identity() {
        mapping.finding = Some(Finding::new(
            Severity::Info,
            FindingCode::ChannelsReordered,
            format!("input channels reordered into template order {:?}", mapping.order),
        ));
    }
    Ok(mapping)
}

/// Rearranges a recording's channels according to `mapping`.
pub fn apply(recording: DecodedRecording, mapping: &ChannelMapping) -> Result<DecodedRecording> {
    if mapping.is_identity() {
        return Ok(recording);
    }
    let (channels, samples) = recording.into_parts();
    let mut channels: Vec<_> = channels.into_iter().map(Some).collect();
    let mut samples: Vec<_> = samples.into_iter().map(Some).collect();

    let mut out_channels = Vec::with_capacity(channels.len());
    let mut out_samples = Vec::with_capacity(samples.len());
    for &ch in &mapping.order {
        match (channels.get_mut(ch).and_then(Option::take), samples.get_mut(ch).and_then(Option::take)) {
            (Some(info), Some(row)) => {
                out_channels.push(info);
                out_samples.push(row);
            }
            _ => {
                return Err(ConvertError::UnsupportedChannelLayout(format!("channel {} mapped twice", ch)));
            }
        }
    }
    DecodedRecording::new(out_channels, out_samples)
}
