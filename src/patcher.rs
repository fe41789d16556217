use crate::error::{ConvertError, Result};
use crate::grafter::OutputBuffer;
use crate::layout::{self, FieldSpec, PATIENT_FIELDS};
use crate::types::{CalibrationTable, Finding, FindingCode, Severity};

/// Metadata written into the output header.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchMetadata {
    /// `None` keeps the template's patient fields
    pub patient: Option<String>,
    pub channel_count: usize,
    pub sample_rate: f64,
    /// Data frames actually grafted into the body
    pub frame_count: usize,
}

/// Bytes destined for one header field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPatch {
    pub field: FieldSpec,
    pub bytes: Vec<u8>,
}

impl FieldPatch {
    fn new(field: FieldSpec, bytes: Vec<u8>) -> Self {
        debug_assert_eq!(bytes.len(), field.width, "{}", field.name);
        FieldPatch { field, bytes }
    }
}

/// Builds the list of field writes for `meta` and `table` without touching a buffer.
///
/// Marker channels get no calibration patch, and channel count, sample rate
/// and frame count are only planned when the buffer's layout places them.
/// Any cut made to fit a field is returned as a `FieldOverflow` finding.
pub fn plan(
    buffer: &OutputBuffer,
    meta: &PatchMetadata,
    table: &CalibrationTable,
) -> Result<(Vec<FieldPatch>, Vec<Finding>)> {
    if table.len() != buffer.channel_count() {
        return Err(ConvertError::UnsupportedChannelLayout(format!(
            "calibration for {} channels, template has {}",
            table.len(),
            buffer.channel_count()
        )));
    }

    let mut patches = Vec::new();
    let mut findings = Vec::new();

    if let Some(name) = &meta.patient {
        let (text, truncated) = layout::encode_patient(name);
        if truncated {
            findings.push(Finding::new(
                Severity::Warning,
                FindingCode::FieldOverflow,
                format!("patient name cut to {} bytes", layout::PATIENT_TEXT_LEN),
            ));
        }
        patches.extend(PATIENT_FIELDS.iter().map(|&field| FieldPatch::new(field, text.clone())));
    }

    let options = buffer.layout();
    if let Some(field) = options.channel_count_field() {
        let channels = u16::try_from(meta.channel_count)
            .map_err(|_| ConvertError::InvalidRecording(format!("{} channels", meta.channel_count)))?;
        patches.push(FieldPatch::new(field, layout::encode_u16(channels)));
    }

    if let Some(field) = options.sample_rate_field() {
        let rate = meta.sample_rate.round();
        if rate.is_nan() || rate < 1.0 || rate > u16::MAX as f64 {
            return Err(ConvertError::InvalidRecording(format!("sample rate {} Hz", meta.sample_rate)));
        }
        patches.push(FieldPatch::new(field, layout::encode_u16(rate as u16)));
    }

    if let Some(field) = options.frame_count_field() {
        let frames = u32::try_from(meta.frame_count)
            .map_err(|_| ConvertError::InvalidRecording(format!("{} frames", meta.frame_count)))?;
        patches.push(FieldPatch::new(field, layout::encode_u32(frames)));
    }

    for (ch, entry) in table.entries.iter().enumerate() {
        if buffer.is_marker(ch) {
            continue;
        }
        patches.push(FieldPatch::new(layout::calibration_field(ch), vec![entry.multiplier]));
    }

    Ok((patches, findings))
}

/// Writes the header fields for this conversion into `buffer`.
///
/// Every patch is bounds-checked before the first write, so a failure leaves
/// the buffer unchanged. Bytes outside the patched fields are never touched.
///
/// # Errors
///
/// * `ConvertError::TemplateLoadFailure` - a field lies outside the template header
/// * `ConvertError::UnsupportedChannelLayout` - calibration table does not match the template
/// * `ConvertError::InvalidRecording` - a value cannot be represented in its field
///
/// ```rust
/// use edf2wineeg::config::LayoutOptions;
/// use edf2wineeg::doctest_utils::synthetic_template;
/// use edf2wineeg::grafter::OutputBuffer;
/// use edf2wineeg::layout::{decode_patient, PATIENT_FIELDS};
/// use edf2wineeg::patcher::{patch, PatchMetadata};
/// use edf2wineeg::CalibrationTable;
///
/// let template = synthetic_template("t.EEG", 250.0, 0.5)?;
/// let mut buffer = OutputBuffer::from_template(&template, &LayoutOptions::default());
/// let meta = PatchMetadata {
///     patient: Some("Jane Doe".to_string()),
///     channel_count: 19,
///     sample_rate: 250.0,
///     frame_count: 2500,
/// };
/// let findings = patch(&mut buffer, &meta, &CalibrationTable::uniform(1.0, 1, 19))?;
/// assert!(findings.is_empty());
/// assert_eq!(decode_patient(buffer.header(), PATIENT_FIELDS[3]).as_deref(), Some("Jane Doe"));
/// # Ok::<(), edf2wineeg::ConvertError>(())
/// ```
pub fn patch(buffer: &mut OutputBuffer, meta: &PatchMetadata, table: &CalibrationTable) -> Result<Vec<Finding>> {
    let (patches, findings) = plan(buffer, meta, table)?;

    let header_len = buffer.regions().header.len;
    if let Some(bad) = patches.iter().find(|p| p.field.range().end > header_len) {
        return Err(ConvertError::template(
            buffer.template_name(),
            format!("{} field at {:#06x} lies outside the {}-byte header", bad.field.name, bad.field.offset, header_len),
        ));
    }

    let bytes = buffer.bytes_mut();
    for p in &patches {
        bytes[p.field.range()].copy_from_slice(&p.bytes);
    }

    log::debug!("Patched {} header fields", patches.len());
    Ok(findings)
}
