use crate::config::LayoutOptions;
use crate::error::{ConvertError, Result};
use crate::layout::SAMPLE_WIDTH;
use crate::template::{Regions, Template};
use crate::types::EncodedSamples;

/// A private copy of a template's bytes that one conversion writes into.
///
/// The buffer always has exactly the template's length; patching and
/// grafting only overwrite bytes in place.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    template_name: String,
    bytes: Vec<u8>,
    regions: Regions,
    sample_rate: f64,
    channel_count: usize,
    layout: LayoutOptions,
}

impl OutputBuffer {
    pub fn from_template(template: &Template, layout: &LayoutOptions) -> Self {
        OutputBuffer {
            template_name: template.name().to_string(),
            bytes: template.bytes().to_vec(),
            regions: template.regions(),
            sample_rate: template.sample_rate(),
            channel_count: template.channel_count(),
            layout: layout.clone(),
        }
    }

    pub fn template_name(&self) -> &str {
        &self.template_name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn regions(&self) -> Regions {
        self.regions
    }

    pub fn header(&self) -> &[u8] {
        &self.bytes[self.regions.header.range()]
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn frame_len(&self) -> usize {
        self.channel_count * SAMPLE_WIDTH
    }

    /// Whole frames the body region can hold.
    pub fn body_frames(&self) -> usize {
        self.regions.body.len / self.frame_len()
    }

    /// Layout options this buffer is patched and grafted under.
    pub fn layout(&self) -> &LayoutOptions {
        &self.layout
    }

    pub fn is_marker(&self, channel: usize) -> bool {
        self.layout.is_marker(channel)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Writes encoded frames into the body region.
///
/// Frames are interleaved (channel 0..N, i16 little-endian) starting at the
/// first body byte. Nothing is written when the samples do not fit. Marker
/// channels keep the code already in the buffer. Returns the number of body
/// bytes covered by the written frames.
///
/// # Errors
///
/// * `ConvertError::UnsupportedChannelLayout` - channel count differs from the buffer's
/// * `ConvertError::CapacityExceeded` - more frames than the body holds
///
/// ```rust
/// use edf2wineeg::config::LayoutOptions;
/// use edf2wineeg::doctest_utils::synthetic_template;
/// use edf2wineeg::grafter::{graft, OutputBuffer};
/// use edf2wineeg::EncodedSamples;
///
/// let template = synthetic_template("t.EEG", 10.0, 1.0)?;
/// let mut buffer = OutputBuffer::from_template(&template, &LayoutOptions::default());
/// let samples = EncodedSamples { codes: vec![vec![7i16; 20]; 19], clipped: vec![0; 19] };
/// assert_eq!(graft(&mut buffer, &samples)?, 20 * 38);
/// assert_eq!(buffer.len(), template.len());
/// # Ok::<(), edf2wineeg::ConvertError>(())
/// ```
pub fn graft(buffer: &mut OutputBuffer, samples: &EncodedSamples) -> Result<usize> {
    if samples.channel_count() != buffer.channel_count() {
        return Err(ConvertError::UnsupportedChannelLayout(format!(
            "{} encoded channels for a {}-channel template",
            samples.channel_count(),
            buffer.channel_count()
        )));
    }

    let frame_len = buffer.frame_len();
    let frames = samples.frame_count();
    if samples.codes.iter().any(|row| row.len() != frames) {
        return Err(ConvertError::InvalidRecording("encoded channels differ in length".to_string()));
    }
    let needed = frames * frame_len;
    let body = buffer.regions().body;
    if needed > body.len {
        return Err(ConvertError::CapacityExceeded {
            requested: frames as f64 / buffer.sample_rate(),
            available: buffer.body_frames() as f64 / buffer.sample_rate(),
        });
    }

    let writable: Vec<usize> = (0..buffer.channel_count()).filter(|&ch| !buffer.is_marker(ch)).collect();
    let target = &mut buffer.bytes_mut()[body.offset..body.offset + needed];
    for (frame, chunk) in target.chunks_exact_mut(frame_len).enumerate() {
        for &ch in &writable {
            let at = ch * SAMPLE_WIDTH;
            chunk[at..at + SAMPLE_WIDTH].copy_from_slice(&samples.codes[ch][frame].to_le_bytes());
        }
    }

    log::debug!("Grafted {} frames ({} bytes) into a {}-byte body", frames, needed, body.len);
    Ok(needed)
}
