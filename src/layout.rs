//! On-disk layout of the legacy WinEEG `.EEG` file
//!
//! ```text
//! +----------------+------------------+--------------------+------------------+---------+
//! | header (1024)  | head: 5 s frames | body: N frames     | 1 s frames       | trailer |
//! +----------------+------------------+--------------------+------------------+---------+
//!                                                          |<------- tail ----------->|
//! ```
//!
//! A frame is one i16 little-endian code per channel. Header fields are
//! described by [`FieldSpec`] entries; only those byte ranges are ever
//! written, everything else in a template is copied verbatim.

use std::ops::Range;

pub const HEADER_LEN: usize = 1024;
pub const TRAILER_LEN: usize = 34;
pub const CHANNEL_COUNT: usize = 19;
pub const SAMPLE_WIDTH: usize = 2;
pub const FRAME_LEN: usize = CHANNEL_COUNT * SAMPLE_WIDTH;
pub const DEFAULT_SAMPLE_RATE: f64 = 250.0;

/// Lead-in kept from the template at the start of the data area
pub const LEAD_IN_SECS: f64 = 5.0;
/// Lead-out kept from the template in front of the trailer
pub const LEAD_OUT_SECS: f64 = 1.0;

pub const CODE_MAX: i16 = i16::MAX;
pub const CODE_MIN: i16 = i16::MIN;

/// Channel order of the lab templates (10-20 system, old temporal names).
pub const MONTAGE_10_20: [&str; CHANNEL_COUNT] = [
    "Fp1", "Fp2", "F7", "F3", "Fz", "F4", "F8", "T3", "C3", "Cz", "C4", "T4", "T5", "P3", "Pz",
    "P4", "T6", "O1", "O2",
];

/// A fixed-width header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub offset: usize,
    pub width: usize,
}

impl FieldSpec {
    pub const fn new(name: &'static str, offset: usize, width: usize) -> Self {
        FieldSpec { name, offset, width }
    }

    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.width
    }

    pub fn contains(&self, pos: usize) -> bool {
        self.range().contains(&pos)
    }
}

/// The viewer reads the patient name from several copies of the same field.
pub const PATIENT_FIELDS: [FieldSpec; 4] = [
    FieldSpec::new("patient_name", 0x0080, 32),
    FieldSpec::new("patient_name", 0x00A0, 32),
    FieldSpec::new("patient_name", 0x00C0, 32),
    FieldSpec::new("patient_name", 0x0140, 32),
];
/// Text bytes per patient field; the last byte is always a terminator
pub const PATIENT_TEXT_LEN: usize = 31;
pub const PATIENT_PAD: u8 = 0x00;

/// Candidate count fields, written only when `LayoutOptions` enables them.
pub const CHANNEL_COUNT_FIELD: FieldSpec = FieldSpec::new("channel_count", 0x0300, 2);
pub const SAMPLE_RATE_FIELD: FieldSpec = FieldSpec::new("sample_rate", 0x0302, 2);
pub const FRAME_COUNT_FIELD: FieldSpec = FieldSpec::new("frame_count", 0x0304, 4);

/// One calibration byte per channel, contiguous from here.
pub const CALIBRATION_OFFSET: usize = 0x0326;

pub fn calibration_field(channel: usize) -> FieldSpec {
    FieldSpec::new("calibration", CALIBRATION_OFFSET + channel, 1)
}

/// Patient and calibration ranges of a header with `channels` channels.
pub fn patch_targets(channels: usize) -> Vec<FieldSpec> {
    let mut fields = PATIENT_FIELDS.to_vec();
    fields.extend((0..channels).map(calibration_field));
    fields
}

/// Encodes a patient name into one patient field.
///
/// Non-ASCII characters are dropped, the text is cut at
/// [`PATIENT_TEXT_LEN`] bytes and the rest of the field is filled with
/// [`PATIENT_PAD`]. The flag reports whether anything was cut.
///
/// ```rust
/// use edf2wineeg::layout::{encode_patient, PATIENT_TEXT_LEN};
///
/// let (bytes, truncated) = encode_patient("Jane Doe");
/// assert_eq!(&bytes[..8], b"Jane Doe");
/// assert!(bytes[8..].iter().all(|&b| b == 0));
/// assert!(!truncated);
///
/// let (bytes, truncated) = encode_patient(&"X".repeat(40));
/// assert_eq!(bytes.iter().filter(|&&b| b == b'X').count(), PATIENT_TEXT_LEN);
/// assert!(truncated);
/// ```
pub fn encode_patient(name: &str) -> (Vec<u8>, bool) {
    let width = PATIENT_FIELDS[0].width;
    let ascii: Vec<u8> = name.bytes().filter(|b| b.is_ascii()).collect();
    let truncated = ascii.len() > PATIENT_TEXT_LEN;

    let mut field = vec![PATIENT_PAD; width];
    let len = ascii.len().min(PATIENT_TEXT_LEN);
    field[..len].copy_from_slice(&ascii[..len]);
    (field, truncated)
}

pub fn decode_patient(header: &[u8], field: FieldSpec) -> Option<String> {
    let bytes = header.get(field.range())?;
    let end = bytes.iter().position(|&b| b == PATIENT_PAD).unwrap_or(bytes.len());
    Some(String::from_utf8_lossy(&bytes[..end]).into_owned())
}

pub fn encode_u16(value: u16) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

pub fn encode_u32(value: u32) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

pub fn read_u16(header: &[u8], field: FieldSpec) -> Option<u16> {
    let bytes = header.get(field.range())?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

pub fn read_u32(header: &[u8], field: FieldSpec) -> Option<u32> {
    let bytes = header.get(field.range())?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub fn read_calibration(header: &[u8], channel: usize) -> Option<u8> {
    header.get(calibration_field(channel).offset).copied()
}

/// Number of frames covering `secs` at `rate`.
pub fn frames_for(secs: f64, rate: f64) -> usize {
    (secs * rate).round() as usize
}
