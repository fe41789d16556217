// Internal fixtures for documentation and integration tests.
// Real lab templates are proprietary, so tests build byte-patterned stand-ins.

use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::layout::{self, HEADER_LEN, MONTAGE_10_20, PATIENT_FIELDS, TRAILER_LEN};
use crate::template::Template;
use crate::types::{ChannelInfo, DecodedRecording};

/// Placeholder text found in the patient fields of synthetic templates
pub const TEMPLATE_PATIENT: &str = "TEMPLATE PATIENT";
/// Calibration byte every synthetic template ships with
pub const TEMPLATE_CALIBRATION: u8 = 5;

pub fn montage_labels() -> Vec<String> {
    MONTAGE_10_20.iter().map(|s| s.to_string()).collect()
}

/// Template code stored for `channel` in data frame `frame`.
pub fn template_code(frame: usize, channel: usize) -> i16 {
    ((frame * 31 + channel * 17) % 2001) as i16 - 1000
}

/// Builds a 19-channel template holding exactly `capacity_minutes` at `sample_rate`.
///
/// Header bytes follow a fixed byte pattern with the patient placeholder and
/// calibration bytes filled in, every data frame carries [`template_code`]
/// and the trailer is a run of `0xEE`.
pub fn synthetic_template(name: &str, sample_rate: f64, capacity_minutes: f64) -> Result<Template> {
    let channels = MONTAGE_10_20.len();
    let head = layout::frames_for(layout::LEAD_IN_SECS, sample_rate);
    let tail = layout::frames_for(layout::LEAD_OUT_SECS, sample_rate);
    let body = (capacity_minutes * 60.0 * sample_rate).ceil() as usize;
    let frames = head + body + tail;

    let mut bytes = Vec::with_capacity(HEADER_LEN + frames * channels * 2 + TRAILER_LEN);
    bytes.extend((0..HEADER_LEN).map(|i| (i * 7 + 3) as u8));
    for field in PATIENT_FIELDS {
        let (text, _) = layout::encode_patient(TEMPLATE_PATIENT);
        bytes[field.range()].copy_from_slice(&text);
    }
    for ch in 0..channels {
        bytes[layout::calibration_field(ch).offset] = TEMPLATE_CALIBRATION;
    }

    for frame in 0..frames {
        for ch in 0..channels {
            bytes.extend_from_slice(&template_code(frame, ch).to_le_bytes());
        }
    }
    bytes.extend(std::iter::repeat(0xEE).take(TRAILER_LEN));

    Template::from_bytes(name, bytes, sample_rate, montage_labels(), capacity_minutes * 60.0)
}

/// Builds a 19-channel montage recording of `seconds` at `sample_rate`.
pub fn synthetic_recording<F>(sample_rate: f64, seconds: f64, signal: F) -> Result<DecodedRecording>
where
    F: Fn(usize, usize) -> f64,
{
    let count = (seconds * sample_rate).round() as usize;
    let channels = MONTAGE_10_20
        .iter()
        .map(|label| ChannelInfo::new(label, sample_rate))
        .collect();
    let samples = (0..MONTAGE_10_20.len())
        .map(|ch| (0..count).map(|i| signal(ch, i)).collect())
        .collect();
    DecodedRecording::new(channels, samples)
}

/// Integer-valued test signal in [-50, 50] µV.
pub fn integer_wave(channel: usize, index: usize) -> f64 {
    (((index + channel * 7) % 101) as f64) - 50.0
}

/// Shape of a generated EDF file.
#[derive(Debug, Clone)]
pub struct EdfFixture {
    pub labels: Vec<String>,
    pub unit: String,
    /// One-second data records, so this is also the sample rate
    pub samples_per_record: usize,
    pub records: usize,
    /// Append an `EDF Annotations` signal after the data signals
    pub annotations: bool,
    pub edfplus: bool,
}

const ANNOTATION_SAMPLES: usize = 8;

fn put(buf: &mut Vec<u8>, text: &str, width: usize) {
    let mut field: Vec<u8> = text.bytes().take(width).collect();
    field.resize(width, b' ');
    buf.extend_from_slice(&field);
}

/// Serialises an EDF file whose digital codes come from `digital(channel, sample)`.
///
/// Physical and digital ranges are both -32768..=32767, so decoded values
/// equal the codes in the declared unit.
pub fn edf_file_bytes<F>(fixture: &EdfFixture, digital: F) -> Vec<u8>
where
    F: Fn(usize, usize) -> i16,
{
    let mut per_record: Vec<usize> = vec![fixture.samples_per_record; fixture.labels.len()];
    let mut labels = fixture.labels.clone();
    if fixture.annotations {
        labels.push("EDF Annotations".to_string());
        per_record.push(ANNOTATION_SAMPLES);
    }
    let n = labels.len();

    let mut bytes = Vec::new();
    put(&mut bytes, "0", 8);
    if fixture.edfplus {
        put(&mut bytes, "P001 X X Test_Patient", 80);
        put(&mut bytes, "Startdate 01-MAR-2024 X X X", 80);
    } else {
        put(&mut bytes, "Test Patient", 80);
        put(&mut bytes, "Lab recording", 80);
    }
    put(&mut bytes, "01.03.24", 8);
    put(&mut bytes, "09.30.00", 8);
    put(&mut bytes, &((n + 1) * 256).to_string(), 8);
    put(&mut bytes, if fixture.edfplus { "EDF+C" } else { "" }, 44);
    put(&mut bytes, &fixture.records.to_string(), 8);
    put(&mut bytes, "1", 8);
    put(&mut bytes, &n.to_string(), 4);

    let annotation = |i: usize| i + 1 == n && fixture.annotations;
    for label in &labels {
        put(&mut bytes, label, 16);
    }
    for _ in 0..n {
        put(&mut bytes, "AgAgCl electrode", 80);
    }
    for i in 0..n {
        put(&mut bytes, if annotation(i) { "" } else { fixture.unit.as_str() }, 8);
    }
    for field in ["-32768", "32767", "-32768", "32767"] {
        for _ in 0..n {
            put(&mut bytes, field, 8);
        }
    }
    for _ in 0..n {
        put(&mut bytes, "HP:0.5Hz LP:70Hz", 80);
    }
    for count in &per_record {
        put(&mut bytes, &count.to_string(), 8);
    }
    for _ in 0..n {
        put(&mut bytes, "", 32);
    }

    let spr = fixture.samples_per_record;
    for record in 0..fixture.records {
        for ch in 0..fixture.labels.len() {
            for i in 0..spr {
                bytes.extend_from_slice(&digital(ch, record * spr + i).to_le_bytes());
            }
        }
        if fixture.annotations {
            let mut tal = format!("+{}\u{14}\u{14}", record).into_bytes();
            tal.resize(ANNOTATION_SAMPLES * 2, 0);
            bytes.extend_from_slice(&tal);
        }
    }
    bytes
}

/// Writes a 19-channel EDF+ file of `seconds` at `sample_rate` carrying [`integer_wave`] in µV.
pub fn create_test_edf<P: AsRef<Path>>(path: P, sample_rate: usize, seconds: usize) -> Result<()> {
    let fixture = EdfFixture {
        labels: MONTAGE_10_20.iter().map(|l| format!("EEG {}-REF", l)).collect(),
        unit: "uV".to_string(),
        samples_per_record: sample_rate,
        records: seconds,
        annotations: true,
        edfplus: true,
    };
    let bytes = edf_file_bytes(&fixture, |ch, i| integer_wave(ch, i) as i16);
    fs::write(path, bytes)?;
    Ok(())
}
