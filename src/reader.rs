use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{ConvertError, Result};
use crate::types::{ChannelInfo, DecodedRecording};
use crate::utils::{atof_nonlocalized, atoi_nonlocalized, is_integer_number, is_number, microvolt_factor};

const MAIN_HEADER_LEN: usize = 256;
const SIGNAL_HEADER_LEN: usize = 256;
const MAX_SIGNALS: i64 = 4096;
const ANNOTATION_LABEL: &str = "EDF Annotations";

/// Parameters of one signal as declared in the EDF header.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalParam {
    pub label: String,
    pub transducer: String,
    pub physical_dimension: String,
    pub physical_min: f64,
    pub physical_max: f64,
    pub digital_min: i32,
    pub digital_max: i32,
    pub prefilter: String,
    pub samples_per_record: usize,
}

impl SignalParam {
    /// Physical units per digital step
    pub fn bit_value(&self) -> f64 {
        (self.physical_max - self.physical_min) / (self.digital_max - self.digital_min) as f64
    }

    pub fn offset(&self) -> f64 {
        self.physical_max / self.bit_value() - self.digital_max as f64
    }

    pub fn to_physical(&self, digital_value: i32) -> f64 {
        self.bit_value() * (self.offset() + digital_value as f64)
    }

    pub fn is_annotation(&self) -> bool {
        self.label == ANNOTATION_LABEL
    }
}

/// Main header of an EDF or EDF+ file.
#[derive(Debug, Clone)]
pub struct EdfHeader {
    /// Patient name, empty when the file does not carry one
    pub patient_name: String,
    pub recording: String,
    pub start: Option<NaiveDateTime>,
    pub is_edfplus: bool,
    pub datarecords: usize,
    /// Seconds per data record
    pub datarecord_duration: f64,
    /// Every signal in file order, annotation signals included
    pub signals: Vec<SignalParam>,
}

impl EdfHeader {
    /// Signals carrying samples, in file order
    pub fn data_signals(&self) -> impl Iterator<Item = &SignalParam> {
        self.signals.iter().filter(|s| !s.is_annotation())
    }

    pub fn file_duration(&self) -> f64 {
        self.datarecords as f64 * self.datarecord_duration
    }
}

/// Reads EDF and EDF+ files into a [`DecodedRecording`].
///
/// Annotation signals are skipped. Samples are converted with the EDF
/// linear mapping and brought to microvolts from the declared dimension.
///
/// # Examples
///
/// ```rust
/// use edf2wineeg::EdfReader;
///
/// # let path = std::env::temp_dir().join("edf2wineeg_reader_doc.edf");
/// # edf2wineeg::doctest_utils::create_test_edf(&path, 256, 2)?;
/// let reader = EdfReader::open(&path)?;
/// assert_eq!(reader.header().data_signals().count(), 19);
///
/// let recording = reader.into_recording()?;
/// assert_eq!(recording.sample_rate(), 256.0);
/// assert_eq!(recording.sample_count(), 512);
/// # std::fs::remove_file(&path).ok();
/// # Ok::<(), edf2wineeg::ConvertError>(())
/// ```
pub struct EdfReader {
    file: BufReader<File>,
    header: EdfHeader,
    header_size: usize,
    record_size: usize,
}

impl EdfReader {
    /// Opens a file and parses its header.
    ///
    /// # Errors
    ///
    /// * `ConvertError::Io` - the file cannot be opened or read
    /// * `ConvertError::InvalidFormat` - the header is not a valid EDF header
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path).map_err(|e| {
            ConvertError::Io(std::io::Error::new(e.kind(), format!("{}: {}", path.as_ref().display(), e)))
        })?;
        let file_len = file.metadata()?.len() as usize;
        let mut reader = BufReader::new(file);

        let (header, header_size, record_size) = Self::parse_header(&mut reader, file_len)?;
        log::info!(
            "Opened {} ({} signals, {} records of {} s)",
            path.as_ref().display(),
            header.signals.len(),
            header.datarecords,
            header.datarecord_duration
        );

        Ok(EdfReader { file: reader, header, header_size, record_size })
    }

    pub fn header(&self) -> &EdfHeader {
        &self.header
    }

    /// Decodes every data record.
    ///
    /// # Errors
    ///
    /// * `ConvertError::InvalidFormat` - the file holds no data signals or is truncated
    /// * `ConvertError::InvalidRecording` - data signals differ in sample rate
    pub fn read_recording(&mut self) -> Result<DecodedRecording> {
        let mut offsets = Vec::new();
        let mut offset = 0;
        for signal in &self.header.signals {
            offsets.push(offset);
            offset += signal.samples_per_record * 2;
        }

        let data: Vec<(usize, &SignalParam)> = offsets
            .into_iter()
            .zip(&self.header.signals)
            .filter(|(_, s)| !s.is_annotation())
            .collect();
        if data.is_empty() {
            return Err(ConvertError::InvalidFormat("file holds no data signals".to_string()));
        }

        let duration = self.header.datarecord_duration;
        let channels: Vec<ChannelInfo> = data
            .iter()
            .map(|(_, s)| ChannelInfo::new(&s.label, s.samples_per_record as f64 / duration))
            .collect();
        if let Some(ch) = channels.iter().find(|c| c.sample_rate != channels[0].sample_rate) {
            return Err(ConvertError::InvalidRecording(format!(
                "signal '{}' sampled at {} Hz, '{}' at {} Hz",
                ch.label, ch.sample_rate, channels[0].label, channels[0].sample_rate
            )));
        }

        let records = self.header.datarecords;
        let mut samples: Vec<Vec<f64>> = data
            .iter()
            .map(|(_, s)| Vec::with_capacity(s.samples_per_record * records))
            .collect();

        self.file.seek(SeekFrom::Start(self.header_size as u64))?;
        let mut record = vec![0u8; self.record_size];
        for r in 0..records {
            self.file.read_exact(&mut record).map_err(|e| {
                ConvertError::InvalidFormat(format!("data record {} of {} unreadable: {}", r, records, e))
            })?;
            for ((start, signal), row) in data.iter().zip(samples.iter_mut()) {
                let factor = microvolt_factor(&signal.physical_dimension);
                let bytes = &record[*start..*start + signal.samples_per_record * 2];
                row.extend(
                    bytes
                        .chunks_exact(2)
                        .map(|b| signal.to_physical(i16::from_le_bytes([b[0], b[1]]) as i32) * factor),
                );
            }
        }

        log::debug!("Decoded {} records from {} data signals", records, data.len());
        DecodedRecording::new(channels, samples)
    }

    pub fn into_recording(mut self) -> Result<DecodedRecording> {
        self.read_recording()
    }

    fn parse_header(reader: &mut BufReader<File>, file_len: usize) -> Result<(EdfHeader, usize, usize)> {
        reader.seek(SeekFrom::Start(0))?;
        let mut main_header = vec![0u8; MAIN_HEADER_LEN];
        reader
            .read_exact(&mut main_header)
            .map_err(|_| ConvertError::InvalidFormat("file shorter than an EDF header".to_string()))?;
        let text = |range: std::ops::Range<usize>| String::from_utf8_lossy(&main_header[range]).into_owned();

        let version = text(0..8);
        if version.trim() != "0" {
            return Err(ConvertError::InvalidFormat(format!("not an EDF file (version '{}')", version.trim())));
        }

        let signals_str = text(252..256);
        let signal_count = atoi_nonlocalized(&signals_str);
        if !is_integer_number(&signals_str) || signal_count < 1 || signal_count > MAX_SIGNALS {
            return Err(ConvertError::InvalidFormat(format!("invalid signal count '{}'", signals_str.trim())));
        }
        let signal_count = signal_count as usize;

        let header_size = MAIN_HEADER_LEN + signal_count * SIGNAL_HEADER_LEN;
        if atoi_nonlocalized(&text(184..192)) != header_size as i64 {
            return Err(ConvertError::InvalidFormat(format!(
                "header size field '{}' does not match {} signals",
                text(184..192).trim(),
                signal_count
            )));
        }

        let reserved = text(192..236);
        let is_edfplus = reserved.starts_with("EDF+");
        if reserved.starts_with("EDF+D") {
            log::warn!("Discontinuous EDF+ file; records are read back to back");
        }

        let duration_str = text(244..252);
        let datarecord_duration = atof_nonlocalized(&duration_str);
        if !is_number(&duration_str) || datarecord_duration <= 0.0 {
            return Err(ConvertError::InvalidFormat(format!(
                "invalid data record duration '{}'",
                duration_str.trim()
            )));
        }

        let mut signal_header = vec![0u8; signal_count * SIGNAL_HEADER_LEN];
        reader
            .read_exact(&mut signal_header)
            .map_err(|_| ConvertError::InvalidFormat("signal headers truncated".to_string()))?;
        let signals = Self::parse_signals(&signal_header, signal_count)?;
        let record_size: usize = signals.iter().map(|s| s.samples_per_record * 2).sum();

        let available = file_len.saturating_sub(header_size) / record_size;
        let datarecords = match atoi_nonlocalized(&text(236..244)) {
            n if n < 0 => available,
            n if n as usize > available => {
                return Err(ConvertError::InvalidFormat(format!(
                    "header declares {} data records, file holds {}",
                    n, available
                )));
            }
            n => n as usize,
        };

        let header = EdfHeader {
            patient_name: Self::parse_patient_name(&text(8..88), is_edfplus),
            recording: text(88..168).trim().to_string(),
            start: Self::parse_start(&text(168..176), &text(176..184)),
            is_edfplus,
            datarecords,
            datarecord_duration,
            signals,
        };
        Ok((header, header_size, record_size))
    }

    fn parse_signals(signal_header: &[u8], count: usize) -> Result<Vec<SignalParam>> {
        // fields are stored as arrays: every label, then every transducer, ...
        let field = |start: usize, width: usize, i: usize| {
            let at = count * start + i * width;
            String::from_utf8_lossy(&signal_header[at..at + width]).trim().to_string()
        };
        let number = |start: usize, i: usize, name: &str| -> Result<f64> {
            let s = field(start, 8, i);
            if !is_number(&s) {
                return Err(ConvertError::InvalidFormat(format!("signal {} has invalid {} '{}'", i, name, s)));
            }
            Ok(atof_nonlocalized(&s))
        };
        let integer = |start: usize, i: usize, name: &str| -> Result<i64> {
            let s = field(start, 8, i);
            if !is_integer_number(&s) {
                return Err(ConvertError::InvalidFormat(format!("signal {} has invalid {} '{}'", i, name, s)));
            }
            Ok(atoi_nonlocalized(&s))
        };

        let mut signals = Vec::with_capacity(count);
        for i in 0..count {
            let label = field(0, 16, i);
            let samples_per_record = integer(216, i, "samples per record")?;
            if samples_per_record < 1 {
                return Err(ConvertError::InvalidFormat(format!("signal '{}' has no samples per record", label)));
            }

            let signal = SignalParam {
                transducer: field(16, 80, i),
                physical_dimension: field(96, 8, i),
                physical_min: number(104, i, "physical minimum")?,
                physical_max: number(112, i, "physical maximum")?,
                digital_min: integer(120, i, "digital minimum")? as i32,
                digital_max: integer(128, i, "digital maximum")? as i32,
                prefilter: field(136, 80, i),
                samples_per_record: samples_per_record as usize,
                label,
            };

            if !signal.is_annotation() {
                if signal.physical_min == signal.physical_max {
                    return Err(ConvertError::InvalidFormat(format!(
                        "signal '{}' has equal physical minimum and maximum",
                        signal.label
                    )));
                }
                if signal.digital_min >= signal.digital_max {
                    return Err(ConvertError::InvalidFormat(format!(
                        "signal '{}' has digital minimum {} not below maximum {}",
                        signal.label, signal.digital_min, signal.digital_max
                    )));
                }
            }
            signals.push(signal);
        }
        Ok(signals)
    }

    /// Start date `dd.mm.yy` and time `hh.mm.ss`; years before 85 are 20xx.
    fn parse_start(date_str: &str, time_str: &str) -> Option<NaiveDateTime> {
        let parts = |s: &str| -> Option<[i64; 3]> {
            let v: Vec<i64> = s.trim().split('.').map(atoi_nonlocalized).collect();
            v.try_into().ok()
        };
        let [day, month, yy] = parts(date_str)?;
        let [hour, minute, second] = parts(time_str)?;
        let year = if yy > 84 { 1900 + yy } else { 2000 + yy };

        let date = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)?;
        let time = NaiveTime::from_hms_opt(hour as u32, minute as u32, second as u32)?;
        Some(NaiveDateTime::new(date, time))
    }

    /// EDF+ patient fields read `code sex birthdate name ...` with `_` for spaces
    /// and `X` for unknown subfields.
    fn parse_patient_name(field: &str, is_edfplus: bool) -> String {
        let field = field.trim();
        if !is_edfplus {
            return field.to_string();
        }
        match field.split_whitespace().nth(3) {
            Some("X") | None => String::new(),
            Some(name) => name.replace('_', " "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doctest_utils::{edf_file_bytes, EdfFixture};
    use std::fs;
    use std::path::PathBuf;

    fn temp_file(name: &str, bytes: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("edf2wineeg_reader_{}_{}", std::process::id(), name));
        fs::write(&path, bytes).unwrap();
        path
    }

    fn two_channel(unit: &str) -> EdfFixture {
        EdfFixture {
            labels: vec!["EEG Fp1-REF".to_string(), "EEG Fp2-REF".to_string()],
            unit: unit.to_string(),
            samples_per_record: 4,
            records: 3,
            annotations: false,
            edfplus: true,
        }
    }

    #[test]
    fn test_decodes_physical_values_in_order() {
        let fixture = two_channel("uV");
        let path = temp_file("order.edf", &edf_file_bytes(&fixture, |ch, i| (ch * 100 + i) as i16));
        let recording = EdfReader::open(&path).unwrap().into_recording().unwrap();

        assert_eq!(recording.channel_count(), 2);
        assert_eq!(recording.sample_count(), 12);
        assert_eq!(recording.sample_rate(), 4.0);
        assert_eq!(recording.samples()[0][5], 5.0);
        assert_eq!(recording.samples()[1][11], 111.0);
        assert_eq!(recording.labels()[1], "EEG Fp2-REF");
        fs::remove_file(path).ok();
    }

    #[test]
    fn test_skips_annotation_signal() {
        let fixture = EdfFixture { annotations: true, ..two_channel("uV") };
        let path = temp_file("annot.edf", &edf_file_bytes(&fixture, |_, i| i as i16));
        let reader = EdfReader::open(&path).unwrap();
        assert_eq!(reader.header().signals.len(), 3);
        assert_eq!(reader.header().data_signals().count(), 2);

        let recording = reader.into_recording().unwrap();
        assert_eq!(recording.channel_count(), 2);
        assert_eq!(recording.samples()[1][7], 7.0);
        fs::remove_file(path).ok();
    }

    #[test]
    fn test_millivolts_scale_to_microvolts() {
        let fixture = two_channel("mV");
        let path = temp_file("mv.edf", &edf_file_bytes(&fixture, |_, _| 1500));
        let recording = EdfReader::open(&path).unwrap().into_recording().unwrap();
        // fixture maps digital codes 1:1 onto the declared dimension
        assert!((recording.samples()[0][0] - 1_500_000.0).abs() < 1e-6);
        fs::remove_file(path).ok();
    }

    #[test]
    fn test_plain_edf_header_fields() {
        let fixture = EdfFixture { edfplus: false, ..two_channel("uV") };
        let path = temp_file("plain.edf", &edf_file_bytes(&fixture, |_, _| 0));
        let reader = EdfReader::open(&path).unwrap();
        let header = reader.header();
        assert!(!header.is_edfplus);
        assert_eq!(header.patient_name, "Test Patient");
        assert_eq!(header.datarecords, 3);
        assert_eq!(header.file_duration(), 3.0);
        assert_eq!(
            header.start,
            NaiveDate::from_ymd_opt(2024, 3, 1).and_then(|d| d.and_hms_opt(9, 30, 0))
        );
        fs::remove_file(path).ok();
    }

    #[test]
    fn test_edfplus_patient_subfield() {
        assert_eq!(EdfReader::parse_patient_name("P01 M 01-JAN-1990 Jane_Doe", true), "Jane Doe");
        assert_eq!(EdfReader::parse_patient_name("X X X X", true), "");
        assert_eq!(EdfReader::parse_patient_name("  Jane Doe  ", false), "Jane Doe");
    }

    #[test]
    fn test_rejects_bad_version_and_truncation() {
        let mut bytes = edf_file_bytes(&two_channel("uV"), |_, _| 0);
        bytes[0] = b'9';
        let path = temp_file("version.edf", &bytes);
        assert!(matches!(EdfReader::open(&path), Err(ConvertError::InvalidFormat(_))));
        fs::remove_file(path).ok();

        let mut bytes = edf_file_bytes(&two_channel("uV"), |_, _| 0);
        bytes.truncate(bytes.len() - 10);
        let path = temp_file("short.edf", &bytes);
        assert!(matches!(EdfReader::open(&path), Err(ConvertError::InvalidFormat(_))));
        fs::remove_file(path).ok();

        let path = temp_file("tiny.edf", b"0       ");
        assert!(matches!(EdfReader::open(&path), Err(ConvertError::InvalidFormat(_))));
        fs::remove_file(path).ok();
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let path = std::env::temp_dir().join("edf2wineeg_reader_does_not_exist.edf");
        assert!(matches!(EdfReader::open(path), Err(ConvertError::Io(_))));
    }
}
