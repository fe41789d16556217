use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::calibration;
use crate::config::ConverterConfig;
use crate::encoder;
use crate::error::Result;
use crate::grafter::{self, OutputBuffer};
use crate::montage;
use crate::patcher::{self, PatchMetadata};
use crate::reader::EdfReader;
use crate::template::TemplateRepository;
use crate::types::{DecodedRecording, Finding, FindingCode, Severity, ValidationReport};
use crate::validation::{self, InputMetadata};

/// Result of one in-memory conversion.
#[derive(Debug, Clone)]
pub struct Conversion {
    /// Complete legacy file, same length as the template it came from
    pub bytes: Vec<u8>,
    pub report: ValidationReport,
    pub template_name: String,
}

/// Runs the conversion pipeline against a shared template repository.
///
/// A `Converter` holds no per-conversion state, so one instance can serve
/// any number of threads.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use edf2wineeg::doctest_utils::{integer_wave, synthetic_recording, synthetic_template};
/// use edf2wineeg::{Converter, ConverterConfig, TemplateRepository};
///
/// let repo = TemplateRepository::new(vec![synthetic_template("short.EEG", 250.0, 1.0)?]);
/// let converter = Converter::new(Arc::new(repo), ConverterConfig::default())?;
///
/// let recording = synthetic_recording(250.0, 30.0, integer_wave)?;
/// let conversion = converter.convert_recording(&recording, Some("Jane Doe"))?;
/// assert_eq!(conversion.template_name, "short.EEG");
/// assert!(conversion.report.passed());
/// # Ok::<(), edf2wineeg::ConvertError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Converter {
    templates: Arc<TemplateRepository>,
    config: ConverterConfig,
}

impl Converter {
    /// Builds a converter over an already loaded repository.
    ///
    /// # Errors
    ///
    /// * `ConvertError::Config` - `config` fails [`ConverterConfig::validate`]
    pub fn new(templates: Arc<TemplateRepository>, config: ConverterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Converter { templates, config })
    }

    /// Loads the configured template catalog from `dir`.
    pub fn from_template_dir<P: AsRef<Path>>(dir: P, config: ConverterConfig) -> Result<Self> {
        config.validate()?;
        let templates = TemplateRepository::from_catalog(dir, &config.catalog)?;
        Ok(Converter { templates: Arc::new(templates), config })
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    pub fn templates(&self) -> &Arc<TemplateRepository> {
        &self.templates
    }

    /// Converts a decoded recording into legacy file bytes.
    ///
    /// The output buffer is private to this call, so a fatal error leaves
    /// nothing behind. Findings appear in pipeline order followed by the
    /// validation checks and the summary.
    ///
    /// # Errors
    ///
    /// * `ConvertError::InvalidDuration` - the recording is empty
    /// * `ConvertError::CapacityExceeded` - no template holds the recording
    /// * `ConvertError::UnsupportedChannelLayout` - channels cannot be mapped onto the template
    pub fn convert_recording(&self, recording: &DecodedRecording, patient: Option<&str>) -> Result<Conversion> {
        let template = self.templates.select(recording.duration_secs())?;
        let mut report = ValidationReport::new();

        let mapping = montage::map_channels(&recording.labels(), template.channel_labels())?;
        report.extend(mapping.finding.clone());
        let mapped = montage::apply(recording.clone(), &mapping)?;

        let source_rate = mapped.sample_rate();
        let resampled = encoder::resample(mapped, template.sample_rate())?;
        if source_rate != resampled.sample_rate() {
            report.push(Finding::new(
                Severity::Info,
                FindingCode::Resampled,
                format!("resampled from {} Hz to {} Hz", source_rate, resampled.sample_rate()),
            ));
        }

        let (table, analysis) = calibration::analyze(&resampled, &self.config.analyzer, &self.config.layout);
        report.extend(analysis.findings);

        let encoded = encoder::encode(&resampled, &table)?;
        report.extend(encoded.clip_findings());

        let frames = encoded.frame_count();
        let meta = PatchMetadata {
            patient: patient.map(str::to_string),
            channel_count: resampled.channel_count(),
            sample_rate: resampled.sample_rate(),
            frame_count: frames,
        };

        let mut buffer = OutputBuffer::from_template(&template, &self.config.layout);
        report.extend(patcher::patch(&mut buffer, &meta, &table)?);
        let written = grafter::graft(&mut buffer, &encoded)?;

        let input = InputMetadata {
            sample_rate: resampled.sample_rate(),
            channel_count: resampled.channel_count(),
            duration_secs: resampled.duration_secs(),
        };
        report.extend(validation::validate(&input, &buffer, &table).findings);

        log::info!(
            "Converted {:.1} s into {} ({} of {} body bytes, {})",
            input.duration_secs,
            template.name(),
            written,
            buffer.regions().body.len,
            if report.passed() { "PASS" } else { "FAIL" }
        );
        Ok(Conversion {
            bytes: buffer.into_bytes(),
            report,
            template_name: template.name().to_string(),
        })
    }

    /// Converts an EDF file and writes the legacy file to `output`.
    ///
    /// Without an explicit `patient` the template's patient fields are kept,
    /// unless `patient_from_edf` is set and the EDF header names one.
    /// Nothing is written when the conversion fails.
    pub fn convert<P, Q>(&self, input: P, output: Q, patient: Option<&str>) -> Result<(PathBuf, ValidationReport)>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let reader = EdfReader::open(&input)?;
        let header_patient = reader.header().patient_name.clone();
        let recording = reader.into_recording()?;

        let fallback = Some(header_patient.as_str()).filter(|name| self.config.patient_from_edf && !name.is_empty());
        let patient = patient.or(fallback);
        let conversion = self.convert_recording(&recording, patient)?;

        let output = output.as_ref().to_path_buf();
        fs::write(&output, &conversion.bytes)?;
        log::info!("Wrote {} ({} bytes)", output.display(), conversion.bytes.len());
        Ok((output, conversion.report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutOptions;
    use crate::doctest_utils::{integer_wave, synthetic_recording, synthetic_template};
    use crate::error::ConvertError;
    use crate::layout;
    use crate::types::ChannelInfo;

    fn converter(config: ConverterConfig) -> Converter {
        let repo = TemplateRepository::new(vec![
            synthetic_template("small.EEG", 50.0, 1.0).unwrap(),
            synthetic_template("large.EEG", 50.0, 3.0).unwrap(),
        ]);
        Converter::new(Arc::new(repo), config).unwrap()
    }

    #[test]
    fn test_picks_template_by_duration() {
        let c = converter(ConverterConfig::default());
        let short = synthetic_recording(50.0, 45.0, integer_wave).unwrap();
        let long = synthetic_recording(50.0, 90.0, integer_wave).unwrap();
        assert_eq!(c.convert_recording(&short, None).unwrap().template_name, "small.EEG");
        assert_eq!(c.convert_recording(&long, None).unwrap().template_name, "large.EEG");

        let too_long = synthetic_recording(50.0, 200.0, integer_wave).unwrap();
        assert!(matches!(
            c.convert_recording(&too_long, None),
            Err(ConvertError::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn test_findings_follow_pipeline_order() {
        let c = converter(ConverterConfig::default());
        // reversed channel order at a foreign rate, one silent channel
        let labels: Vec<&str> = layout::MONTAGE_10_20.iter().rev().copied().collect();
        let channels = labels.iter().map(|l| ChannelInfo::new(l, 100.0)).collect();
        let samples = (0..19)
            .map(|ch| (0..3000).map(|i| if ch == 5 { 0.0 } else { integer_wave(ch, i) }).collect())
            .collect();
        let recording = DecodedRecording::new(channels, samples).unwrap();

        let report = c.convert_recording(&recording, Some(&"N".repeat(40))).unwrap().report;
        let position = |code| report.findings.iter().position(|f| f.code == code).unwrap();
        assert!(position(FindingCode::ChannelsReordered) < position(FindingCode::Resampled));
        assert!(position(FindingCode::Resampled) < position(FindingCode::DegenerateChannel));
        assert!(position(FindingCode::DegenerateChannel) < position(FindingCode::FieldOverflow));
        assert!(position(FindingCode::FieldOverflow) < position(FindingCode::Pass));
        assert_eq!(report.findings.last().unwrap().code, FindingCode::Pass);
    }

    #[test]
    fn test_marker_channels_pass_validation() {
        let config = ConverterConfig { layout: LayoutOptions::with_lab_markers(), ..Default::default() };
        let c = converter(config);
        let recording = synthetic_recording(50.0, 20.0, integer_wave).unwrap();
        assert!(c.convert_recording(&recording, None).unwrap().report.passed());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let repo = Arc::new(TemplateRepository::new(vec![synthetic_template("small.EEG", 50.0, 1.0).unwrap()]));
        let mut config = ConverterConfig::default();
        config.analyzer.default_multiplier = 0;
        assert!(matches!(Converter::new(repo.clone(), config), Err(ConvertError::Config(_))));

        let mut config = ConverterConfig::default();
        config.layout.calibration_unit = f64::NAN;
        assert!(matches!(Converter::new(repo, config), Err(ConvertError::Config(_))));
    }

    #[test]
    fn test_layout_error_is_fatal() {
        let c = converter(ConverterConfig::default());
        let channels = vec![ChannelInfo::new("Fp1", 50.0), ChannelInfo::new("Fp2", 50.0)];
        let recording = DecodedRecording::new(channels, vec![vec![0.0; 100]; 2]).unwrap();
        assert!(matches!(
            c.convert_recording(&recording, None),
            Err(ConvertError::UnsupportedChannelLayout(_))
        ));
    }
}
