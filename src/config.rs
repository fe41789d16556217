//! Converter configuration
//!
//! Template file names, capacity thresholds and calibration policy are plain
//! data here, so tests can substitute fixtures without touching process state.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};
use crate::layout::{self, FieldSpec, CHANNEL_COUNT_FIELD, FRAME_COUNT_FIELD, HEADER_LEN, SAMPLE_RATE_FIELD};

/// Full converter configuration, loadable from JSON.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    pub catalog: TemplateCatalog,
    pub analyzer: AnalyzerConfig,
    pub layout: LayoutOptions,
    /// Fall back to the EDF header's patient name when the caller gives none
    pub patient_from_edf: bool,
}

/// Fixed lookup from template file to nominal capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateCatalog {
    /// Sample rate every catalog template was recorded at
    pub sample_rate: f64,
    /// Montage labels in on-disk channel order
    pub channel_labels: Vec<String>,
    pub templates: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub file: String,
    pub capacity_minutes: f64,
}

/// Calibration policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Starting calibration multiplier for every channel
    pub default_multiplier: u8,
    /// Peak code below this fraction of the code range is a weak signal
    pub weak_fraction: f64,
    /// Largest tolerated ratio between channel multipliers
    pub asymmetry_ratio: f64,
    /// Force one shared calibration for all channels
    pub uniform_calibration: bool,
}

/// Format options that vary between legacy installations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutOptions {
    /// Physical units (µV) per code at calibration byte 1
    pub calibration_unit: f64,
    /// Channels whose template codes and calibration byte are left alone
    pub marker_channels: Vec<usize>,
    /// Header offset of the u16 channel count; `None` keeps the template bytes
    pub channel_count_offset: Option<usize>,
    /// Header offset of the u16 sample rate; `None` keeps the template bytes
    pub sample_rate_offset: Option<usize>,
    /// Header offset of the u32 frame count; `None` keeps the template bytes
    pub frame_count_offset: Option<usize>,
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        TemplateCatalog {
            sample_rate: layout::DEFAULT_SAMPLE_RATE,
            channel_labels: layout::MONTAGE_10_20.iter().map(|s| s.to_string()).collect(),
            templates: vec![
                CatalogEntry {
                    file: "LB_EO_EEG.EEG".to_string(),
                    capacity_minutes: 12.0,
                },
                CatalogEntry {
                    file: "LB_EO_EEG_EXTENDED_30min.EEG".to_string(),
                    capacity_minutes: 30.0,
                },
            ],
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig {
            default_multiplier: 1,
            weak_fraction: 0.10,
            asymmetry_ratio: 4.0,
            uniform_calibration: false,
        }
    }
}

impl AnalyzerConfig {
    /// `default_multiplier`, never below 1 so every scale stays positive.
    pub fn start_multiplier(&self) -> u8 {
        self.default_multiplier.max(1)
    }
}

impl Default for LayoutOptions {
    fn default() -> Self {
        LayoutOptions {
            calibration_unit: 1.0,
            marker_channels: Vec::new(),
            channel_count_offset: None,
            sample_rate_offset: None,
            frame_count_offset: None,
        }
    }
}

impl LayoutOptions {
    /// Marker channels of the WinEEG lab templates (first and last channel).
    pub fn with_lab_markers() -> Self {
        LayoutOptions {
            marker_channels: vec![0, layout::CHANNEL_COUNT - 1],
            ..Self::default()
        }
    }

    /// Writes channel count, sample rate and frame count at 0x0300, 0x0302
    /// and 0x0304.
    ///
    /// These offsets have not been checked against files written by the
    /// viewer itself, so they stay off unless asked for.
    pub fn with_count_fields(self) -> Self {
        LayoutOptions {
            channel_count_offset: Some(CHANNEL_COUNT_FIELD.offset),
            sample_rate_offset: Some(SAMPLE_RATE_FIELD.offset),
            frame_count_offset: Some(FRAME_COUNT_FIELD.offset),
            ..self
        }
    }

    pub fn is_marker(&self, channel: usize) -> bool {
        self.marker_channels.contains(&channel)
    }

    pub fn channel_count_field(&self) -> Option<FieldSpec> {
        self.channel_count_offset
            .map(|offset| FieldSpec::new(CHANNEL_COUNT_FIELD.name, offset, CHANNEL_COUNT_FIELD.width))
    }

    pub fn sample_rate_field(&self) -> Option<FieldSpec> {
        self.sample_rate_offset
            .map(|offset| FieldSpec::new(SAMPLE_RATE_FIELD.name, offset, SAMPLE_RATE_FIELD.width))
    }

    pub fn frame_count_field(&self) -> Option<FieldSpec> {
        self.frame_count_offset
            .map(|offset| FieldSpec::new(FRAME_COUNT_FIELD.name, offset, FRAME_COUNT_FIELD.width))
    }

    /// The configured count fields.
    pub fn count_fields(&self) -> Vec<FieldSpec> {
        [self.channel_count_field(), self.sample_rate_field(), self.frame_count_field()]
            .into_iter()
            .flatten()
            .collect()
    }

    /// Every header range a conversion may write for `channels` channels.
    pub fn patch_targets(&self, channels: usize) -> Vec<FieldSpec> {
        let mut fields = layout::patch_targets(channels);
        fields.extend(self.count_fields());
        fields
    }
}

impl ConverterConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: ConverterConfig = serde_json::from_str(text)
            .map_err(|e| ConvertError::Config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(&path).map_err(|e| {
            ConvertError::Config(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ConvertError::Config(format!("cannot serialise configuration: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        let catalog = &self.catalog;
        if !(catalog.sample_rate.is_finite() && catalog.sample_rate > 0.0) {
            return Err(ConvertError::Config(format!("invalid sample rate {}", catalog.sample_rate)));
        }
        if catalog.channel_labels.is_empty() {
            return Err(ConvertError::Config("catalog has no channel labels".to_string()));
        }
        if let Some(entry) = catalog
            .templates
            .iter()
            .find(|e| !(e.capacity_minutes.is_finite() && e.capacity_minutes > 0.0))
        {
            return Err(ConvertError::Config(format!(
                "template '{}' has invalid capacity {}",
                entry.file, entry.capacity_minutes
            )));
        }

        let analyzer = &self.analyzer;
        if analyzer.default_multiplier == 0 {
            return Err(ConvertError::Config("default_multiplier must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&analyzer.weak_fraction) {
            return Err(ConvertError::Config(format!("weak_fraction {} outside 0..=1", analyzer.weak_fraction)));
        }
        if analyzer.asymmetry_ratio.is_nan() || analyzer.asymmetry_ratio < 1.0 {
            return Err(ConvertError::Config(format!("asymmetry_ratio {} below 1", analyzer.asymmetry_ratio)));
        }

        let layout = &self.layout;
        if !(layout.calibration_unit.is_finite() && layout.calibration_unit > 0.0) {
            return Err(ConvertError::Config(format!(
                "calibration_unit must be positive, got {}",
                layout.calibration_unit
            )));
        }
        if let Some(&ch) = layout
            .marker_channels
            .iter()
            .find(|&&ch| ch >= catalog.channel_labels.len())
        {
            return Err(ConvertError::Config(format!("marker channel {} out of range", ch)));
        }

        let fields = layout.patch_targets(catalog.channel_labels.len());
        if let Some(field) = fields.iter().find(|f| f.offset > HEADER_LEN || f.range().end > HEADER_LEN) {
            return Err(ConvertError::Config(format!(
                "{} field at {:#06x} lies outside the header",
                field.name, field.offset
            )));
        }
        for (i, a) in fields.iter().enumerate() {
            if let Some(b) = fields[i + 1..].iter().find(|b| a.offset < b.range().end && b.offset < a.range().end) {
                return Err(ConvertError::Config(format!(
                    "{} field at {:#06x} overlaps {} field at {:#06x}",
                    a.name, a.offset, b.name, b.offset
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_lab_catalog() {
        let config = ConverterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.catalog.templates.len(), 2);
        assert_eq!(config.catalog.templates[0].capacity_minutes, 12.0);
        assert_eq!(config.catalog.channel_labels.len(), 19);
        assert_eq!(config.catalog.sample_rate, 250.0);
        assert!(config.layout.count_fields().is_empty());
        assert!(!config.patient_from_edf);
    }

    #[test]
    fn test_count_fields_are_opt_in() {
        let layout = LayoutOptions::with_lab_markers().with_count_fields();
        assert_eq!(layout.marker_channels, vec![0, 18]);
        assert_eq!(layout.count_fields(), vec![CHANNEL_COUNT_FIELD, SAMPLE_RATE_FIELD, FRAME_COUNT_FIELD]);

        let config = ConverterConfig::from_json_str(r#"{ "layout": { "frame_count_offset": 1000 } }"#).unwrap();
        assert_eq!(config.layout.count_fields(), vec![FieldSpec::new("frame_count", 1000, 4)]);
    }

    #[test]
    fn test_rejects_misplaced_count_fields() {
        // past the header end
        assert!(ConverterConfig::from_json_str(r#"{ "layout": { "frame_count_offset": 1022 } }"#).is_err());
        // on top of the first patient field
        assert!(ConverterConfig::from_json_str(r#"{ "layout": { "sample_rate_offset": 128 } }"#).is_err());
        // on top of the calibration block
        assert!(ConverterConfig::from_json_str(r#"{ "layout": { "channel_count_offset": 806 } }"#).is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = ConverterConfig::from_json_str(
            r#"{ "analyzer": { "uniform_calibration": true }, "layout": { "marker_channels": [0, 18] } }"#,
        )
        .unwrap();
        assert!(config.analyzer.uniform_calibration);
        assert_eq!(config.analyzer.weak_fraction, 0.10);
        assert_eq!(config.layout.marker_channels, vec![0, 18]);
        assert_eq!(config.catalog, TemplateCatalog::default());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(ConverterConfig::from_json_str(r#"{ "layout": { "calibration_unit": 0.0 } }"#).is_err());
        assert!(ConverterConfig::from_json_str(r#"{ "layout": { "marker_channels": [19] } }"#).is_err());
        assert!(ConverterConfig::from_json_str(r#"{ "analyzer": { "default_multiplier": 0 } }"#).is_err());
        assert!(ConverterConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let config = ConverterConfig {
            layout: LayoutOptions::with_lab_markers().with_count_fields(),
            patient_from_edf: true,
            ..Default::default()
        };
        let text = config.to_json().unwrap();
        assert_eq!(ConverterConfig::from_json_str(&text).unwrap(), config);
    }
}
