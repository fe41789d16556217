//! # EDF to WinEEG converter
//!
//! Converts EDF/EDF+ recordings into the legacy WinEEG `.EEG` format by
//! grafting re-encoded samples into a pre-built template file. Header, lead-in
//! and lead-out bytes of the template are kept, so the legacy viewer accepts
//! the result without knowing how it was produced.
//!
//! The pipeline:
//!
//! 1. pick the smallest [`Template`] whose capacity covers the recording
//! 2. map input channels onto the template montage ([`montage`])
//! 3. resample to the template rate and choose a per-channel calibration ([`calibration`])
//! 4. quantize samples to 16-bit codes ([`encoder`])
//! 5. patch the header fields ([`patcher`]) and graft frames into the body ([`grafter`])
//! 6. read the header back and cross-check it ([`validation`])
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use edf2wineeg::{Converter, ConverterConfig, TemplateRepository, Result};
//! # use edf2wineeg::doctest_utils::{create_test_edf, synthetic_template};
//!
//! fn main() -> Result<()> {
//!     # let dir = std::env::temp_dir();
//!     # let input = dir.join("edf2wineeg_quickstart.edf");
//!     # let output = dir.join("edf2wineeg_quickstart.EEG");
//!     # create_test_edf(&input, 256, 20)?;
//!     // Real installations load the lab templates with
//!     // `Converter::from_template_dir(dir, ConverterConfig::default())`
//!     let templates = TemplateRepository::new(vec![synthetic_template("LB_EO_EEG.EEG", 250.0, 1.0)?]);
//!     let converter = Converter::new(Arc::new(templates), ConverterConfig::default())?;
//!
//!     let (path, report) = converter.convert(&input, &output, Some("Jane Doe"))?;
//!     for finding in &report.findings {
//!         println!("{}", finding);
//!     }
//!     assert!(report.passed());
//!     # std::fs::remove_file(&input).ok();
//!     # std::fs::remove_file(&path).ok();
//!     Ok(())
//! }
//! ```

pub mod calibration;
pub mod config;
pub mod converter;
pub mod encoder;
pub mod error;
pub mod grafter;
pub mod layout;
pub mod montage;
pub mod patcher;
pub mod reader;
pub mod template;
pub mod types;
pub mod utils;
pub mod validation;

#[doc(hidden)]
pub mod doctest_utils; // For internal doctest support

// Re-export main types for convenience
pub use config::{AnalyzerConfig, ConverterConfig, LayoutOptions, TemplateCatalog};
pub use converter::{Conversion, Converter};
pub use error::{ConvertError, Result};
pub use reader::{EdfHeader, EdfReader, SignalParam};
pub use template::{Template, TemplateRepository};
pub use types::{
    CalibrationEntry, CalibrationTable, ChannelInfo, DecodedRecording, EncodedSamples, Finding, FindingCode,
    Severity, ValidationReport,
};

/// Library version
///
/// # Examples
///
/// ```rust
/// let version = edf2wineeg::version();
/// assert!(version.contains('.'));
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
