use std::io;
use thiserror::Error;

/// Fatal conversion failures.
///
/// Anything returned through this type aborts the conversion before an
/// output buffer exists. Recoverable anomalies are reported as findings in
/// the [`ValidationReport`](crate::types::ValidationReport) instead.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid EDF file: {0}")]
    InvalidFormat(String),

    #[error("Invalid recording: {0}")]
    InvalidRecording(String),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Unsupported channel layout: {0}")]
    UnsupportedChannelLayout(String),

    #[error("Capacity exceeded: {requested:.1} s requested, {available:.1} s available")]
    CapacityExceeded { requested: f64, available: f64 },

    #[error("Template load failure ({name}): {reason}")]
    TemplateLoadFailure { name: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ConvertError {
    pub(crate) fn template(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ConvertError::TemplateLoadFailure {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;
