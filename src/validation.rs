use crate::grafter::OutputBuffer;
use crate::layout;
use crate::types::{CalibrationTable, Finding, FindingCode, Severity, ValidationReport};

/// What the converted recording looked like once it reached the template rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputMetadata {
    pub sample_rate: f64,
    pub channel_count: usize,
    pub duration_secs: f64,
}

fn failed(message: String) -> Finding {
    Finding::new(Severity::Error, FindingCode::ValidationFailed, message)
}

fn skipped(check: &str) -> Finding {
    Finding::new(
        Severity::Info,
        FindingCode::CheckSkipped,
        format!("{} check skipped: no header field configured", check),
    )
}

/// Reads the patched header back and cross-checks it against the input.
///
/// Never fails: every mismatch becomes a `ValidationFailed` finding and the
/// report always ends with a `Pass` or `Fail` summary. A check whose header
/// field the layout does not place is reported as `CheckSkipped`; the
/// duration check then reads the frame rate from the template.
///
/// ```rust
/// use edf2wineeg::config::LayoutOptions;
/// use edf2wineeg::doctest_utils::synthetic_template;
/// use edf2wineeg::grafter::OutputBuffer;
/// use edf2wineeg::validation::{validate, InputMetadata};
/// use edf2wineeg::{CalibrationTable, FindingCode};
///
/// // Untouched template header: nothing matches
/// let template = synthetic_template("t.EEG", 250.0, 0.5)?;
/// let layout = LayoutOptions::default().with_count_fields();
/// let buffer = OutputBuffer::from_template(&template, &layout);
/// let input = InputMetadata { sample_rate: 250.0, channel_count: 19, duration_secs: 10.0 };
/// let report = validate(&input, &buffer, &CalibrationTable::uniform(1.0, 1, 19));
/// assert!(!report.passed());
/// assert_eq!(report.summary().map(|f| f.code), Some(FindingCode::Fail));
/// # Ok::<(), edf2wineeg::ConvertError>(())
/// ```
pub fn validate(input: &InputMetadata, buffer: &OutputBuffer, table: &CalibrationTable) -> ValidationReport {
    let header = buffer.header();
    let mut report = ValidationReport::new();

    let options = buffer.layout();

    let header_rate = match options.sample_rate_field() {
        Some(field) => {
            let rate = layout::read_u16(header, field);
            match rate {
                Some(r) if r as f64 == input.sample_rate.round() => {}
                Some(r) => report.push(failed(format!("header sample rate {} Hz, input {} Hz", r, input.sample_rate))),
                None => report.push(failed("sample rate field unreadable".to_string())),
            }
            rate.map(f64::from)
        }
        None => {
            report.push(skipped("sample rate"));
            Some(buffer.sample_rate())
        }
    };

    match options.channel_count_field() {
        Some(field) => match layout::read_u16(header, field) {
            Some(n) if n as usize == input.channel_count => {}
            Some(n) => report.push(failed(format!("header channel count {}, input {}", n, input.channel_count))),
            None => report.push(failed("channel count field unreadable".to_string())),
        },
        None => report.push(skipped("channel count")),
    }

    match options.frame_count_field() {
        Some(field) => match (layout::read_u32(header, field), header_rate) {
            (Some(frames), Some(r)) if r > 0.0 => {
                let duration = frames as f64 / r;
                let tolerance = 1.0 / r + 1e-9;
                if (duration - input.duration_secs).abs() > tolerance {
                    report.push(failed(format!(
                        "header duration {:.3} s, input {:.3} s",
                        duration, input.duration_secs
                    )));
                }
            }
            _ => report.push(failed("duration cannot be derived from the header".to_string())),
        },
        None => report.push(skipped("duration")),
    }

    for (ch, entry) in table.entries.iter().enumerate() {
        if buffer.is_marker(ch) {
            continue;
        }
        match layout::read_calibration(header, ch) {
            Some(m) => {
                let scale = m as f64 * table.unit;
                if (scale - entry.scale).abs() > entry.scale.abs() * 1e-9 {
                    report.push(
                        failed(format!("calibration byte {} decodes to {} per code, expected {}", m, scale, entry.scale))
                            .for_channel(ch),
                    );
                }
            }
            None => report.push(failed("calibration byte unreadable".to_string()).for_channel(ch)),
        }
    }

    let failures = report.with_code(FindingCode::ValidationFailed).count();
    if failures == 0 {
        report.push(Finding::new(Severity::Info, FindingCode::Pass, "PASS"));
    } else {
        log::warn!("Validation of {} found {} mismatches", buffer.template_name(), failures);
        report.push(Finding::new(
            Severity::Error,
            FindingCode::Fail,
            format!("FAIL: {} check(s) failed", failures),
        ));
    }
    report
}
