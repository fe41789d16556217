//! Per-channel calibration policy
//!
//! Each heuristic is a standalone function over [`ChannelStats`] that
//! returns an optional finding and, where it applies, an adjusted
//! calibration multiplier. [`analyze`] runs them in a fixed order:
//! degenerate → overflow → (uniform merge) → weak signal → asymmetry.

use crate::config::{AnalyzerConfig, LayoutOptions};
use crate::layout::CODE_MAX;
use crate::types::{
    CalibrationEntry, CalibrationTable, DecodedRecording, Finding, FindingCode, Severity,
    ValidationReport,
};

/// Amplitude statistics of one channel; non-finite samples are ignored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelStats {
    pub channel: usize,
    pub min: f64,
    pub max: f64,
    pub max_abs: f64,
}

impl ChannelStats {
    pub fn from_samples(channel: usize, samples: &[f64]) -> Self {
        let (min, max) = samples
            .iter()
            .filter(|x| x.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x)));
        if min > max {
            return ChannelStats { channel, min: 0.0, max: 0.0, max_abs: 0.0 };
        }
        ChannelStats { channel, min, max, max_abs: min.abs().max(max.abs()) }
    }

    pub fn dynamic_range(&self) -> f64 {
        self.max - self.min
    }

    pub fn is_degenerate(&self) -> bool {
        self.max_abs == 0.0
    }

    /// Largest code magnitude this channel produces at `scale`.
    pub fn peak_code(&self, scale: f64) -> f64 {
        (self.max_abs / scale).round()
    }

    pub fn fits(&self, scale: f64) -> bool {
        self.peak_code(scale) <= CODE_MAX as f64
    }
}

/// Result of a rule that may move a channel's multiplier.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    pub multiplier: u8,
    pub finding: Option<Finding>,
}

/// A channel that is zero throughout has no usable amplitude; it keeps the default.
pub fn degenerate_rule(stats: &ChannelStats, config: &AnalyzerConfig) -> Option<RuleOutcome> {
    if !stats.is_degenerate() {
        return None;
    }
    let multiplier = config.start_multiplier();
    Some(RuleOutcome {
        multiplier,
        finding: Some(
            Finding::new(
                Severity::Warning,
                FindingCode::DegenerateChannel,
                format!("channel is constant zero; default calibration {} kept", multiplier),
            )
            .for_channel(stats.channel),
        ),
    })
}

/// Doubles the multiplier until the channel's peak fits the code range.
///
/// Saturates at the largest power-of-two step that still fits in the
/// calibration byte; samples beyond that are left for the encoder to clamp.
/// A zero multiplier is treated as 1.
pub fn overflow_rule(stats: &ChannelStats, unit: f64, multiplier: u8) -> RuleOutcome {
    let multiplier = multiplier.max(1);
    let mut m = multiplier;
    while !stats.fits(unit * m as f64) && m <= u8::MAX / 2 {
        m *= 2;
    }
    if m == multiplier {
        return RuleOutcome { multiplier, finding: None };
    }

    let message = if stats.fits(unit * m as f64) {
        format!(
            "peak {:.1} exceeds ±{:.1} at {} per code; scale raised {}x to {} per code",
            stats.max_abs,
            CODE_MAX as f64 * unit * multiplier as f64,
            unit * multiplier as f64,
            m / multiplier,
            unit * m as f64
        )
    } else {
        format!(
            "peak {:.1} exceeds the coarsest scale {} per code; samples will clip",
            stats.max_abs,
            unit * m as f64
        )
    };
    RuleOutcome {
        multiplier: m,
        finding: Some(Finding::new(Severity::Warning, FindingCode::PowerOverflow, message).for_channel(stats.channel)),
    }
}

/// Flags channels that use less than `weak_fraction` of the code range.
pub fn weak_signal_rule(stats: &ChannelStats, unit: f64, multiplier: u8, config: &AnalyzerConfig) -> Option<Finding> {
    if stats.is_degenerate() {
        return None;
    }
    let peak = stats.peak_code(unit * multiplier as f64);
    let limit = config.weak_fraction * CODE_MAX as f64;
    if peak >= limit {
        return None;
    }
    Some(
        Finding::new(
            Severity::Info,
            FindingCode::WeakSignal,
            format!("peak code {} is below {:.0} ({:.0}% of range)", peak, limit, config.weak_fraction * 100.0),
        )
        .for_channel(stats.channel),
    )
}

/// Merges per-channel multipliers into one shared value, then halves it
/// while every channel still fits and some channel is weak.
pub fn uniform_rule(stats: &[&ChannelStats], multipliers: &[u8], unit: f64, config: &AnalyzerConfig) -> RuleOutcome {
    let merged = multipliers.iter().copied().max().unwrap_or(config.start_multiplier()).max(1);

    let any_weak = |m: u8| stats.iter().any(|s| weak_signal_rule(s, unit, m, config).is_some());
    let all_fit = |m: u8| stats.iter().all(|s| s.fits(unit * m as f64));

    let mut m = merged;
    while m % 2 == 0 && any_weak(m) && all_fit(m / 2) {
        m /= 2;
    }
    if m == merged {
        return RuleOutcome { multiplier: merged, finding: None };
    }
    RuleOutcome {
        multiplier: m,
        finding: Some(Finding::new(
            Severity::Info,
            FindingCode::WeakSignal,
            format!("shared calibration tightened from {} to {} per code", unit * merged as f64, unit * m as f64),
        )),
    }
}

/// Flags tables whose channel scales differ by more than `asymmetry_ratio`.
pub fn asymmetry_rule(multipliers: &[(usize, u8)], config: &AnalyzerConfig) -> Option<Finding> {
    let lo = multipliers.iter().min_by_key(|(_, m)| *m)?;
    let hi = multipliers.iter().max_by_key(|(_, m)| *m)?;
    let ratio = hi.1 as f64 / lo.1 as f64;
    if ratio <= config.asymmetry_ratio {
        return None;
    }
    Some(Finding::new(
        Severity::Warning,
        FindingCode::AsymmetricScaling,
        format!(
            "channel {} scale is {:.0}x channel {} (limit {:.1}x)",
            hi.0, ratio, lo.0, config.asymmetry_ratio
        ),
    ))
}

/// Computes the calibration table for a recording.
///
/// Never fails: every anomaly ends up as a finding and every channel gets a
/// finite, positive scale.
///
/// ```rust
/// use edf2wineeg::calibration::analyze;
/// use edf2wineeg::config::{AnalyzerConfig, LayoutOptions};
/// use edf2wineeg::doctest_utils::synthetic_recording;
/// use edf2wineeg::FindingCode;
///
/// // Channel 3 peaks at 40000 µV, beyond ±32767 codes at 1 µV per code
/// let recording = synthetic_recording(250.0, 1.0, |ch, i| {
///     if ch == 3 { 40_000.0 } else { (i % 100) as f64 * 300.0 }
/// })?;
/// let (table, report) = analyze(&recording, &AnalyzerConfig::default(), &LayoutOptions::default());
/// assert_eq!(table.entries[3].multiplier, 2);
/// assert_eq!(table.entries[0].multiplier, 1);
/// assert!(report.has(FindingCode::PowerOverflow));
/// # Ok::<(), edf2wineeg::ConvertError>(())
/// ```
pub fn analyze(
    recording: &DecodedRecording,
    config: &AnalyzerConfig,
    layout: &LayoutOptions,
) -> (CalibrationTable, ValidationReport) {
    let unit = layout.calibration_unit;
    let mut report = ValidationReport::new();

    let stats: Vec<ChannelStats> = recording
        .samples()
        .iter()
        .enumerate()
        .map(|(ch, samples)| ChannelStats::from_samples(ch, samples))
        .collect();

    let mut multipliers = vec![config.start_multiplier(); stats.len()];
    for s in stats.iter().filter(|s| !layout.is_marker(s.channel)) {
        let outcome = match degenerate_rule(s, config) {
            Some(outcome) => outcome,
            None => overflow_rule(s, unit, config.start_multiplier()),
        };
        multipliers[s.channel] = outcome.multiplier;
        report.extend(outcome.finding);
    }

    let active: Vec<&ChannelStats> = stats.iter().filter(|s| !layout.is_marker(s.channel)).collect();

    if config.uniform_calibration {
        let live: Vec<u8> = active.iter().filter(|s| !s.is_degenerate()).map(|s| multipliers[s.channel]).collect();
        let outcome = uniform_rule(&active, &live, unit, config);
        // degenerate channels keep the default they were reported with
        for s in active.iter().filter(|s| !s.is_degenerate()) {
            multipliers[s.channel] = outcome.multiplier;
        }
        report.extend(outcome.finding);
    }

    for s in &active {
        report.extend(weak_signal_rule(s, unit, multipliers[s.channel], config));
    }

    let scaled: Vec<(usize, u8)> = active
        .iter()
        .filter(|s| !s.is_degenerate())
        .map(|s| (s.channel, multipliers[s.channel]))
        .collect();
    report.extend(asymmetry_rule(&scaled, config));

    let entries = multipliers
        .iter()
        .map(|&m| CalibrationEntry { scale: unit * m as f64, offset: 0.0, multiplier: m })
        .collect();

    log::debug!("Calibration multipliers: {:?}", multipliers);
    (CalibrationTable { unit, entries }, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doctest_utils::{integer_wave, synthetic_recording};

    fn stats(channel: usize, max_abs: f64) -> ChannelStats {
        ChannelStats { channel, min: -max_abs, max: max_abs, max_abs }
    }

    #[test]
    fn test_stats_skip_non_finite() {
        let s = ChannelStats::from_samples(0, &[1.0, f64::NAN, -7.5, f64::INFINITY]);
        assert_eq!(s.max_abs, 7.5);
        assert_eq!(s.dynamic_range(), 8.5);
        assert!(ChannelStats::from_samples(1, &[f64::NAN]).is_degenerate());
        assert!(ChannelStats::from_samples(2, &[]).is_degenerate());
    }

    #[test]
    fn test_degenerate_rule_keeps_default() {
        let config = AnalyzerConfig::default();
        let outcome = degenerate_rule(&stats(4, 0.0), &config).unwrap();
        assert_eq!(outcome.multiplier, 1);
        assert_eq!(outcome.finding.unwrap().code, FindingCode::DegenerateChannel);
        assert!(degenerate_rule(&stats(4, 1.0), &config).is_none());
    }

    #[test]
    fn test_overflow_rule_minimal_doubling() {
        let unit = 1000.0 / 32767.0;
        let outcome = overflow_rule(&stats(0, 2000.0), unit, 1);
        assert_eq!(outcome.multiplier, 2);
        assert_eq!(outcome.finding.unwrap().code, FindingCode::PowerOverflow);

        let outcome = overflow_rule(&stats(0, 2001.0), unit, 1);
        assert_eq!(outcome.multiplier, 4);

        let outcome = overflow_rule(&stats(0, 999.0), unit, 1);
        assert_eq!(outcome.multiplier, 1);
        assert!(outcome.finding.is_none());
    }

    #[test]
    fn test_overflow_rule_saturates() {
        let outcome = overflow_rule(&stats(0, 1e12), 1.0, 1);
        assert_eq!(outcome.multiplier, 128);
        assert!(outcome.finding.unwrap().message.contains("clip"));

        let outcome = overflow_rule(&stats(0, 1e12), 1.0, 3);
        assert_eq!(outcome.multiplier, 192);
    }

    #[test]
    fn test_zero_multiplier_is_raised_to_one() {
        let outcome = overflow_rule(&stats(0, 10.0), 1.0, 0);
        assert_eq!(outcome.multiplier, 1);
        assert!(outcome.finding.is_none());

        let outcome = overflow_rule(&stats(0, 40_000.0), 1.0, 0);
        assert_eq!(outcome.multiplier, 2);
        assert!(outcome.finding.unwrap().message.contains("2x"));
    }

    #[test]
    fn test_zero_default_multiplier_still_gives_positive_scales() {
        let config = AnalyzerConfig { default_multiplier: 0, ..Default::default() };
        let recording = synthetic_recording(250.0, 1.0, |ch, i| match ch {
            0 => 0.0,
            1 => 50_000.0,
            _ => integer_wave(ch, i),
        })
        .unwrap();
        let (table, _) = analyze(&recording, &config, &LayoutOptions::default());
        assert!(table.entries.iter().all(|e| e.multiplier >= 1 && e.scale > 0.0));
        assert_eq!(table.entries[0].multiplier, 1);
        assert_eq!(table.entries[1].multiplier, 2);

        let uniform = AnalyzerConfig { uniform_calibration: true, ..config };
        let (table, _) = analyze(&recording, &uniform, &LayoutOptions::default());
        assert!(table.entries.iter().all(|e| e.multiplier >= 1));
    }

    #[test]
    fn test_weak_signal_threshold() {
        let config = AnalyzerConfig::default();
        assert!(weak_signal_rule(&stats(0, 50.0), 1.0, 1, &config).is_some());
        assert!(weak_signal_rule(&stats(0, 3277.0), 1.0, 1, &config).is_none());
        assert!(weak_signal_rule(&stats(0, 0.0), 1.0, 1, &config).is_none());
    }

    #[test]
    fn test_uniform_rule_tightens_only_while_all_fit() {
        let config = AnalyzerConfig { default_multiplier: 8, ..Default::default() };
        let a = stats(0, 100.0);
        let b = stats(1, 20_000.0);
        // b needs at least 1 µV per code; tightening stops there
        let outcome = uniform_rule(&[&a, &b], &[8, 8], 1.0, &config);
        assert_eq!(outcome.multiplier, 1);
        assert!(outcome.finding.is_some());

        // 40000 needs 2 µV per code
        let c = stats(2, 40_000.0);
        let outcome = uniform_rule(&[&a, &c], &[8, 8], 1.0, &config);
        assert_eq!(outcome.multiplier, 2);
    }

    #[test]
    fn test_asymmetry_rule() {
        let config = AnalyzerConfig::default();
        assert!(asymmetry_rule(&[(0, 1), (1, 4)], &config).is_none());
        let finding = asymmetry_rule(&[(0, 1), (1, 8)], &config).unwrap();
        assert_eq!(finding.code, FindingCode::AsymmetricScaling);
        assert!(asymmetry_rule(&[], &config).is_none());
    }

    #[test]
    fn test_zero_channel_gets_finite_default() {
        let recording = synthetic_recording(250.0, 2.0, |ch, i| if ch == 5 { 0.0 } else { i as f64 % 40.0 }).unwrap();
        let (table, report) = analyze(&recording, &AnalyzerConfig::default(), &LayoutOptions::default());
        let entry = table.entries[5];
        assert!(entry.scale.is_finite() && entry.scale > 0.0);
        assert_eq!(entry.multiplier, 1);
        let degenerate: Vec<_> = report.with_code(FindingCode::DegenerateChannel).collect();
        assert_eq!(degenerate.len(), 1);
        assert_eq!(degenerate[0].channel, Some(5));
    }

    #[test]
    fn test_uniform_mode_shares_one_scale() {
        let config = AnalyzerConfig { uniform_calibration: true, ..Default::default() };
        let recording = synthetic_recording(250.0, 1.0, |ch, _| if ch == 2 { 70_000.0 } else { 10.0 }).unwrap();
        let (table, report) = analyze(&recording, &config, &LayoutOptions::default());
        assert!(table.entries.iter().all(|e| e.multiplier == 4));
        assert!(!report.has(FindingCode::AsymmetricScaling));
    }

    #[test]
    fn test_uniform_mode_leaves_zero_channel_at_default() {
        let config = AnalyzerConfig { uniform_calibration: true, ..Default::default() };
        let recording = synthetic_recording(250.0, 1.0, |ch, _| match ch {
            2 => 70_000.0,
            6 => 0.0,
            _ => 10.0,
        })
        .unwrap();
        let (table, report) = analyze(&recording, &config, &LayoutOptions::default());

        assert_eq!(table.entries[6].multiplier, 1);
        assert_eq!(table.entries[2].multiplier, 4);
        assert_eq!(table.entries[0].multiplier, 4);
        let flat: Vec<_> = report.with_code(FindingCode::DegenerateChannel).collect();
        assert_eq!(flat.len(), 1);
        assert!(flat[0].message.contains("calibration 1 kept"));
    }

    #[test]
    fn test_per_channel_mode_flags_asymmetry() {
        let recording = synthetic_recording(250.0, 1.0, |ch, _| if ch == 2 { 200_000.0 } else { 10.0 }).unwrap();
        let (table, report) = analyze(&recording, &AnalyzerConfig::default(), &LayoutOptions::default());
        assert_eq!(table.entries[2].multiplier, 8);
        assert_eq!(table.entries[0].multiplier, 1);
        assert!(report.has(FindingCode::AsymmetricScaling));
        assert!(report.has(FindingCode::WeakSignal));
    }

    #[test]
    fn test_marker_channels_are_left_alone() {
        let layout = LayoutOptions::with_lab_markers();
        let recording = synthetic_recording(250.0, 1.0, |ch, _| if ch == 0 { 0.0 } else { 100_000.0 }).unwrap();
        let (table, report) = analyze(&recording, &AnalyzerConfig::default(), &layout);
        assert_eq!(table.entries[0].multiplier, 1);
        assert_eq!(table.entries[18].multiplier, 1);
        assert_eq!(table.entries[1].multiplier, 4);
        assert!(!report.has(FindingCode::DegenerateChannel));
    }
}
