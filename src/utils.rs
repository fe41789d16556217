/// Checks whether an ASCII header field holds an integer
pub fn is_integer_number(s: &str) -> bool {
    let s = s.trim();
    if s.is_empty() {
        return false;
    }

    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// Checks whether an ASCII header field holds a number (integer or decimal)
pub fn is_number(s: &str) -> bool {
    let s = s.trim();
    !s.is_empty() && s.parse::<f64>().is_ok()
}

/// Locale-independent integer parse of a space-padded field
pub fn atoi_nonlocalized(s: &str) -> i64 {
    s.trim().parse().unwrap_or(0)
}

/// Locale-independent float parse of a space-padded field
pub fn atof_nonlocalized(s: &str) -> f64 {
    s.trim().parse().unwrap_or(0.0)
}

/// Multiplier that brings a physical dimension to microvolts.
///
/// Unknown dimensions are taken as already being in µV.
pub fn microvolt_factor(unit: &str) -> f64 {
    match unit.trim() {
        "V" => 1e6,
        "mV" => 1e3,
        "nV" => 1e-3,
        _ => 1.0,
    }
}

/// Canonical electrode name used to match EDF labels against a montage.
///
/// Strips the `EEG ` type prefix and a trailing reference (`-REF`, `-LE`,
/// `-A1`, ...), uppercases, and maps the modern 10-10 temporal names onto
/// the older 10-20 ones the lab templates use.
///
/// ```rust
/// use edf2wineeg::utils::normalize_label;
///
/// assert_eq!(normalize_label("EEG Fp1-REF"), "FP1");
/// assert_eq!(normalize_label("T7"), "T3");
/// assert_eq!(normalize_label(" cz "), "CZ");
/// ```
pub fn normalize_label(label: &str) -> String {
    let mut name = label.trim().to_ascii_uppercase();
    if let Some(rest) = name.strip_prefix("EEG") {
        name = rest.trim_start().to_string();
    }
    if let Some(dash) = name.find('-') {
        name.truncate(dash);
    }
    let name = name.trim();

    match name {
        "T7" => "T3",
        "T8" => "T4",
        "P7" => "T5",
        "P8" => "T6",
        other => other,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_integer_number() {
        assert!(is_integer_number("123"));
        assert!(is_integer_number("-456"));
        assert!(is_integer_number("+789   "));
        assert!(is_integer_number("0"));
        assert!(!is_integer_number("12.34"));
        assert!(!is_integer_number("abc"));
        assert!(!is_integer_number("-"));
        assert!(!is_integer_number(""));
    }

    #[test]
    fn test_is_number() {
        assert!(is_number("-200    "));
        assert!(is_number("0.5"));
        assert!(!is_number("        "));
        assert!(!is_number("1,5"));
    }

    #[test]
    fn test_nonlocalized_parsing() {
        assert_eq!(atoi_nonlocalized(" 256    "), 256);
        assert_eq!(atoi_nonlocalized("junk"), 0);
        assert_eq!(atof_nonlocalized("-3276.8 "), -3276.8);
    }

    #[test]
    fn test_normalize_label_variants() {
        assert_eq!(normalize_label("EEG O2-LE"), "O2");
        assert_eq!(normalize_label("EEGFz"), "FZ");
        assert_eq!(normalize_label("P8-A2"), "T6");
        assert_eq!(normalize_label("ECG"), "ECG");
    }

    #[test]
    fn test_microvolt_factor() {
        assert_eq!(microvolt_factor("mV"), 1000.0);
        assert_eq!(microvolt_factor("uV"), 1.0);
        assert_eq!(microvolt_factor("V "), 1e6);
    }
}
