//! Conversions between protocol percentages and stored fractions.
//!
//! The conversion shifts the decimal point textually instead of multiplying
//! by 100, so `parse_percent(&format_percent(f)) == Some(f)` for every
//! finite non-negative `f`.

/// Parse a protocol percentage (`"12.5"`) into a fraction (`0.125`).
///
/// Accepts only unsigned decimal notation. Returns `None` for anything else.
pub(crate) fn parse_percent(text: &str) -> Option<f64> {
    let (int, frac) = text.split_once('.').unwrap_or((text, ""));
    let digits_only = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if int.is_empty() && frac.is_empty() {
        return None;
    }
    if !digits_only(int) || !digits_only(frac) {
        return None;
    }

    let mut int = int.to_string();
    while int.len() < 2 {
        int.insert(0, '0');
    }
    let split = int.len() - 2;
    let whole = if split == 0 { "0" } else { &int[..split] };
    format!("{}.{}{}", whole, &int[split..], frac).parse().ok()
}

/// Format a fraction (`0.125`) as a protocol percentage (`"12.5"`).
pub(crate) fn format_percent(fraction: f64) -> String {
    let text = format!("{}", fraction);
    let (int, frac) = text.split_once('.').unwrap_or((text.as_str(), ""));

    let mut frac = frac.to_string();
    while frac.len() < 2 {
        frac.push('0');
    }
    let whole = format!("{}{}", int, &frac[..2]);
    let whole = whole.trim_start_matches('0');
    let rest = frac[2..].trim_end_matches('0');

    let whole = if whole.is_empty() { "0" } else { whole };
    if rest.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, rest)
    }
}
