use serde_json::Value;

use crate::core::value::{coerce_number, display_value};

/// `$1,234.56`; negative amounts keep the sign after the currency symbol.
pub fn money(value: f64) -> String {
    format!("${}", grouped(value, 2))
}

pub fn money_whole(value: f64) -> String {
    format!("${}", grouped(value, 0))
}

/// Fixed-point text with thousands separators.
pub fn grouped(value: f64, decimals: usize) -> String {
    let text = format!("{:.*}", decimals, value);
    let (sign, body) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.as_str()),
    };
    let (int_part, frac_part) = match body.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (body, None),
    };

    let digits = int_part.as_bytes();
    let mut out = String::with_capacity(text.len() + digits.len() / 3);
    out.push_str(sign);
    for (idx, digit) in digits.iter().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(*digit as char);
    }
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

/// Rate expressed as a percentage, e.g. `0.035` with 2 decimals → `3.50%`.
pub fn percent(rate: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, rate * 100.0)
}

pub fn fixed(value: f64, decimals: usize) -> String {
    format!("{:.*}", decimals, value)
}

/// Portion-of-year cell for detail tables.
pub fn portion_detail(portion: &Value) -> String {
    match portion {
        Value::Number(n) => n.as_f64().map(|p| fixed(p, 3)).unwrap_or_default(),
        Value::Null => String::new(),
        other => display_value(other),
    }
}

/// Portion-of-year cell for the condensed table, e.g. `0.5` → `50%`.
pub fn portion_percent(portion: &Value) -> String {
    let p = coerce_number(portion).unwrap_or(0.0);
    format!("{:.0}%", p * 100.0)
}

/// ASCII-only file name fragment: spaces become underscores and anything
/// outside `[A-Za-z0-9_.-]` is dropped.
pub fn filename_fragment(text: &str) -> String {
    text.chars()
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn money_groups_thousands_and_keeps_sign() {
        assert_eq!(money(1234567.891), "$1,234,567.89");
        assert_eq!(money(0.0), "$0.00");
        assert_eq!(money(-1500.5), "$-1,500.50");
        assert_eq!(money(999.999), "$1,000.00");
        assert_eq!(money_whole(2_500_000.4), "$2,500,000");
    }

    #[test]
    fn percent_and_fixed_formats() {
        assert_eq!(percent(0.035, 2), "3.50%");
        assert_eq!(percent(-0.01, 1), "-1.0%");
        assert_eq!(fixed(0.8765432, 5), "0.87654");
    }

    #[test]
    fn portion_cells() {
        assert_eq!(portion_detail(&json!(0.5)), "0.500");
        assert_eq!(portion_detail(&json!("partial")), "partial");
        assert_eq!(portion_detail(&Value::Null), "");
        assert_eq!(portion_percent(&json!(0.25)), "25%");
        assert_eq!(portion_percent(&json!(1)), "100%");
    }

    #[test]
    fn filename_fragment_is_ascii_safe() {
        assert_eq!(filename_fragment("Smith v. Jones"), "Smith_v._Jones");
        assert_eq!(filename_fragment("Résumé/Case"), "RsumCase");
    }
}
