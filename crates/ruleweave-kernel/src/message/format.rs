//! Numeric format specifiers for message placeholders (`{Min:0.00}`).
//!
//! Standard specifiers are a letter plus an optional precision:
//! `F` fixed, `N` grouped, `D` zero-padded integer, `X` hex, `P` percent,
//! `E` scientific, `G` general. Anything built only from `0 # . ,` is a
//! custom pattern. Non-numeric values and unknown specifiers render plain.

use ruleweave_types::Value;

/// Format `value` with an optional specifier.
pub fn format_value(value: &Value, spec: Option<&str>) -> String {
    let Some(spec) = spec.filter(|s| !s.is_empty()) else {
        return value.to_string();
    };
    match value {
        Value::Int(i) => format_int(*i, spec).unwrap_or_else(|| value.to_string()),
        Value::Float(f) => format_float(*f, spec).unwrap_or_else(|| value.to_string()),
        _ => value.to_string(),
    }
}

/// Largest precision a standard specifier honours; larger ones are clamped.
const MAX_PRECISION: usize = 99;

/// Split `F2` into `('F', Some(2))`.
fn standard(spec: &str) -> Option<(char, Option<usize>)> {
    let mut chars = spec.chars();
    let letter = chars.next()?;
    if !letter.is_ascii_alphabetic() {
        return None;
    }
    let rest = chars.as_str();
    if rest.is_empty() {
        return Some((letter, None));
    }
    rest.parse::<usize>()
        .ok()
        .map(|p| (letter, Some(p.min(MAX_PRECISION))))
}

fn format_int(value: i64, spec: &str) -> Option<String> {
    if let Some((letter, precision)) = standard(spec) {
        return match letter {
            'D' | 'd' => {
                let digits = precision.unwrap_or(0);
                let raw = format!("{:0digits$}", value.unsigned_abs());
                Some(if value < 0 { format!("-{raw}") } else { raw })
            }
            'X' => Some(pad_left(&format!("{value:X}"), precision.unwrap_or(0))),
            'x' => Some(pad_left(&format!("{value:x}"), precision.unwrap_or(0))),
            'G' | 'g' => Some(value.to_string()),
            // precision-taking float formats apply to ints as well
            _ => format_float(value as f64, spec),
        };
    }
    format_float(value as f64, spec)
}

fn format_float(value: f64, spec: &str) -> Option<String> {
    if let Some((letter, precision)) = standard(spec) {
        return match letter {
            'F' | 'f' => Some(format!("{:.*}", precision.unwrap_or(2), value)),
            'N' | 'n' => Some(group_thousands(&format!("{:.*}", precision.unwrap_or(2), value))),
            'P' | 'p' => Some(format!("{:.*} %", precision.unwrap_or(2), value * 100.0)),
            'E' | 'e' => Some(scientific(value, precision.unwrap_or(6), letter)),
            'G' | 'g' => Some(Value::Float(value).to_string()),
            _ => None,
        };
    }
    custom(value, spec)
}

fn pad_left(raw: &str, width: usize) -> String {
    format!("{raw:0>width$}")
}

/// `1234.56` with `E3` renders as `1.235E+003`.
fn scientific(value: f64, precision: usize, letter: char) -> String {
    let rendered = format!("{:.*e}", precision, value);
    let (mantissa, exponent) = rendered.split_once('e').unwrap_or((rendered.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{mantissa}{letter}{sign}{:03}", exponent.abs())
}

/// Insert `,` every three digits of the integer part.
fn group_thousands(number: &str) -> String {
    let (sign, unsigned) = match number.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", number),
    };
    let (int_part, frac) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };
    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    match frac {
        Some(f) => format!("{sign}{grouped}.{f}"),
        None => format!("{sign}{grouped}"),
    }
}

/// Custom `0`/`#` patterns such as `0.00`, `#,##0.#`.
fn custom(value: f64, pattern: &str) -> Option<String> {
    if !pattern.chars().all(|c| matches!(c, '0' | '#' | '.' | ',')) {
        return None;
    }
    let (int_pattern, frac_pattern) = pattern.split_once('.').unwrap_or((pattern, ""));
    if frac_pattern.contains(['.', ',']) {
        return None;
    }

    let min_int = int_pattern.chars().filter(|&c| c == '0').count();
    let max_frac = frac_pattern.len();
    let min_frac = frac_pattern.chars().take_while(|&c| c == '0').count();
    let grouped = int_pattern.contains(',');

    let rendered = format!("{:.*}", max_frac, value.abs());
    let (int_digits, frac_digits) = rendered.split_once('.').unwrap_or((rendered.as_str(), ""));

    let mut frac = frac_digits.to_string();
    while frac.len() > min_frac && frac.ends_with('0') {
        frac.pop();
    }

    let mut int_part = if int_digits == "0" && min_int == 0 {
        String::new()
    } else {
        int_digits.to_string()
    };
    if int_part.len() < min_int {
        int_part = pad_left(&int_part, min_int);
    }
    if grouped {
        int_part = group_thousands(&int_part);
    }

    let negative = value < 0.0 && (int_part.chars().any(|c| c != '0' && c != ',') || frac.chars().any(|c| c != '0'));
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&int_part);
    if !frac.is_empty() {
        out.push('.');
        out.push_str(&frac);
    }
    if out.is_empty() || out == "-" {
        out = "0".to_string();
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Value::Float(3.14159), "0.00", "3.14")]
    #[case(Value::Float(3.1), "0.00", "3.10")]
    #[case(Value::Float(3.1), "0.##", "3.1")]
    #[case(Value::Float(0.5), "#.##", ".5")]
    #[case(Value::Int(7), "000", "007")]
    #[case(Value::Float(1234567.891), "#,##0.0", "1,234,567.9")]
    #[case(Value::Float(-2.5), "0.0", "-2.5")]
    #[case(Value::Float(1234.5), "N2", "1,234.50")]
    #[case(Value::Int(42), "D5", "00042")]
    #[case(Value::Int(-42), "D4", "-0042")]
    #[case(Value::Int(255), "X", "FF")]
    #[case(Value::Int(255), "x4", "00ff")]
    #[case(Value::Float(0.125), "P1", "12.5 %")]
    #[case(Value::Float(1234.56), "E3", "1.235E+003")]
    #[case(Value::Int(5), "F1", "5.0")]
    #[case(Value::Float(2.0), "G", "2")]
    fn numeric_formats(#[case] value: Value, #[case] spec: &str, #[case] expected: &str) {
        assert_eq!(format_value(&value, Some(spec)), expected);
    }

    #[test]
    fn non_numeric_ignores_spec() {
        assert_eq!(format_value(&Value::from("abc"), Some("0.00")), "abc");
        assert_eq!(format_value(&Value::Null, Some("F2")), "");
    }

    #[rstest]
    #[case(Value::Float(1.5), "F999999999", MAX_PRECISION + 2)]
    #[case(Value::Int(7), "D4000000000", MAX_PRECISION)]
    #[case(Value::Int(255), "X123456789", MAX_PRECISION)]
    fn precision_is_clamped(#[case] value: Value, #[case] spec: &str, #[case] len: usize) {
        assert_eq!(format_value(&value, Some(spec)).len(), len);
    }

    #[test]
    fn unknown_spec_renders_plain() {
        assert_eq!(format_value(&Value::Int(3), Some("yyyy")), "3");
    }
}
