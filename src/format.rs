use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;

/// Placeholder for missing amounts in human-readable output.
pub const MISSING: &str = "N/A";

fn group_int_digits(int_part: &str, separator: char) -> String {
    let mut out = String::with_capacity(int_part.len() + int_part.len() / 3);
    let len = int_part.len();
    for (i, ch) in int_part.chars().enumerate() {
        out.push(ch);
        let remaining = len.saturating_sub(i + 1);
        if remaining > 0 && remaining % 3 == 0 {
            out.push(separator);
        }
    }
    out
}

fn fixed_fraction(s: &str, dp: usize) -> (String, String) {
    let (int_part, frac_part) = s.split_once('.').unwrap_or((s, ""));
    let mut frac: String = frac_part.chars().take(dp).collect();
    while frac.len() < dp {
        frac.push('0');
    }
    (int_part.to_string(), frac)
}

/// Format an amount the Austrian way: `.` groups thousands, `,` separates
/// two decimals (`-1.234,56`). Rounds half away from zero.
pub fn eu_amount(amount: f64) -> String {
    let Some(value) = Decimal::from_f64(amount) else {
        return MISSING.to_string();
    };
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();

    let (int_part, frac) = fixed_fraction(&rounded.abs().to_string(), 2);
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&group_int_digits(&int_part, '.'));
    out.push(',');
    out.push_str(&frac);
    out
}

/// [`eu_amount`] with the currency appended, or [`MISSING`].
pub fn eu_money(amount: Option<f64>, currency: &str) -> String {
    match amount {
        Some(amount) => format!("{} {currency}", eu_amount(amount)),
        None => MISSING.to_string(),
    }
}

/// Format a fraction as a signed percentage (`0.025` -> `+2,50 %`).
pub fn eu_percent(fraction: f64) -> String {
    let sign = if fraction > 0.0 { "+" } else { "" };
    format!("{sign}{} %", eu_amount(fraction * 100.0))
}

/// Shorten an IBAN to its first and last four characters (`AT61...3201`).
pub fn iban_short(iban: Option<&str>) -> String {
    let clean: String = iban.unwrap_or_default().split_whitespace().collect();
    let chars: Vec<char> = clean.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else if clean.is_empty() {
        "IBAN N/A".to_string()
    } else {
        clean
    }
}

/// Recursively drop `null`s, empty objects and empty arrays.
///
/// Returns `None` when nothing is left.
pub fn prune_nulls(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => {
            let pruned: serde_json::Map<String, Value> = map
                .into_iter()
                .filter_map(|(k, v)| prune_nulls(v).map(|v| (k, v)))
                .collect();
            (!pruned.is_empty()).then_some(Value::Object(pruned))
        }
        Value::Array(items) => {
            let pruned: Vec<Value> = items.into_iter().filter_map(prune_nulls).collect();
            (!pruned.is_empty()).then_some(Value::Array(pruned))
        }
        other => Some(other),
    }
}
