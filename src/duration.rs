//! Human-readable durations for timeouts and session ages ("2m", "1m30s", "90s").

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{de, Deserialize, Deserializer, Serializer};

const SECS_PER_DAY: u64 = 24 * 60 * 60;
const SECS_PER_HOUR: u64 = 60 * 60;
const SECS_PER_MINUTE: u64 = 60;

/// Parse a duration made of one or more `<number><unit>` segments.
///
/// Units are `d`, `h`, `m` and `s`; segments add up, so `"1m30s"` is ninety
/// seconds. Input is case-insensitive and surrounding whitespace is ignored.
///
/// ```
/// use elba::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
/// assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
/// ```
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    if s.is_empty() {
        anyhow::bail!("Duration must not be empty");
    }

    let mut total: u64 = 0;
    let mut digits = String::new();

    for ch in s.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }

        let unit_secs = match ch {
            'd' => SECS_PER_DAY,
            'h' => SECS_PER_HOUR,
            'm' => SECS_PER_MINUTE,
            's' => 1,
            _ => anyhow::bail!("Unknown duration unit {ch:?} (use d, h, m or s)"),
        };

        if digits.is_empty() {
            anyhow::bail!("Duration unit {ch:?} is missing a number");
        }
        let num: u64 = digits.parse().context("Invalid number in duration")?;
        digits.clear();

        let secs = num
            .checked_mul(unit_secs)
            .context("Duration is too large")?;
        total = total.checked_add(secs).context("Duration is too large")?;
    }

    if !digits.is_empty() {
        anyhow::bail!("Duration must end with d, h, m, or s");
    }

    Ok(Duration::from_secs(total))
}

/// Render a duration as compound segments, largest unit first (`"1h5m"`).
pub fn format_duration(d: Duration) -> String {
    let mut secs = d.as_secs();
    if secs == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    for (unit, size) in [
        ('d', SECS_PER_DAY),
        ('h', SECS_PER_HOUR),
        ('m', SECS_PER_MINUTE),
        ('s', 1),
    ] {
        let n = secs / size;
        if n > 0 {
            out.push_str(&format!("{n}{unit}"));
            secs %= size;
        }
    }
    out
}

/// Serde deserializer for duration strings.
///
/// Use with `#[serde(deserialize_with = "deserialize_duration")]`.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(de::Error::custom)
}

/// Serde serializer producing the same syntax [`parse_duration`] accepts.
pub fn serialize_duration<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_duration(*d))
}
