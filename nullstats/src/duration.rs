//! Duration literals used in the stats file header.
//!
//! Intervals are written the way Go's `time.Duration` prints them for whole
//! units (`24h0m0s`, `1h0m0s`, `15m0s`, `90s` is written as `1m30s`), with any
//! sub-second remainder appended as integer `ms`/`us`/`ns` groups instead of
//! a decimal fraction. Parsing goes through [`humantime`], which accepts those
//! literals as well as hand-written forms such as `1day` or `2h 30m`.

use std::time::Duration;

/// Formats a duration as a compact unit literal such as `24h0m0s`.
pub fn format(d: Duration) -> String {
    if d.is_zero() {
        return "0s".to_string();
    }

    let secs = d.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h{minutes}m{seconds}s"));
    } else if minutes > 0 {
        out.push_str(&format!("{minutes}m{seconds}s"));
    } else if seconds > 0 {
        out.push_str(&format!("{seconds}s"));
    }

    let nanos = d.subsec_nanos();
    let (millis, micros, nanos) = (nanos / 1_000_000, (nanos / 1_000) % 1_000, nanos % 1_000);
    for (value, unit) in [(millis, "ms"), (micros, "us"), (nanos, "ns")] {
        if value > 0 {
            out.push_str(&format!("{value}{unit}"));
        }
    }
    out
}

/// Parses a duration literal.
///
/// # Errors
///
/// Returns the parser's description of the problem if `s` is not a valid
/// duration literal.
pub fn parse(s: &str) -> Result<Duration, String> {
    // Go prints microseconds with the micro sign.
    let normalized = s.trim().replace('µ', "u");
    if normalized.is_empty() {
        return Err("empty duration".to_string());
    }
    humantime::parse_duration(&normalized).map_err(|e| e.to_string())
}
