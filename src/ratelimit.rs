//! Rate-limit reset extraction.
//!
//! Upstream 429s communicate their reset point in many dialects: standard
//! headers, Google quota failure payloads, duration strings, or prose.
//! [`parse_reset_time`] scans them in a fixed precedence order and returns
//! the delay in milliseconds, or `None` when nothing usable was found.
//!
//! Guarantees: the result is always a positive, finite number of
//! milliseconds; sub-second answers are bumped to two seconds so the
//! retry loop never spins.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use reqwest::header::HeaderMap;

/// Floor applied to positive results below one second.
const MIN_RESET_MS: u64 = 2000;

static QUOTA_RESET_DELAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)quotaResetDelay["':\s]*(\d+)\s*(ms|s)?"#).expect("static regex")
});

static QUOTA_RESET_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)quotaResetTimeStamp["':\s]*([0-9]{4}-[0-9]{2}-[0-9]{2}[Tt ][0-9:.]+(?:Z|[+-][0-9]{2}:?[0-9]{2})?)"#)
        .expect("static regex")
});

static RETRY_AFTER_MS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)retry[-_]after[-_]ms["':\s]*(\d+)"#).expect("static regex")
});

static DURATION_STRING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:(\d+)h)(?:(\d+)m)?(?:(\d+)s)?\b|\b(?:(\d+)m)(?:(\d+)s)?\b|\b(?:(\d+)s)\b")
        .expect("static regex")
});

static RETRY_AFTER_PROSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)retry after (\d+) seconds?").expect("static regex")
});

static RESET_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)reset[^0-9]{0,20}([0-9]{4}-[0-9]{2}-[0-9]{2}[Tt ][0-9:.]+(?:Z|[+-][0-9]{2}:?[0-9]{2})?)"#)
        .expect("static regex")
});

/// Extract the milliseconds until a rate limit expires.
///
/// Headers are consulted first (`Retry-After`, `x-ratelimit-reset`,
/// `x-ratelimit-reset-after`), then the error body patterns. Returns
/// `None` on ambiguous input.
pub fn parse_reset_time(headers: Option<&HeaderMap>, body: Option<&str>) -> Option<u64> {
    let raw = headers
        .and_then(parse_reset_from_headers)
        .or_else(|| body.and_then(parse_reset_from_body))?;

    if raw <= 0 {
        return None;
    }
    let ms = raw as u64;
    Some(if ms < 1000 { MIN_RESET_MS } else { ms })
}

/// Scan response headers, in precedence order.
fn parse_reset_from_headers(headers: &HeaderMap) -> Option<i64> {
    // Retry-After: integer seconds or an HTTP date.
    if let Some(value) = header_str(headers, "retry-after") {
        if let Ok(seconds) = value.trim().parse::<i64>() {
            if seconds > 0 {
                return Some(seconds * 1000);
            }
        } else if let Ok(date) = DateTime::parse_from_rfc2822(value.trim()) {
            let delta = date.with_timezone(&Utc).timestamp_millis() - Utc::now().timestamp_millis();
            if delta > 0 {
                return Some(delta);
            }
        }
    }

    // x-ratelimit-reset: Unix seconds.
    if let Some(value) = header_str(headers, "x-ratelimit-reset") {
        if let Ok(epoch_seconds) = value.trim().parse::<i64>() {
            let delta = epoch_seconds * 1000 - Utc::now().timestamp_millis();
            if delta > 0 {
                return Some(delta);
            }
        }
    }

    // x-ratelimit-reset-after: relative seconds.
    if let Some(value) = header_str(headers, "x-ratelimit-reset-after") {
        if let Ok(seconds) = value.trim().parse::<f64>() {
            if seconds > 0.0 {
                return Some((seconds * 1000.0) as i64);
            }
        }
    }

    None
}

/// Scan an error body, in precedence order.
fn parse_reset_from_body(body: &str) -> Option<i64> {
    if body.trim().is_empty() {
        return None;
    }

    // quotaResetDelay: 30s / 1500ms (unit defaults to seconds).
    if let Some(captures) = QUOTA_RESET_DELAY.captures(body) {
        let amount: i64 = captures.get(1)?.as_str().parse().ok()?;
        let ms = match captures.get(2).map(|m| m.as_str()) {
            Some("ms") => amount,
            _ => amount * 1000,
        };
        if ms > 0 {
            return Some(ms);
        }
    }

    // quotaResetTimeStamp: 2026-01-01T00:00:00Z.
    if let Some(captures) = QUOTA_RESET_TIMESTAMP.captures(body) {
        if let Some(delta) = timestamp_delta_ms(captures.get(1)?.as_str()) {
            if delta > 0 {
                return Some(delta);
            }
        }
    }

    // retry-after-ms / retry_after_ms: 1500.
    if let Some(captures) = RETRY_AFTER_MS.captures(body) {
        let ms: i64 = captures.get(1)?.as_str().parse().ok()?;
        if ms > 0 {
            return Some(ms);
        }
    }

    // Duration strings: 1h30m, 2m10s, 45s.
    if let Some(m) = DURATION_STRING.find(body) {
        if let Some(ms) = parse_duration_ms(m.as_str()) {
            if ms > 0 {
                return Some(ms);
            }
        }
    }

    // Prose: "retry after 30 seconds".
    if let Some(captures) = RETRY_AFTER_PROSE.captures(body) {
        let seconds: i64 = captures.get(1)?.as_str().parse().ok()?;
        if seconds > 0 {
            return Some(seconds * 1000);
        }
    }

    // Bare ISO timestamp following "reset".
    if let Some(captures) = RESET_TIMESTAMP.captures(body) {
        if let Some(delta) = timestamp_delta_ms(captures.get(1)?.as_str()) {
            if delta > 0 {
                return Some(delta);
            }
        }
    }

    None
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Parse an `NhNmNs` fragment into milliseconds.
fn parse_duration_ms(text: &str) -> Option<i64> {
    let mut total: i64 = 0;
    let mut digits = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else {
            let amount: i64 = digits.parse().ok()?;
            digits.clear();
            total += match c {
                'h' => amount * 3_600_000,
                'm' => amount * 60_000,
                's' => amount * 1000,
                _ => return None,
            };
        }
    }
    if total > 0 {
        Some(total)
    } else {
        None
    }
}

/// Milliseconds from now until an ISO-8601 timestamp.
fn timestamp_delta_ms(text: &str) -> Option<i64> {
    let parsed = DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .map(|naive| naive.and_utc())
        })
        .or_else(|_| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
                .map(|naive| naive.and_utc())
        })
        .ok()?;
    Some(parsed.timestamp_millis() - Utc::now().timestamp_millis())
}
