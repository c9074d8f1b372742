//! Display fields computed at read time. Nothing here is persisted.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

/// Storage format for every timestamp column; identical to SQLite's
/// `datetime('now')` so database defaults and application writes compare
/// correctly as text.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const WORDS_PER_MINUTE: usize = 200;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc)))
}

/// "Oct 21, 2026 14:05 UTC"
pub fn human_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%b %-d, %Y %H:%M UTC").to_string()
}

/// "just now", "5 minutes ago", "1 hour ago", "3 days ago"; older than 30
/// days falls back to a calendar date. Future timestamps read as "just now".
pub fn relative_time(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - ts).num_seconds();
    if secs < 60 {
        return "just now".to_string();
    }

    let minutes = secs / 60;
    if minutes < 60 {
        return ago(minutes, "minute");
    }

    let hours = minutes / 60;
    if hours < 24 {
        return ago(hours, "hour");
    }

    let days = hours / 24;
    if days <= 30 {
        return ago(days, "day");
    }

    ts.format("%b %-d, %Y").to_string()
}

/// [`relative_time`] over a stored timestamp; unparseable input is echoed.
pub fn relative_time_str(raw: &str, now: DateTime<Utc>) -> String {
    match parse_timestamp(raw) {
        Some(ts) => relative_time(ts, now),
        None => raw.to_string(),
    }
}

fn ago(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", n, unit)
    }
}

pub fn strip_markup(text: &str) -> String {
    TAG_RE.replace_all(text, " ").into_owned()
}

/// Minutes to read `text` at 200 words per minute, rounded up, at least 1.
pub fn read_time_minutes(text: &str) -> u32 {
    let words = strip_markup(text).split_whitespace().count();
    words.div_ceil(WORDS_PER_MINUTE).max(1) as u32
}

/// First `max_chars` characters of the plain text, cut at a word boundary
/// when one is available, with an ellipsis when anything was dropped.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let plain = strip_markup(text);
    let plain = plain.split_whitespace().collect::<Vec<_>>().join(" ");
    if plain.chars().count() <= max_chars {
        return plain;
    }

    let cut: String = plain.chars().take(max_chars).collect();
    let trimmed = match cut.rfind(' ') {
        Some(idx) if idx > 0 => &cut[..idx],
        _ => cut.as_str(),
    };
    format!("{}...", trimmed.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn relative_time_buckets() {
        let now = t0();
        assert_eq!(relative_time(now - Duration::seconds(20), now), "just now");
        assert_eq!(relative_time(now - Duration::minutes(1), now), "1 minute ago");
        assert_eq!(relative_time(now - Duration::minutes(59), now), "59 minutes ago");
        assert_eq!(relative_time(now - Duration::hours(3), now), "3 hours ago");
        assert_eq!(relative_time(now - Duration::days(1), now), "1 day ago");
        assert_eq!(relative_time(now - Duration::days(30), now), "30 days ago");
        assert_eq!(relative_time(now - Duration::days(45), now), "Jan 24, 2026");
        assert_eq!(relative_time(now + Duration::hours(2), now), "just now");
    }

    #[test]
    fn stored_timestamps_parse_in_both_formats() {
        assert_eq!(parse_timestamp("2026-03-10 12:00:00"), Some(t0()));
        assert_eq!(parse_timestamp("2026-03-10T12:00:00Z"), Some(t0()));
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(relative_time_str("yesterday", t0()), "yesterday");
        assert_eq!(format_timestamp(t0()), "2026-03-10 12:00:00");
        assert_eq!(human_timestamp(t0()), "Mar 10, 2026 12:00 UTC");
    }

    #[test]
    fn read_time_rounds_up_with_floor_of_one() {
        assert_eq!(read_time_minutes(""), 1);
        assert_eq!(read_time_minutes("one two three"), 1);
        assert_eq!(read_time_minutes(&"word ".repeat(200)), 1);
        assert_eq!(read_time_minutes(&"word ".repeat(201)), 2);
        assert_eq!(read_time_minutes(&format!("<p>{}</p>", "word ".repeat(450))), 3);
    }

    #[test]
    fn excerpt_cuts_on_word_boundary() {
        assert_eq!(excerpt("<b>Short</b> post", 50), "Short post");
        assert_eq!(excerpt("alpha beta gamma delta", 12), "alpha beta...");
        assert_eq!(excerpt("abcdefghij", 4), "abcd...");
    }
}
