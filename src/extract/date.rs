use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate};
use regex::{Captures, Regex};

/// Earliest year accepted as a plausible publish date.
pub const MIN_YEAR: i32 = 2005;

// `YYYY sep MM sep DD`, sep in {. - /}, with optional spaces around separators.
static YMD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\D)(\d{4})\s*[./-]\s*(\d{1,2})\s*[./-]\s*(\d{1,2})").unwrap()
});
static KOREAN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})\s*년\s*(\d{1,2})\s*월\s*(\d{1,2})\s*일").unwrap()
});
// Compact `YYYYMMDDhhmmss` / `YYYYMMDD` forms are whole digit runs of exactly 14 or 8.
static DIGIT_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9]+").unwrap());
static MD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^\d.])(\d{1,2})\.\s*(\d{1,2})\.").unwrap());

// Publish span shapes: "2024. 3. 7. 14:05", "3. 7.", "5분 전", "2시간 전", "3일 전", "방금 전".
static SPAN_FULL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})\.\s*(\d{1,2})\.\s*(\d{1,2})\.?(?:\s+\d{1,2}:\d{2})?").unwrap()
});
static SPAN_MD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d{1,2})\.\s*(\d{1,2})\.").unwrap());
static SPAN_RECENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:방금|\d+\s*(?:초|분|시간))\s*전").unwrap());
static SPAN_DAYS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s*일\s*전").unwrap());

/// Try each pattern in priority order; the first match that is also plausible wins.
pub fn normalize_date_at(
    text: &str,
    fallback_year: Option<i32>,
    current_year: i32,
) -> Option<String> {
    for re in [&*YMD_RE, &*KOREAN_RE] {
        let found = re
            .captures_iter(text)
            .map(|c| (num(&c, 1), num(&c, 2), num(&c, 3)));
        if let Some(d) = first_plausible(found, current_year) {
            return Some(d);
        }
    }
    for len in [14, 8] {
        if let Some(d) = first_plausible(compact_runs(text, len), current_year) {
            return Some(d);
        }
    }

    let year = fallback_year?;
    let found = MD_RE
        .captures_iter(text)
        .map(|c| (year, num(&c, 1), num(&c, 2)));
    first_plausible(found, current_year)
}

/// Dedicated parser for the in-page publish-date element.
pub fn parse_publish_span(text: &str, today: NaiveDate) -> Option<String> {
    let current_year = today.year();
    if let Some(c) = SPAN_FULL_RE.captures(text) {
        let (y, m, d) = (num(&c, 1), num(&c, 2), num(&c, 3));
        if plausible(y, m, d, current_year) {
            return Some(format_ymd(y, m, d));
        }
    }
    if let Some(c) = SPAN_MD_RE.captures(text) {
        let (m, d) = (num(&c, 1), num(&c, 2));
        if plausible(current_year, m, d, current_year) {
            return Some(format_ymd(current_year, m, d));
        }
    }
    if SPAN_RECENT_RE.is_match(text) {
        return Some(today.format("%Y-%m-%d").to_string());
    }
    if let Some(c) = SPAN_DAYS_RE.captures(text) {
        let days: i64 = c[1].parse().ok()?;
        let day = today.checked_sub_signed(Duration::try_days(days)?)?;
        return Some(day.format("%Y-%m-%d").to_string());
    }
    None
}

/// Loose check: no month-length or leap-year validation.
pub fn plausible(year: i32, month: i32, day: i32, current_year: i32) -> bool {
    (MIN_YEAR..=current_year + 1).contains(&year)
        && (1..=12).contains(&month)
        && (1..=31).contains(&day)
}

fn first_plausible<I>(mut found: I, current_year: i32) -> Option<String>
where
    I: Iterator<Item = (i32, i32, i32)>,
{
    found
        .find(|&(y, m, d)| plausible(y, m, d, current_year))
        .map(|(y, m, d)| format_ymd(y, m, d))
}

fn compact_runs(text: &str, len: usize) -> impl Iterator<Item = (i32, i32, i32)> + '_ {
    DIGIT_RUN_RE
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(move |s| s.len() == len)
        .map(|s| (field(&s[..4]), field(&s[4..6]), field(&s[6..8])))
}

fn field(s: &str) -> i32 {
    s.parse().unwrap_or(0)
}

fn num(c: &Captures, i: usize) -> i32 {
    c.get(i).and_then(|m| m.as_str().parse().ok()).unwrap_or(0)
}

fn format_ymd(y: i32, m: i32, d: i32) -> String {
    format!("{:04}-{:02}-{:02}", y, m, d)
}
