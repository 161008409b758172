//! Search windows and the hourly segments they are split into.
//!
//! Rotated logs are named for the hour *after* the records they contain
//! (records written from 20:15 land in the `...T21:` file), so the first
//! segment of a window is the hour following its start. The live,
//! not-yet-rotated file is always searched last as [`Segment::Current`].

use std::fmt;

use chrono::{DateTime, DurationRound, NaiveDate, NaiveDateTime, TimeDelta, Utc};

use crate::error::{Result, SearchError};

/// Maximum search range: one week.
pub const MAX_WINDOW_SECS: i64 = 7 * 24 * 60 * 60;

/// Default look-back when no start time is given: one hour.
pub const DEFAULT_LOOKBACK_SECS: i64 = 60 * 60;

/// One unit of sequential search work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    /// A rotated hour, identified by the top of that hour.
    Hour(DateTime<Utc>),
    /// The live log file.
    Current,
}

impl Segment {
    /// Creates an hour segment, truncating `at` to the top of its hour.
    #[must_use]
    pub fn hour(at: DateTime<Utc>) -> Self {
        Self::Hour(truncate_to_hour(at))
    }

    /// Returns the rotated-file key for this hour (`YYYY-MM-DDTHH:`), or
    /// `None` for the live file.
    #[must_use]
    pub fn hour_key(&self) -> Option<String> {
        match self {
            Self::Hour(at) => Some(at.format("%Y-%m-%dT%H:").to_string()),
            Self::Current => None,
        }
    }

    /// Returns true for the live-file sentinel.
    #[must_use]
    pub const fn is_current(&self) -> bool {
        matches!(self, Self::Current)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hour(at) => write!(f, "{}", at.format("%Y-%m-%dT%H:")),
            Self::Current => f.write_str("current"),
        }
    }
}

/// A validated `[start, now]` search range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    start: DateTime<Utc>,
    now: DateTime<Utc>,
}

impl SearchWindow {
    /// Creates a window, rejecting ranges longer than one week.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidWindow`] if the range is too large.
    pub fn new(start: DateTime<Utc>, now: DateTime<Utc>) -> Result<Self> {
        Self::with_max_range(start, now, TimeDelta::seconds(MAX_WINDOW_SECS))
    }

    /// Creates a window with a custom maximum range.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidWindow`] if the range exceeds `max`.
    pub fn with_max_range(
        start: DateTime<Utc>,
        now: DateTime<Utc>,
        max: TimeDelta,
    ) -> Result<Self> {
        let range = now - start;
        if range > max {
            return Err(SearchError::InvalidWindow {
                range: human_duration(range.num_milliseconds()),
                max: human_duration(max.num_milliseconds()),
            });
        }
        Ok(Self { start, now })
    }

    /// Window start (inclusive); records before it are cut from the first segment.
    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// The moment the search was issued.
    #[must_use]
    pub const fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Returns the segments to search, oldest first, ending with [`Segment::Current`].
    #[must_use]
    pub fn segments(&self) -> Vec<Segment> {
        let one_hour = TimeDelta::hours(1);
        let top_of_hour = truncate_to_hour(self.now);

        let mut segments = Vec::new();
        let mut cursor = self.start;
        while cursor <= top_of_hour {
            segments.push(Segment::hour(cursor + one_hour));
            cursor += one_hour;
        }
        segments.push(Segment::Current);
        segments
    }
}

fn truncate_to_hour(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(TimeDelta::hours(1)).unwrap_or(at)
}

/// Parses a start time given either as a duration ago (`90s`, `30m`, `2h`,
/// `3d`), as epoch seconds, or as an absolute date. Dates without an offset
/// are taken as UTC.
///
/// # Errors
///
/// Returns [`SearchError::InvalidTime`] if `arg` matches none of the forms.
pub fn parse_start_time(arg: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let arg = arg.trim();
    if let Some(ago) = parse_duration_ago(arg) {
        return Ok(now - ago);
    }

    if !arg.is_empty() && arg.chars().all(|c| c.is_ascii_digit()) {
        return arg
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| SearchError::InvalidTime(arg.to_string()));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(arg) {
        return Ok(dt.with_timezone(&Utc));
    }

    let naive_formats = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    for format in naive_formats {
        if let Ok(naive) = NaiveDateTime::parse_from_str(arg.trim_end_matches('Z'), format) {
            return Ok(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(arg, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| SearchError::InvalidTime(arg.to_string()))
}

fn parse_duration_ago(arg: &str) -> Option<TimeDelta> {
    let (split, unit) = arg.char_indices().last()?;
    let digits = &arg[..split];
    if digits.is_empty()
        || digits.starts_with('0')
        || !digits.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }
    let n: i64 = digits.parse().ok()?;
    match unit {
        's' => TimeDelta::try_seconds(n),
        'm' => TimeDelta::try_minutes(n),
        'h' => TimeDelta::try_hours(n),
        'd' => TimeDelta::try_days(n),
        _ => None,
    }
}

/// Formats a millisecond duration using its two most significant units,
/// e.g. `8d1h`, `1h30m`, `250ms`.
#[must_use]
pub fn human_duration(ms: i64) -> String {
    const SIZES: [(&str, i64); 4] = [("ms", 1000), ("s", 60), ("m", 60), ("h", 24)];

    if ms == 0 {
        return "0ms".to_string();
    }

    let mut bits: Vec<String> = Vec::new();
    let mut n = ms;
    for (i, (unit, size)) in SIZES.iter().enumerate() {
        let remainder = n % size;
        if remainder == 0 {
            bits.insert(0, String::new());
        } else {
            bits.insert(0, format!("{remainder}{unit}"));
        }
        n /= size;
        if n == 0 {
            break;
        }
        if i == SIZES.len() - 1 {
            bits.insert(0, format!("{n}d"));
            break;
        }
    }
    bits.iter().take(2).map(String::as_str).collect()
}
