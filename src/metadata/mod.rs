//! Source metadata recovery
//!
//! Sources print the date their schedule applies to (`DD.MM.YYYY`) and the
//! time they last updated it (`HH:MM`). Both are optional: a miss is never an
//! error, and the date falls back to the acquisition date in the governing
//! time zone.

pub mod ocr;

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveTime};
use chrono_tz::Tz;
use regex::Regex;

static DATE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2})\.(\d{2})\.(\d{4})").expect("Invalid regex pattern"));

static TIME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2}):(\d{2})").expect("Invalid regex pattern"));

/// Date and update time as reported by the source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceMetadata {
    pub date: Option<NaiveDate>,
    pub as_of_time: Option<NaiveTime>,
}

impl SourceMetadata {
    /// First date and first time found anywhere in `text`
    pub fn from_text(text: &str) -> Self {
        let text = flatten(text);
        Self {
            date: find_date(&text),
            as_of_time: find_time(&text),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.date.is_none() && self.as_of_time.is_none()
    }

    /// Reported date, else the acquisition date
    pub fn date_or(&self, acquired_at: &DateTime<Tz>) -> NaiveDate {
        self.date.unwrap_or_else(|| acquired_at.date_naive())
    }
}

/// First valid `DD.MM.YYYY` calendar date in `text`
///
/// Matches that are not a real calendar date (e.g. `31.02.2026`) are skipped.
pub fn find_date(text: &str) -> Option<NaiveDate> {
    DATE_REGEX.captures_iter(text).find_map(|caps| {
        let day = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let year = caps[3].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

/// First valid `HH:MM` clock time in `text`
pub fn find_time(text: &str) -> Option<NaiveTime> {
    TIME_REGEX.captures_iter(text).find_map(|caps| {
        let hour = caps[1].parse().ok()?;
        let minute = caps[2].parse().ok()?;
        NaiveTime::from_hms_opt(hour, minute, 0)
    })
}

/// Collapse line breaks so patterns split across lines still match
pub fn flatten(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}
