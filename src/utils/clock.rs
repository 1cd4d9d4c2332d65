//! Wall-clock access in the governing time zone
//!
//! Fallback dates and "today" are always taken from a [`Clock`] so tests can
//! pin the current instant.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

/// Source of the current instant
pub trait Clock: Send + Sync {
    /// Current instant in the governing time zone
    fn now(&self) -> DateTime<Tz>;

    /// Current calendar date in the governing time zone
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// System clock projected into a fixed zone
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new(chrono_tz::Europe::Kyiv)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }
}

/// Clock frozen at one instant (for testing)
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    instant: DateTime<Tz>,
}

impl FixedClock {
    pub fn new(instant: DateTime<Tz>) -> Self {
        Self { instant }
    }

    /// Frozen at a local wall-clock time in `tz`
    ///
    /// Ambiguous or skipped local times resolve to the earliest valid instant.
    pub fn at_local(tz: Tz, year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Self {
        let instant = tz
            .with_ymd_and_hms(year, month, day, hour, minute, 0)
            .earliest()
            .unwrap_or_else(|| {
                Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
                    .single()
                    .unwrap_or_default()
                    .with_timezone(&tz)
            });
        Self { instant }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Tz> {
        self.instant
    }
}
