//! Core data structures for outage schedules
//!
//! Every decoder produces a [`DecodedSchedule`]; the diff engine and the
//! storage layer consume it and persist one [`ScheduleRecord`] per
//! `(date, region, group)` key.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Number of half-hour slots in a day
pub const SLOTS_PER_DAY: usize = 48;

/// Number of hourly values in a day
pub const HOURS_PER_DAY: usize = 24;

/// Power state of one 30-minute interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeSlot {
    On,
    Off,
    Unknown,
}

impl TimeSlot {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeSlot::On => "on",
            TimeSlot::Off => "off",
            TimeSlot::Unknown => "unknown",
        }
    }

    /// Single-character symbol used by the CLI timeline
    pub fn symbol(&self) -> char {
        match self {
            TimeSlot::On => '+',
            TimeSlot::Off => '-',
            TimeSlot::Unknown => '?',
        }
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Slot index for a wall-clock time: `hour * 2 + (minute >= 30)`.
///
/// `24:00` maps to [`SLOTS_PER_DAY`], which is only meaningful as the
/// exclusive end of an interval.
pub fn slot_index(hour: u32, minute: u32) -> usize {
    let index = hour as usize * 2 + usize::from(minute >= 30);
    index.min(SLOTS_PER_DAY)
}

/// Slot index of a [`NaiveTime`]
pub fn slot_index_of(time: NaiveTime) -> usize {
    slot_index(time.hour(), time.minute())
}

/// Error returned when a slot sequence does not have exactly 48 entries
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected 48 slots, got {0}")]
pub struct SlotCountError(pub usize);

/// One day of power states at half-hour granularity
///
/// The length invariant is enforced by the type: there is no way to build a
/// `DaySlots` with anything other than 48 entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<TimeSlot>", into = "Vec<TimeSlot>")]
pub struct DaySlots([TimeSlot; SLOTS_PER_DAY]);

impl DaySlots {
    /// A day with every slot set to `state`
    pub fn filled(state: TimeSlot) -> Self {
        Self([state; SLOTS_PER_DAY])
    }

    /// A day with power on in every slot
    pub fn all_on() -> Self {
        Self::filled(TimeSlot::On)
    }

    /// Expand hourly values into half-hour slots
    pub fn from_hourly(hours: [TimeSlot; HOURS_PER_DAY]) -> Self {
        let mut slots = [TimeSlot::Unknown; SLOTS_PER_DAY];
        for (hour, state) in hours.iter().enumerate() {
            slots[hour * 2] = *state;
            slots[hour * 2 + 1] = *state;
        }
        Self(slots)
    }

    /// Borrow the slots
    pub fn as_slice(&self) -> &[TimeSlot] {
        &self.0
    }

    /// State of slot `index`, `None` past the end of the day
    pub fn get(&self, index: usize) -> Option<TimeSlot> {
        self.0.get(index).copied()
    }

    /// Set slot `index`; indices past the end of the day are ignored
    pub fn set(&mut self, index: usize, state: TimeSlot) {
        if let Some(slot) = self.0.get_mut(index) {
            *slot = state;
        }
    }

    /// Set every slot in `[start, end)` to `state`; the range is clamped
    pub fn fill_range(&mut self, start: usize, end: usize, state: TimeSlot) {
        let end = end.min(SLOTS_PER_DAY);
        if start >= end {
            return;
        }
        for slot in &mut self.0[start..end] {
            *slot = state;
        }
    }

    /// Count slots in a given state
    pub fn count(&self, state: TimeSlot) -> usize {
        self.0.iter().filter(|s| **s == state).count()
    }

    /// Compact one-line timeline (`+` on, `-` off, `?` unknown)
    pub fn timeline(&self) -> String {
        self.0.iter().map(TimeSlot::symbol).collect()
    }

    /// Whether power goes off within `lead` of `now`
    ///
    /// True when the slot containing `now` is `on` and the slot containing
    /// `now + lead` on the same day is `off`.
    pub fn outage_starts_within(&self, now: NaiveTime, lead: Duration) -> bool {
        let current = slot_index_of(now);
        let (later, wrapped) = now.overflowing_add_signed(lead);
        if wrapped != 0 {
            return false;
        }
        let next = slot_index_of(later);
        if current == next {
            return false;
        }
        self.get(current) == Some(TimeSlot::On) && self.get(next) == Some(TimeSlot::Off)
    }

    /// Serialize to the persisted JSON array form
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse the persisted JSON array form
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl Default for DaySlots {
    fn default() -> Self {
        Self::filled(TimeSlot::Unknown)
    }
}

impl TryFrom<Vec<TimeSlot>> for DaySlots {
    type Error = SlotCountError;

    fn try_from(value: Vec<TimeSlot>) -> Result<Self, Self::Error> {
        let len = value.len();
        let slots: [TimeSlot; SLOTS_PER_DAY] = value.try_into().map_err(|_| SlotCountError(len))?;
        Ok(Self(slots))
    }
}

impl From<DaySlots> for Vec<TimeSlot> {
    fn from(value: DaySlots) -> Self {
        value.0.to_vec()
    }
}

impl From<[TimeSlot; SLOTS_PER_DAY]> for DaySlots {
    fn from(value: [TimeSlot; SLOTS_PER_DAY]) -> Self {
        Self(value)
    }
}

static GROUP_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+)?$").expect("Invalid regex pattern"));

/// Check that a group code looks like `"3"` or `"3.2"`
pub fn is_valid_group_code(code: &str) -> bool {
    GROUP_REGEX.is_match(code)
}

/// Group codes `"1.1"` .. `"{majors}.2"` in grid row order
pub fn paired_group_codes(majors: u32) -> Vec<String> {
    (1..=majors)
        .flat_map(|major| (1..=2).map(move |minor| format!("{major}.{minor}")))
        .collect()
}

/// Result of decoding one artifact
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedSchedule {
    /// Source-reported date, else the acquisition date
    pub date: NaiveDate,

    /// Source-reported update time, if any
    pub as_of_time: Option<NaiveTime>,

    /// When the artifact was acquired, in the governing time zone
    pub acquired_at: DateTime<Tz>,

    /// Group code to day schedule
    pub per_group: BTreeMap<String, DaySlots>,
}

impl DecodedSchedule {
    /// Whether the decode produced no groups at all
    pub fn is_empty(&self) -> bool {
        self.per_group.is_empty()
    }

    /// Number of decoded groups
    pub fn group_count(&self) -> usize {
        self.per_group.len()
    }
}

/// Composite key of a persisted schedule
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScheduleKey {
    pub date: NaiveDate,
    pub region: String,
    pub group: String,
}

impl ScheduleKey {
    /// Create a new key
    pub fn new(date: NaiveDate, region: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            date,
            region: region.into(),
            group: group.into(),
        }
    }
}

impl fmt::Display for ScheduleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.date, self.region, self.group)
    }
}

/// Persisted schedule for one key
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleRecord {
    pub key: ScheduleKey,
    pub slots: DaySlots,
    pub as_of_time: Option<NaiveTime>,
    /// Time of the last write
    pub fetched_at: DateTime<Utc>,
}

impl ScheduleRecord {
    /// Consumer-facing view of this record
    pub fn view(&self) -> ScheduleView {
        ScheduleView {
            slots: self.slots,
            as_of_time: self.as_of_time,
        }
    }
}

/// What chat and admin layers read for one group and day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleView {
    pub slots: DaySlots,
    pub as_of_time: Option<NaiveTime>,
}

/// Groups whose schedule changed in one update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub region: String,
    pub date: Option<NaiveDate>,
    pub groups: Vec<String>,
}

impl ChangeSet {
    /// An empty change set for `region`
    pub fn empty(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            date: None,
            groups: Vec::new(),
        }
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        !self.groups.is_empty()
    }

    /// Number of changed groups
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Whether `group` is part of the change set
    pub fn contains(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}
