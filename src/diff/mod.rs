//! Diff & upsert engine
//!
//! Compares a fresh [`DecodedSchedule`] with what is stored for the same
//! `(date, region, group)` keys, writes what changed, and reports which
//! groups the subscribers should hear about:
//!
//! | stored record        | slots      | written               | reported            |
//! |----------------------|------------|-----------------------|---------------------|
//! | none                 | -          | yes                   | only if date > today |
//! | present              | differ     | yes (slots + as-of)   | yes                 |
//! | present              | equal      | only for a newer as-of | no                 |
//!
//! A first sighting of today's schedule is not reported: on a cold start it
//! would look like every group just flipped. A first sighting of a later
//! day (typically tomorrow) means a new day became known; a past day is a
//! silent backfill.
//!
//! All writes of one decode go through a single batch, so a reader never
//! sees a half-applied update.

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::error::Result;
use crate::models::{ChangeSet, DecodedSchedule, ScheduleKey};
use crate::storage::{ScheduleWrite, SharedScheduleRepository};

/// Applies decoded schedules to a repository
#[derive(Clone)]
pub struct UpsertEngine {
    repository: SharedScheduleRepository,
}

impl UpsertEngine {
    pub fn new(repository: SharedScheduleRepository) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &SharedScheduleRepository {
        &self.repository
    }

    /// Persist `decoded` for `region` and return the changed groups
    ///
    /// `today` is the acquisition-time date in the governing time zone.
    ///
    /// # Errors
    ///
    /// Returns the repository's error if reading or writing fails; in that
    /// case nothing of this decode has been written.
    pub fn apply(
        &self,
        region: &str,
        decoded: &DecodedSchedule,
        today: NaiveDate,
    ) -> Result<ChangeSet> {
        let mut writes = Vec::new();
        let mut changed = Vec::new();

        for (group, slots) in &decoded.per_group {
            let key = ScheduleKey::new(decoded.date, region, group.as_str());

            match self.repository.get(&key)? {
                None => {
                    if decoded.date > today {
                        changed.push(group.clone());
                    }
                    writes.push(ScheduleWrite {
                        key,
                        slots: *slots,
                        as_of_time: decoded.as_of_time,
                    });
                }
                Some(existing) if existing.slots != *slots => {
                    changed.push(group.clone());
                    writes.push(ScheduleWrite {
                        key,
                        slots: *slots,
                        as_of_time: decoded.as_of_time,
                    });
                }
                Some(existing) => {
                    let newer = match (decoded.as_of_time, existing.as_of_time) {
                        (Some(new), Some(old)) => new > old,
                        (Some(_), None) => true,
                        (None, _) => false,
                    };
                    if newer {
                        debug!(key = %key, as_of = ?decoded.as_of_time, "Refreshing as-of time");
                        writes.push(ScheduleWrite {
                            key,
                            slots: existing.slots,
                            as_of_time: decoded.as_of_time,
                        });
                    }
                }
            }
        }

        self.repository.upsert_batch(&writes)?;

        // per_group is a BTreeMap, so groups are already unique and ordered
        let changes = ChangeSet {
            region: region.to_string(),
            date: Some(decoded.date),
            groups: changed,
        };

        info!(
            region = %region,
            date = %decoded.date,
            decoded = decoded.per_group.len(),
            written = writes.len(),
            changed = changes.len(),
            groups = ?changes.groups,
            "Schedule applied"
        );

        Ok(changes)
    }
}
