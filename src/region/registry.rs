//! Region registry
//!
//! The fixed set of known regions, built once from configuration, plus the
//! consumer-facing contract that chat and admin layers call.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{error, info, warn};

use super::{build_region, SharedRegion};
use crate::config::Config;
use crate::error::{Error, Result, SvitloErrorTrait};
use crate::fetch::resources::AutomationResources;
use crate::models::{ChangeSet, ScheduleView};
use crate::storage::SharedScheduleRepository;
use crate::utils::clock::Clock;

// ============================================================================
// Update Summary
// ============================================================================

/// Result of updating one region in a cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RegionOutcome {
    /// Update ran; the change set may be empty
    Updated(ChangeSet),

    /// Update raised an error
    Failed { error: String },

    /// Region is inactive
    Skipped,
}

/// Per-region outcomes of one cycle, in registry order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateSummary {
    pub outcomes: Vec<(String, RegionOutcome)>,
}

impl UpdateSummary {
    /// Regions whose update failed
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|(code, outcome)| match outcome {
            RegionOutcome::Failed { error } => Some((code.as_str(), error.as_str())),
            _ => None,
        })
    }

    /// Non-empty change sets
    pub fn changes(&self) -> impl Iterator<Item = &ChangeSet> {
        self.outcomes.iter().filter_map(|(_, outcome)| match outcome {
            RegionOutcome::Updated(changes) if changes.has_changes() => Some(changes),
            _ => None,
        })
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    /// Total changed groups across regions
    pub fn changed_groups(&self) -> usize {
        self.changes().map(ChangeSet::len).sum()
    }

    pub fn outcome(&self, code: &str) -> Option<&RegionOutcome> {
        self.outcomes
            .iter()
            .find(|(c, _)| c == code)
            .map(|(_, outcome)| outcome)
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Known regions in display order
#[derive(Clone)]
pub struct RegionRegistry {
    regions: Vec<SharedRegion>,
}

impl RegionRegistry {
    pub fn new(regions: Vec<SharedRegion>) -> Self {
        Self { regions }
    }

    /// Build every configured region
    pub fn from_config(
        config: &Config,
        repository: SharedScheduleRepository,
        resources: Arc<dyn AutomationResources>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let regions = config
            .regions
            .iter()
            .map(|region| {
                build_region(
                    region,
                    &config.fetch,
                    Arc::clone(&resources),
                    repository.clone(),
                    Arc::clone(&clock),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            regions = regions.len(),
            active = regions.iter().filter(|r| r.is_active()).count(),
            "Region registry ready"
        );

        Ok(Self::new(regions))
    }

    pub fn get(&self, code: &str) -> Option<&SharedRegion> {
        self.regions.iter().find(|r| r.code() == code)
    }

    fn require(&self, code: &str) -> Result<&SharedRegion> {
        self.get(code)
            .ok_or_else(|| Error::UnknownRegion(code.to_string()))
    }

    pub fn all(&self) -> &[SharedRegion] {
        &self.regions
    }

    pub fn active(&self) -> impl Iterator<Item = &SharedRegion> {
        self.regions.iter().filter(|r| r.is_active())
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Group codes of a region, in source order
    pub fn list_groups(&self, code: &str) -> Result<Vec<String>> {
        Ok(self.require(code)?.groups().to_vec())
    }

    /// Stored schedule of one group and day
    pub fn get_schedule(
        &self,
        code: &str,
        group: &str,
        date: NaiveDate,
    ) -> Result<Option<ScheduleView>> {
        self.require(code)?.get_schedule(group, date)
    }

    /// Update one region now
    pub async fn trigger_update(&self, code: &str) -> Result<ChangeSet> {
        self.require(code)?.update().await
    }

    /// Update every active region in order, pausing between regions
    ///
    /// A failing region is recorded and the cycle moves on.
    pub async fn update_all(&self, pause: Duration) -> UpdateSummary {
        let mut summary = UpdateSummary::default();
        let mut first = true;

        for region in &self.regions {
            let code = region.code().to_string();

            if !region.is_active() {
                summary.outcomes.push((code, RegionOutcome::Skipped));
                continue;
            }

            if !first && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            first = false;

            let outcome = match region.update().await {
                Ok(changes) => RegionOutcome::Updated(changes),
                Err(e) => {
                    if e.is_recoverable() {
                        warn!(region = %code, category = e.category().as_str(), error = %e, "Region update failed");
                    } else {
                        error!(region = %code, category = e.category().as_str(), error = %e, "Region update failed");
                    }
                    RegionOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            summary.outcomes.push((code, outcome));
        }

        info!(
            regions = summary.outcomes.len(),
            changed_groups = summary.changed_groups(),
            failed = summary.failures().count(),
            "Update cycle finished"
        );

        summary
    }
}
