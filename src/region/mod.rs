//! Region adapters
//!
//! A region is anything that answers the three region questions: which
//! groups exist, what is stored for a group and day, and "update now".
//! [`RegionAdapter`] binds one source's fetcher, decoder and the upsert
//! engine; [`InactiveRegion`] is listed but never fetched.
//!
//! `update()` never fails on the source side. Fetch and decode failures are
//! logged and come back as an empty [`ChangeSet`]; only storage errors reach
//! the caller.

pub mod registry;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::{FetchConfig, RegionConfig, SourceConfig};
use crate::decoder::{
    ImageScheduleDecoder, PixelGridDecoder, ScheduleDecoder, SharedDecoder, TextIntervalDecoder,
};
use crate::diff::UpsertEngine;
use crate::error::Result;
use crate::fetch::resources::AutomationResources;
use crate::fetch::{ArtifactFetcher, ArtifactKind, ArtifactMatcher};
use crate::metadata::ocr::{ImageMetadataReader, TesseractCli};
use crate::models::{ChangeSet, DecodedSchedule, ScheduleKey, ScheduleView};
use crate::storage::SharedScheduleRepository;
use crate::utils::clock::Clock;

pub use registry::{RegionOutcome, RegionRegistry, UpdateSummary};

/// Capability set of one region
#[async_trait]
pub trait Region: Send + Sync {
    /// Unique region code
    fn code(&self) -> &str;

    fn display_name(&self) -> &str;

    fn is_active(&self) -> bool;

    /// Group codes, in source order
    fn groups(&self) -> &[String];

    /// Stored schedule of `group` on `date`
    fn get_schedule(&self, group: &str, date: NaiveDate) -> Result<Option<ScheduleView>>;

    /// Fetch, decode and persist; returns the groups worth announcing
    async fn update(&self) -> Result<ChangeSet>;
}

/// Shared region handle
pub type SharedRegion = Arc<dyn Region>;

/// Static description of a region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionInfo {
    pub code: String,
    pub display_name: String,
    pub groups: Vec<String>,
}

impl RegionInfo {
    pub fn new(code: impl Into<String>, display_name: impl Into<String>, groups: Vec<String>) -> Self {
        Self {
            code: code.into(),
            display_name: display_name.into(),
            groups,
        }
    }
}

impl From<&RegionConfig> for RegionInfo {
    fn from(config: &RegionConfig) -> Self {
        Self::new(&config.code, &config.display_name, config.groups.clone())
    }
}

/// Active region: fetch + decode + persist
pub struct RegionAdapter {
    info: RegionInfo,
    fetcher: ArtifactFetcher,
    decoder: SharedDecoder,
    engine: UpsertEngine,
    clock: Arc<dyn Clock>,
    update_lock: Mutex<()>,
}

impl RegionAdapter {
    pub fn new(
        info: RegionInfo,
        fetcher: ArtifactFetcher,
        decoder: SharedDecoder,
        repository: SharedScheduleRepository,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            info,
            fetcher,
            decoder,
            engine: UpsertEngine::new(repository),
            clock,
            update_lock: Mutex::new(()),
        }
    }

    /// Decode off the async runtime; `None` means "no usable schedule"
    async fn decode(&self, artifact: crate::fetch::Artifact) -> Option<DecodedSchedule> {
        let acquired_at = self.clock.now();
        let decoder = Arc::clone(&self.decoder);
        let name = decoder.name();

        let joined =
            tokio::task::spawn_blocking(move || decoder.decode(&artifact, acquired_at)).await;

        match joined {
            Ok(Ok(decoded)) if decoded.is_empty() => {
                warn!(region = %self.info.code, decoder = name, "Artifact decoded to no groups");
                None
            }
            Ok(Ok(decoded)) => Some(self.known_groups_only(decoded)),
            Ok(Err(e)) => {
                warn!(region = %self.info.code, decoder = name, error = %e, "Decode failed");
                None
            }
            Err(e) => {
                warn!(region = %self.info.code, decoder = name, error = %e, "Decode task aborted");
                None
            }
        }
    }

    fn known_groups_only(&self, mut decoded: DecodedSchedule) -> DecodedSchedule {
        if self.info.groups.is_empty() {
            return decoded;
        }

        let known: HashSet<&str> = self.info.groups.iter().map(String::as_str).collect();
        decoded.per_group.retain(|group, _| {
            let keep = known.contains(group.as_str());
            if !keep {
                debug!(region = %self.info.code, group = %group, "Dropping unknown group");
            }
            keep
        });
        decoded
    }
}

#[async_trait]
impl Region for RegionAdapter {
    fn code(&self) -> &str {
        &self.info.code
    }

    fn display_name(&self) -> &str {
        &self.info.display_name
    }

    fn is_active(&self) -> bool {
        true
    }

    fn groups(&self) -> &[String] {
        &self.info.groups
    }

    fn get_schedule(&self, group: &str, date: NaiveDate) -> Result<Option<ScheduleView>> {
        let key = ScheduleKey::new(date, self.info.code.as_str(), group);
        Ok(self.engine.repository().get(&key)?.map(|record| record.view()))
    }

    #[instrument(skip(self), fields(region = %self.info.code))]
    async fn update(&self) -> Result<ChangeSet> {
        let _guard = self.update_lock.lock().await;

        let artifact = match self.fetcher.fetch().await {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!(error = %e, "No update available");
                return Ok(ChangeSet::empty(self.info.code.as_str()));
            }
        };

        let Some(decoded) = self.decode(artifact).await else {
            return Ok(ChangeSet::empty(self.info.code.as_str()));
        };

        let today = decoded.acquired_at.date_naive();
        let changes = self.engine.apply(&self.info.code, &decoded, today)?;

        if changes.has_changes() {
            info!(date = ?changes.date, groups = ?changes.groups, "Schedule changed");
        }

        Ok(changes)
    }
}

/// Listed region without a working source
pub struct InactiveRegion {
    info: RegionInfo,
}

impl InactiveRegion {
    pub fn new(info: RegionInfo) -> Self {
        Self { info }
    }
}

#[async_trait]
impl Region for InactiveRegion {
    fn code(&self) -> &str {
        &self.info.code
    }

    fn display_name(&self) -> &str {
        &self.info.display_name
    }

    fn is_active(&self) -> bool {
        false
    }

    fn groups(&self) -> &[String] {
        &self.info.groups
    }

    fn get_schedule(&self, _group: &str, _date: NaiveDate) -> Result<Option<ScheduleView>> {
        Ok(None)
    }

    async fn update(&self) -> Result<ChangeSet> {
        debug!(region = %self.info.code, "Skipping inactive region");
        Ok(ChangeSet::empty(self.info.code.as_str()))
    }
}

/// Decoder for a region's source, `None` for regions without one
///
/// # Errors
///
/// Returns `Error::Decode` when the region's text patterns do not compile
pub fn build_decoder(config: &RegionConfig) -> Result<Option<SharedDecoder>> {
    let decoder: SharedDecoder = match &config.source {
        None => return Ok(None),
        Some(SourceConfig::Image { grid, ocr, .. }) => {
            let grid = PixelGridDecoder::new(grid.clone(), config.groups.clone());
            let metadata = ocr.enabled.then(|| {
                ImageMetadataReader::new(Box::new(TesseractCli::new(ocr)), ocr.caption)
            });
            Arc::new(ImageScheduleDecoder::new(grid, metadata))
        }
        Some(SourceConfig::Markup { patterns, .. }) => Arc::new(TextIntervalDecoder::new(patterns)?),
    };
    Ok(Some(decoder))
}

fn artifact_kind(source: &SourceConfig) -> ArtifactKind {
    match source {
        SourceConfig::Image {
            markers, exclude, ..
        } => ArtifactKind::Image(ArtifactMatcher::new(markers, exclude)),
        SourceConfig::Markup { required_text, .. } => ArtifactKind::Markup {
            required_text: required_text.clone(),
        },
    }
}

/// Build the region described by `config`
///
/// Inactive regions and regions without a source become [`InactiveRegion`].
pub fn build_region(
    config: &RegionConfig,
    fetch: &FetchConfig,
    resources: Arc<dyn AutomationResources>,
    repository: SharedScheduleRepository,
    clock: Arc<dyn Clock>,
) -> Result<SharedRegion> {
    let info = RegionInfo::from(config);

    let (Some(source), true) = (&config.source, config.active) else {
        return Ok(Arc::new(InactiveRegion::new(info)));
    };
    let Some(decoder) = build_decoder(config)? else {
        return Ok(Arc::new(InactiveRegion::new(info)));
    };

    let fetcher = ArtifactFetcher::new(&config.url, artifact_kind(source), resources)
        .with_retry(fetch.retry())
        .with_attempt_timeout(fetch.attempt_timeout())
        .with_settle(config.settle())
        .with_headless(fetch.headless)
        .with_user_agent(fetch.user_agent.clone());

    Ok(Arc::new(RegionAdapter::new(
        info, fetcher, decoder, repository, clock,
    )))
}
