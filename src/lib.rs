//! svitlo - power outage schedule tracker
//!
//! Regional utilities publish outage schedules as images or as HTML text.
//! svitlo fetches them, decodes each into a canonical 48-slot day per
//! subscriber group, works out which groups changed, and stores the result.
//!
//! # Architecture
//!
//! - [`models`] - Slots, day schedules, keys and change sets
//! - [`fetch`] - Artifact retrieval with retries and scoped session cleanup
//! - [`decoder`] - Pixel-grid and textual-interval decoders
//! - [`metadata`] - Source date and as-of time recovery (patterns, OCR)
//! - [`diff`] - Change detection and upsert
//! - [`storage`] - SQLite and in-memory repositories
//! - [`region`] - Region adapters and the registry
//! - [`scheduler`] - Periodic update cycle
//! - [`config`] - Configuration management and settings
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use svitlo::config::Config;
//! use svitlo::fetch::resources::HttpResources;
//! use svitlo::region::RegionRegistry;
//! use svitlo::storage::open_repository;
//! use svitlo::utils::clock::SystemClock;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let repository = open_repository(&config.database)?;
//!     let resources = Arc::new(HttpResources::new(config.fetch.request_timeout()));
//!     let clock = Arc::new(SystemClock::new(config.tz()?));
//!
//!     let registry = RegionRegistry::from_config(&config, repository, resources, clock)?;
//!     let changes = registry.trigger_update("volyn").await?;
//!     println!("changed groups: {:?}", changes.groups);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod decoder;
pub mod diff;
pub mod error;
pub mod fetch;
pub mod metadata;
pub mod models;
pub mod region;
pub mod scheduler;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::decoder::{ScheduleDecoder, SharedDecoder};
    pub use crate::error::{Error, ErrorCategory, Result, SvitloErrorTrait};
    pub use crate::fetch::{Artifact, ArtifactFetcher};
    pub use crate::models::{ChangeSet, DaySlots, DecodedSchedule, ScheduleView, TimeSlot};
    pub use crate::region::{Region, RegionRegistry, SharedRegion, UpdateSummary};
    pub use crate::scheduler::UpdateCycle;
    pub use crate::storage::{ScheduleRepository, SharedScheduleRepository};
}

// Direct re-exports for convenience
pub use models::{ChangeSet, DaySlots, TimeSlot};
