mod inspect;
mod update;

use std::sync::Arc;

use anyhow::{Context, Result};

use svitlo::config::Config;
use svitlo::fetch::resources::HttpResources;
use svitlo::region::RegionRegistry;
use svitlo::storage::{open_repository, SharedScheduleRepository};
use svitlo::utils::clock::{Clock, SystemClock};

pub use inspect::{decode, regions, show};
pub use update::{run, update};

/// Everything a command needs, wired from configuration
pub struct App {
    pub repository: SharedScheduleRepository,
    pub registry: RegionRegistry,
    pub clock: Arc<dyn Clock>,
}

impl App {
    pub fn build(config: &Config) -> Result<Self> {
        let repository = open_repository(&config.database).with_context(|| {
            format!(
                "Failed to open database: {}",
                config.database.sqlite_path.display()
            )
        })?;

        let mut resources = HttpResources::new(config.fetch.request_timeout());
        if let Some(dir) = &config.fetch.scratch_dir {
            resources = resources.with_scratch_dir(dir);
        }

        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.tz()?));
        let registry = RegionRegistry::from_config(
            config,
            repository.clone(),
            Arc::new(resources),
            Arc::clone(&clock),
        )
        .context("Failed to build region registry")?;

        Ok(Self {
            repository,
            registry,
            clock,
        })
    }
}
