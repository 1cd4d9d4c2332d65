//! Schedule persistence
//!
//! Records are keyed by `(date, region, group)` and stored in SQLite. See
//! [`repository`] for the trait and its implementations.

pub mod repository;

pub use repository::{
    create_mock_repository, create_sqlite_repository, MockScheduleRepository, ScheduleRepository,
    ScheduleWrite, SharedScheduleRepository, SqliteScheduleRepository,
};

use crate::config::DatabaseConfig;
use crate::error::Result;

/// Open the repository described by `config`
pub fn open_repository(config: &DatabaseConfig) -> Result<SharedScheduleRepository> {
    if config.in_memory {
        tracing::warn!("Using in-memory storage; schedules will not survive a restart");
        return Ok(std::sync::Arc::new(SqliteScheduleRepository::in_memory()?));
    }
    create_sqlite_repository(&config.sqlite_path)
}
