//! Test fixtures for integration tests
//!
//! Provides sample source pages and helpers that wire a registry against a
//! mock server.

use std::sync::Arc;

use chrono::NaiveDate;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{grid_png, outage, small_layout, strings, CountingResources};
use svitlo::config::{Config, SourceConfig};
use svitlo::error::{Error, Result};
use svitlo::metadata::ocr::OcrConfig;
use svitlo::models::{DaySlots, ScheduleKey, ScheduleRecord};
use svitlo::region::RegionRegistry;
use svitlo::storage::{
    create_mock_repository, ScheduleRepository, ScheduleWrite, SharedScheduleRepository,
};
use svitlo::utils::clock::Clock;

/// Lviv-style page dated 15.03.2026
pub const LVIV_PAGE: &str = r#"<!DOCTYPE html>
<html lang="uk">
<head><meta charset="UTF-8"><title>Графік</title></head>
<body>
    <h2>Графік погодинних відключень на 15.03.2026</h2>
    <p>Інформація станом на 19:30</p>
    <div class="group">Група 1.1. Електроенергії немає з 08:00 до 10:30.</div>
    <div class="group">Група 1.2. Електроенергія є.</div>
    <div class="group">Група 2.1. Електроенергії немає з 14:00 до 18:00.</div>
</body>
</html>
"#;

/// Same page after the utility moved group 2.1's outage
pub const LVIV_PAGE_REVISED: &str = r#"<!DOCTYPE html>
<html lang="uk">
<body>
    <h2>Графік погодинних відключень на 15.03.2026</h2>
    <p>Інформація станом на 20:10</p>
    <div class="group">Група 1.1. Електроенергії немає з 08:00 до 10:30.</div>
    <div class="group">Група 1.2. Електроенергія є.</div>
    <div class="group">Група 2.1. Електроенергії немає з 16:00 до 20:00.</div>
</body>
</html>
"#;

/// Volyn-style page embedding the schedule image
pub const VOLYN_PAGE: &str = r#"<!DOCTYPE html>
<html><body>
    <img src="/static/logo.png">
    <img src="/upload/GPV-today.png">
</body></html>
"#;

pub const VOLYN_GROUPS: [&str; 4] = ["1.1", "1.2", "2.1", "2.2"];

/// Rows drawn into the synthetic Volyn image
pub fn volyn_rows() -> Vec<DaySlots> {
    vec![
        outage(0, 8),
        DaySlots::all_on(),
        outage(24, 32),
        outage(40, 48),
    ]
}

pub fn volyn_png() -> Vec<u8> {
    grid_png(&small_layout(), &volyn_rows(), 110, 80)
}

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
}

/// Default configuration pointed at `base`, with fast retries and in-memory storage
pub fn test_config(base: &str) -> Config {
    let mut config = Config::default();
    config.fetch.max_attempts = 3;
    config.fetch.backoff_secs = 0;
    config.fetch.attempt_timeout_secs = 10;
    config.fetch.request_timeout_secs = 5;
    config.scheduler.region_pause_secs = 0;
    config.database.in_memory = true;

    for region in &mut config.regions {
        match region.code.as_str() {
            "volyn" => {
                region.url = format!("{base}/volyn/");
                region.settle_secs = 0;
                region.groups = strings(&VOLYN_GROUPS);
                region.source = Some(SourceConfig::Image {
                    markers: strings(&["GPV", "grafik"]),
                    exclude: strings(&["logo"]),
                    grid: small_layout(),
                    ocr: OcrConfig {
                        enabled: false,
                        ..OcrConfig::default()
                    },
                });
            }
            "lviv" => {
                region.url = format!("{base}/lviv/");
                region.settle_secs = 0;
            }
            _ => {}
        }
    }

    config
        .validate()
        .expect("test configuration should be valid");
    config
}

pub async fn mount_page(server: &MockServer, at: &str, html: &str) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string(html),
        )
        .mount(server)
        .await;
}

pub async fn mount_volyn(server: &MockServer) {
    mount_page(server, "/volyn/", VOLYN_PAGE).await;
    Mock::given(method("GET"))
        .and(path("/upload/GPV-today.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(volyn_png()),
        )
        .mount(server)
        .await;
}

pub struct Harness {
    pub registry: RegionRegistry,
    pub repository: SharedScheduleRepository,
    pub resources: Arc<CountingResources>,
}

pub fn harness(config: &Config, clock: Arc<dyn Clock>) -> Harness {
    harness_with(config, clock, create_mock_repository())
}

pub fn harness_with(
    config: &Config,
    clock: Arc<dyn Clock>,
    repository: SharedScheduleRepository,
) -> Harness {
    let resources = Arc::new(CountingResources::default());
    let registry = RegionRegistry::from_config(
        config,
        repository.clone(),
        resources.clone(),
        clock,
    )
    .expect("registry should build");

    Harness {
        registry,
        repository,
        resources,
    }
}

/// Repository whose reads work but whose writes always fail
#[derive(Default)]
pub struct ReadOnlyRepository;

impl ScheduleRepository for ReadOnlyRepository {
    fn get(&self, _key: &ScheduleKey) -> Result<Option<ScheduleRecord>> {
        Ok(None)
    }

    fn upsert_batch(&self, writes: &[ScheduleWrite]) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }
        Err(Error::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_READONLY),
            Some("attempt to write a readonly database".to_string()),
        )))
    }

    fn list_for_date(&self, _region: &str, _date: NaiveDate) -> Result<Vec<ScheduleRecord>> {
        Ok(Vec::new())
    }

    fn count(&self) -> Result<usize> {
        Ok(0)
    }
}
