//! Error scenario integration tests
//!
//! Tests failure modes and how far they travel:
//! 1. Sources that keep failing
//! 2. Unreachable sources
//! 3. Undecodable artifacts
//! 4. Missing source metadata
//! 5. Storage failures

use std::sync::Arc;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::fixtures::{day, harness, harness_with, mount_page, test_config, ReadOnlyRepository};
use crate::common::{kyiv_clock, CountingResources};
use svitlo::error::{Error, ErrorCategory, SvitloErrorTrait};
use svitlo::models::DaySlots;
use svitlo::region::RegionOutcome;

// ============================================================================
// Source Failures
// ============================================================================

#[tokio::test]
async fn test_three_failed_fetches_yield_empty_change_set() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lviv/"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let config = test_config(&server.uri());
    let h = harness(&config, kyiv_clock(2026, 3, 14, 20, 0));

    let changes = h.registry.trigger_update("lviv").await.unwrap();

    assert!(changes.is_empty());
    assert_eq!(changes.date, None);
    assert_eq!(h.repository.count().unwrap(), 0);
    assert_eq!(CountingResources::count(&h.resources.acquired), 3);
    assert_eq!(CountingResources::count(&h.resources.released), 3);
}

#[tokio::test]
async fn test_unreachable_source_yields_empty_change_set() {
    // Nothing listens on the discard port
    let config = test_config("http://127.0.0.1:9");
    let h = harness(&config, kyiv_clock(2026, 3, 14, 20, 0));

    let summary = h.registry.update_all(config.scheduler.region_pause()).await;

    assert!(!summary.has_failures());
    assert_eq!(summary.changed_groups(), 0);
    assert_eq!(h.repository.count().unwrap(), 0);
}

#[tokio::test]
async fn test_undecodable_image_yields_empty_change_set() {
    let server = MockServer::start().await;
    mount_page(&server, "/volyn/", r#"<img src="/upload/GPV.png">"#).await;
    Mock::given(method("GET"))
        .and(path("/upload/GPV.png"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>moved</html>"))
        .mount(&server)
        .await;

    let config = test_config(&server.uri());
    let h = harness(&config, kyiv_clock(2026, 3, 14, 20, 0));

    assert!(h.registry.trigger_update("volyn").await.unwrap().is_empty());
    assert_eq!(h.repository.count().unwrap(), 0);
}

#[tokio::test]
async fn test_page_without_schedule_yields_empty_change_set() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/lviv/",
        "<p>Група сайту тимчасово недоступна</p>",
    )
    .await;

    let config = test_config(&server.uri());
    let h = harness(&config, kyiv_clock(2026, 3, 14, 20, 0));

    assert!(h.registry.trigger_update("lviv").await.unwrap().is_empty());
    assert_eq!(h.repository.count().unwrap(), 0);
}

// ============================================================================
// Metadata Fallback
// ============================================================================

#[tokio::test]
async fn test_missing_metadata_falls_back_to_acquisition_date() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/lviv/",
        "<div>Група 1.1. Електроенергія є.</div><div>Група 1.2. Електроенергія є.</div>",
    )
    .await;

    let config = test_config(&server.uri());
    let h = harness(&config, kyiv_clock(2026, 3, 14, 23, 50));

    let changes = h.registry.trigger_update("lviv").await.unwrap();
    // Dated today by the fallback, so nothing to announce
    assert!(changes.is_empty());
    assert_eq!(changes.date, Some(day(14)));

    let view = h
        .registry
        .get_schedule("lviv", "1.1", day(14))
        .unwrap()
        .unwrap();
    assert_eq!(view.as_of_time, None);
    assert_eq!(view.slots, DaySlots::all_on());
}

// ============================================================================
// Storage Failures
// ============================================================================

#[tokio::test]
async fn test_storage_failure_propagates() {
    let server = MockServer::start().await;
    mount_page(&server, "/lviv/", super::fixtures::LVIV_PAGE).await;

    let config = test_config(&server.uri());
    let h = harness_with(
        &config,
        kyiv_clock(2026, 3, 14, 20, 0),
        Arc::new(ReadOnlyRepository),
    );

    let err = h.registry.trigger_update("lviv").await.unwrap_err();
    assert!(matches!(err, Error::Database(_)));
    assert_eq!(err.category(), ErrorCategory::Storage);
}

#[tokio::test]
async fn test_storage_failure_reported_per_region() {
    let server = MockServer::start().await;
    mount_page(&server, "/lviv/", super::fixtures::LVIV_PAGE).await;

    let config = test_config(&server.uri());
    let h = harness_with(
        &config,
        kyiv_clock(2026, 3, 14, 20, 0),
        Arc::new(ReadOnlyRepository),
    );

    let summary = h.registry.update_all(config.scheduler.region_pause()).await;

    // Volyn has no page on the mock server: no update, but no failure either
    assert!(matches!(
        summary.outcome("volyn"),
        Some(RegionOutcome::Updated(c)) if c.is_empty()
    ));
    assert!(matches!(summary.outcome("lviv"), Some(RegionOutcome::Failed { .. })));
    assert_eq!(summary.outcome("rivne"), Some(&RegionOutcome::Skipped));
    assert_eq!(summary.failures().count(), 1);
}

#[tokio::test]
async fn test_unknown_region() {
    let config = test_config("http://127.0.0.1:9");
    let h = harness(&config, kyiv_clock(2026, 3, 14, 20, 0));

    let err = h.registry.trigger_update("odesa").await.unwrap_err();
    assert!(matches!(err, Error::UnknownRegion(ref code) if code == "odesa"));
    assert!(!err.is_recoverable());
}
