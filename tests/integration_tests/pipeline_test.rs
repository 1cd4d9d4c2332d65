//! End-to-end update pipeline tests
//!
//! Registry built from configuration → region adapter → HTTP session against
//! a mock server → decoder → upsert engine → repository.

use chrono::NaiveTime;
use wiremock::MockServer;

use super::fixtures::{
    day, harness, mount_page, mount_volyn, test_config, volyn_rows, LVIV_PAGE, LVIV_PAGE_REVISED,
    VOLYN_GROUPS,
};
use crate::common::{kyiv_clock, outage};
use svitlo::models::{DaySlots, TimeSlot};
use svitlo::region::RegionOutcome;

#[tokio::test]
async fn test_markup_region_reports_tomorrow() {
    let server = MockServer::start().await;
    mount_page(&server, "/lviv/", LVIV_PAGE).await;

    let config = test_config(&server.uri());
    let h = harness(&config, kyiv_clock(2026, 3, 14, 20, 0));

    let changes = h.registry.trigger_update("lviv").await.unwrap();

    assert_eq!(changes.region, "lviv");
    assert_eq!(changes.date, Some(day(15)));
    assert_eq!(changes.groups, vec!["1.1", "1.2", "2.1"]);

    let view = h
        .registry
        .get_schedule("lviv", "1.1", day(15))
        .unwrap()
        .unwrap();
    assert_eq!(view.slots, outage(16, 21));
    assert_eq!(view.as_of_time, NaiveTime::from_hms_opt(19, 30, 0));
    assert_eq!(h.repository.count().unwrap(), 3);
}

#[tokio::test]
async fn test_unchanged_source_reports_nothing() {
    let server = MockServer::start().await;
    mount_page(&server, "/lviv/", LVIV_PAGE).await;

    let config = test_config(&server.uri());
    let h = harness(&config, kyiv_clock(2026, 3, 14, 20, 0));

    h.registry.trigger_update("lviv").await.unwrap();
    let changes = h.registry.trigger_update("lviv").await.unwrap();

    assert!(changes.is_empty());
    assert_eq!(h.repository.count().unwrap(), 3);
}

#[tokio::test]
async fn test_revised_source_reports_changed_group_only() {
    let server = MockServer::start().await;
    mount_page(&server, "/lviv/", LVIV_PAGE).await;

    let config = test_config(&server.uri());
    let h = harness(&config, kyiv_clock(2026, 3, 14, 20, 0));
    h.registry.trigger_update("lviv").await.unwrap();

    server.reset().await;
    mount_page(&server, "/lviv/", LVIV_PAGE_REVISED).await;

    let changes = h.registry.trigger_update("lviv").await.unwrap();
    assert_eq!(changes.groups, vec!["2.1"]);

    let revised = h
        .registry
        .get_schedule("lviv", "2.1", day(15))
        .unwrap()
        .unwrap();
    assert_eq!(revised.slots, outage(32, 40));
    assert_eq!(revised.as_of_time, NaiveTime::from_hms_opt(20, 10, 0));

    // Unchanged groups still pick up the newer as-of time
    let untouched = h
        .registry
        .get_schedule("lviv", "1.2", day(15))
        .unwrap()
        .unwrap();
    assert_eq!(untouched.slots, DaySlots::all_on());
    assert_eq!(untouched.as_of_time, NaiveTime::from_hms_opt(20, 10, 0));
}

#[tokio::test]
async fn test_image_region_stores_today_silently() {
    let server = MockServer::start().await;
    mount_volyn(&server).await;

    let config = test_config(&server.uri());
    let h = harness(&config, kyiv_clock(2026, 3, 14, 12, 0));

    // No caption recognition: the schedule is dated by the acquisition date,
    // and a first sighting of today is not news
    let changes = h.registry.trigger_update("volyn").await.unwrap();
    assert!(changes.is_empty());
    assert_eq!(changes.date, Some(day(14)));

    for (group, expected) in VOLYN_GROUPS.iter().zip(volyn_rows()) {
        let view = h
            .registry
            .get_schedule("volyn", group, day(14))
            .unwrap()
            .unwrap();
        assert_eq!(view.slots, expected, "group {group}");
        assert_eq!(view.as_of_time, None);
    }

    assert_eq!(
        h.registry
            .get_schedule("volyn", "2.1", day(14))
            .unwrap()
            .unwrap()
            .slots
            .count(TimeSlot::Off),
        8
    );
}

#[tokio::test]
async fn test_cycle_over_all_regions() {
    let server = MockServer::start().await;
    mount_volyn(&server).await;
    mount_page(&server, "/lviv/", LVIV_PAGE).await;

    let config = test_config(&server.uri());
    let h = harness(&config, kyiv_clock(2026, 3, 14, 20, 0));

    let summary = h.registry.update_all(config.scheduler.region_pause()).await;

    assert!(!summary.has_failures());
    assert_eq!(summary.outcomes.len(), 4);
    assert!(matches!(
        summary.outcome("volyn"),
        Some(RegionOutcome::Updated(c)) if c.is_empty()
    ));
    assert!(matches!(
        summary.outcome("lviv"),
        Some(RegionOutcome::Updated(c)) if c.len() == 3
    ));
    assert_eq!(summary.outcome("kyiv"), Some(&RegionOutcome::Skipped));
    assert_eq!(summary.outcome("rivne"), Some(&RegionOutcome::Skipped));
    assert_eq!(summary.changed_groups(), 3);

    assert_eq!(h.repository.count().unwrap(), 7);
}

#[tokio::test]
async fn test_inactive_regions_are_listed() {
    let config = test_config("http://127.0.0.1:9");
    let h = harness(&config, kyiv_clock(2026, 3, 14, 20, 0));

    assert_eq!(h.registry.list_groups("rivne").unwrap(), vec!["1", "2", "3"]);
    assert!(h
        .registry
        .get_schedule("rivne", "1", day(14))
        .unwrap()
        .is_none());
    assert!(h.registry.trigger_update("rivne").await.unwrap().is_empty());
    assert_eq!(crate::common::CountingResources::count(&h.resources.acquired), 0);
}
