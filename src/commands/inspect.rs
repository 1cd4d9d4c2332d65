use std::path::Path;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};

use svitlo::config::{Config, SourceConfig};
use svitlo::decoder::ScheduleDecoder;
use svitlo::fetch::Artifact;
use svitlo::models::{DaySlots, ScheduleView, TimeSlot, SLOTS_PER_DAY};
use svitlo::region::build_decoder;
use svitlo::utils::clock::{Clock, SystemClock};
use svitlo::utils::decode_markup;

use super::App;

pub fn regions(config: &Config) -> Result<()> {
    println!("{:<8} {:<24} {:<8} GROUPS", "CODE", "NAME", "STATUS");
    for region in &config.regions {
        let status = if region.active { "active" } else { "inactive" };
        println!(
            "{:<8} {:<24} {:<8} {}",
            region.code,
            region.display_name,
            status,
            region.groups.join(" ")
        );
    }
    Ok(())
}

pub fn show(
    config: &Config,
    region: &str,
    group: Option<&str>,
    date: Option<NaiveDate>,
) -> Result<()> {
    let app = App::build(config)?;
    let now = app.clock.now();
    let date = date.unwrap_or_else(|| now.date_naive());
    let alert_time = (date == now.date_naive()).then(|| now.time());

    let Some(group) = group else {
        let known = app.registry.list_groups(region)?;
        let records = app.repository.list_for_date(region, date)?;
        if records.is_empty() {
            println!("{region} {date}: no schedules stored ({} groups known)", known.len());
        }
        for record in records {
            println!();
            print_view(config, region, &record.key.group, date, &record.view(), alert_time);
        }
        return Ok(());
    };

    match app.registry.get_schedule(region, group, date)? {
        Some(view) => print_view(config, region, group, date, &view, alert_time),
        None => println!("{region} {group} {date}: no schedule stored"),
    }

    Ok(())
}

fn print_view(
    config: &Config,
    region: &str,
    group: &str,
    date: NaiveDate,
    view: &ScheduleView,
    alert_time: Option<NaiveTime>,
) {
    println!("{region} group {group}, {date}");
    match view.as_of_time {
        Some(as_of) => println!("As of: {}", as_of.format("%H:%M")),
        None => println!("As of: not reported"),
    }
    print_slots(&view.slots);

    if alert_time.is_some_and(|now| {
        view.slots
            .outage_starts_within(now, config.scheduler.alert_lead())
    }) {
        println!(
            "Power goes off within {} minutes",
            config.scheduler.alert_lead_mins
        );
    }
}

pub async fn decode(config: &Config, region: &str, file: &Path) -> Result<()> {
    let region_config = config
        .region(region)
        .with_context(|| format!("Unknown region: {region}"))?;
    let decoder = build_decoder(region_config)?
        .with_context(|| format!("Region {region} has no source to decode"))?;

    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let source_url = file.display().to_string();

    let artifact = match &region_config.source {
        Some(SourceConfig::Image { .. }) => Artifact::image(bytes, source_url),
        _ => Artifact::markup(decode_markup(&bytes, "")?, source_url),
    };

    let acquired_at = SystemClock::new(config.tz()?).now();
    let decoded = tokio::task::spawn_blocking(move || decoder.decode(&artifact, acquired_at))
        .await
        .context("Decode task failed")??;

    println!("Date: {}", decoded.date);
    match decoded.as_of_time {
        Some(as_of) => println!("As of: {}", as_of.format("%H:%M")),
        None => println!("As of: not reported"),
    }
    println!("Groups: {}", decoded.group_count());
    for (group, slots) in &decoded.per_group {
        println!();
        println!("Group {group}");
        print_slots(slots);
    }

    Ok(())
}

fn print_slots(slots: &DaySlots) {
    println!("{}", hour_ruler());
    println!("{}", slots.timeline());

    let ranges = off_ranges(slots);
    if ranges.is_empty() {
        println!("No outages");
    }
    for (start, end) in ranges {
        println!("Off {}-{}", slot_label(start), slot_label(end));
    }

    let unknown = slots.count(TimeSlot::Unknown);
    if unknown > 0 {
        println!("Unknown slots: {unknown}");
    }
}

/// One label every three hours, aligned with the timeline
fn hour_ruler() -> String {
    (0..SLOTS_PER_DAY / 6)
        .map(|i| format!("{:<6}", format!("{:02}", i * 3)))
        .collect()
}

/// Maximal runs of off slots as `[start, end)` slot indices
fn off_ranges(slots: &DaySlots) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut start = None;

    for (i, slot) in slots.as_slice().iter().enumerate() {
        match (slot, start) {
            (TimeSlot::Off, None) => start = Some(i),
            (TimeSlot::Off, Some(_)) => {}
            (_, Some(s)) => {
                ranges.push((s, i));
                start = None;
            }
            (_, None) => {}
        }
    }
    if let Some(s) = start {
        ranges.push((s, SLOTS_PER_DAY));
    }

    ranges
}

fn slot_label(index: usize) -> String {
    format!("{:02}:{:02}", index / 2, (index % 2) * 30)
}
