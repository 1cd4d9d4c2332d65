use anyhow::Result;

use svitlo::config::Config;
use svitlo::models::ChangeSet;
use svitlo::region::{RegionOutcome, UpdateSummary};
use svitlo::scheduler::UpdateCycle;

use super::App;

pub async fn update(config: &Config, region: Option<&str>) -> Result<()> {
    let app = App::build(config)?;

    match region {
        Some(code) => {
            let changes = app.registry.trigger_update(code).await?;
            print_changes(code, &changes);
        }
        None => {
            let summary = app
                .registry
                .update_all(config.scheduler.region_pause())
                .await;
            print_summary(&summary);
            if summary.has_failures() {
                anyhow::bail!("{} region(s) failed to update", summary.failures().count());
            }
        }
    }

    Ok(())
}

pub async fn run(config: &Config) -> Result<()> {
    let app = App::build(config)?;
    let cycle = UpdateCycle::new(app.registry, &config.scheduler);

    let mut changes = cycle.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(set) = changes.recv().await {
            print_changes(&set.region, &set);
        }
    });

    println!(
        "Updating every {}s, Ctrl-C to stop",
        config.scheduler.update_interval_secs
    );
    let cycles = cycle.run().await;
    drop(cycle);
    printer.abort();

    println!("Stopped after {cycles} cycle(s)");
    Ok(())
}

fn print_changes(code: &str, changes: &ChangeSet) {
    match changes.date {
        Some(date) if changes.has_changes() => {
            println!("{code} {date}: changed {}", changes.groups.join(", "));
        }
        Some(date) => println!("{code} {date}: no changes"),
        None => println!("{code}: no update available"),
    }
}

fn print_summary(summary: &UpdateSummary) {
    println!("Update summary");
    println!("==============");
    for (code, outcome) in &summary.outcomes {
        match outcome {
            RegionOutcome::Updated(changes) => print_changes(code, changes),
            RegionOutcome::Failed { error } => println!("{code}: FAILED: {error}"),
            RegionOutcome::Skipped => println!("{code}: inactive"),
        }
    }
    println!("Changed groups: {}", summary.changed_groups());
}
