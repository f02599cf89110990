use crate::output::Output;
use color_eyre::Result;
use serde_json::json;
use std::sync::Arc;
use teewatch_config::{Config, PathManager};
use teewatch_core::{
    CsvRecordStore, CycleOutcome, MemoryRecordStore, MergeStore, PollScheduler, RecordStore, SchedulerSettings,
    SnapshotHolder,
};
use teewatch_sources::{PageFetcher, TeescannerFetcher};
use tracing::warn;

pub async fn run_poll(mut config: Config, days: Option<u32>, dry_run: bool, output: &Output) -> Result<()> {
    if let Some(days) = days {
        config.scheduler.window_days = days;
    }
    config
        .validate()
        .map_err(|e| color_eyre::eyre::eyre!("Invalid options: {}", e))?;

    let path_manager = PathManager::default();
    path_manager
        .ensure_directories()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to create directories: {}", e))?;
    let store = CsvRecordStore::new(path_manager.store_file(&config));

    let fetcher = TeescannerFetcher::new(config.source.clone(), path_manager.browser_dir());
    let scheduler = PollScheduler::new(fetcher, SchedulerSettings::from(&config.scheduler));

    output.info(format!(
        "Polling {} day(s) from {}...",
        config.scheduler.window_days,
        scheduler.fetcher().source_name()
    ));
    let cycle = scheduler.run_cycle().await;
    if let Err(e) = scheduler.fetcher().shutdown().await {
        warn!(error = %e, "Browser did not shut down cleanly");
    }
    let outcome = cycle.map_err(|e| color_eyre::eyre::eyre!("Poll failed: {}", e))?;

    let snapshots = Arc::new(SnapshotHolder::new());
    let total = if dry_run {
        let existing = store
            .load()
            .map_err(|e| color_eyre::eyre::eyre!("Failed to read {}: {}", store.path().display(), e))?;
        let merge_store = MergeStore::new(MemoryRecordStore::with_records(existing), snapshots);
        merge_store.merge_at(outcome.batch.clone(), outcome.scraped_at).await?.len()
    } else {
        let merge_store = MergeStore::new(store, snapshots);
        merge_store.merge_at(outcome.batch.clone(), outcome.scraped_at).await?.len()
    };

    report(&outcome, total, dry_run, &path_manager.store_file(&config), output);
    Ok(())
}

fn report(outcome: &CycleOutcome, total: usize, dry_run: bool, store_path: &std::path::Path, output: &Output) {
    if !output.is_human() {
        let date_errors: Vec<_> = outcome
            .date_errors
            .iter()
            .map(|e| json!({ "play_date": e.play_date, "reason": e.reason }))
            .collect();
        output.json(&json!({
            "scraped_at": teewatch_models::time_format::format_timestamp(&outcome.scraped_at),
            "dates": outcome.dates,
            "records": outcome.batch.len(),
            "dropped": outcome.dropped,
            "date_errors": date_errors,
            "store_total": total,
            "dry_run": dry_run,
        }));
        return;
    }

    output.success(format!(
        "Fetched {} records for {}/{} dates",
        outcome.batch.len(),
        outcome.fetched_dates(),
        outcome.dates.len()
    ));
    for error in &outcome.date_errors {
        output.warn(format!("{}: {}", error.play_date, error.reason));
    }
    if outcome.dropped > 0 {
        output.warn(format!("{} record(s) dropped: remaining teams not readable", outcome.dropped));
    }
    if dry_run {
        output.info(format!("Dry run: store would hold {} records (unchanged)", total));
    } else {
        output.info(format!("Store holds {} records: {}", total, store_path.display()));
    }
}
