use crate::output::Output;
use crate::server::{self, AppState};
use chrono::Local;
use color_eyre::Result;
use std::sync::Arc;
use teewatch_config::{Config, PathManager};
use teewatch_core::{
    AlertEngine, AlertStream, CsvRecordStore, MergeStore, Monitor, PollScheduler, SchedulerSettings, SnapshotHolder,
};
use teewatch_sources::TeescannerFetcher;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct RunOptions {
    pub interval: Option<u64>,
    pub days: Option<u32>,
    pub bind: Option<String>,
    pub no_server: bool,
    pub watch: Vec<String>,
}

impl RunOptions {
    fn apply(&self, config: &mut Config) {
        if let Some(interval) = self.interval {
            config.scheduler.interval_secs = interval;
        }
        if let Some(days) = self.days {
            config.scheduler.window_days = days;
        }
        if let Some(bind) = &self.bind {
            config.server.bind = bind.clone();
        }
        if self.no_server {
            config.server.enabled = false;
        }
    }
}

pub async fn run_monitor(mut config: Config, options: RunOptions, output: &Output) -> Result<()> {
    options.apply(&mut config);
    config
        .validate()
        .map_err(|e| color_eyre::eyre::eyre!("Invalid options: {}", e))?;

    let path_manager = PathManager::default();
    path_manager
        .ensure_directories()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to create directories: {}", e))?;

    let store_path = path_manager.store_file(&config);
    let snapshots = Arc::new(SnapshotHolder::new());
    let merge_store = Arc::new(MergeStore::new(CsvRecordStore::new(&store_path), snapshots.clone()));
    match merge_store.load_existing() {
        Ok(snapshot) => info!(records = snapshot.len(), path = %store_path.display(), "Loaded stored tee times"),
        Err(e) => warn!(error = %e, "Could not read the store, merges will retry every cycle"),
    }

    let alerts = Arc::new(AlertEngine::new(config.alerts.channel_capacity));
    let today = Local::now().date_naive();
    let courses = config.watch.courses.iter().chain(options.watch.iter());
    for course in courses.map(|c| c.trim()).filter(|c| !c.is_empty()) {
        alerts.subscribe_from_snapshot(course, None, &snapshots.latest(), today);
    }

    let shutdown = CancellationToken::new();
    let ctrl_c = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested, finishing current cycle");
                shutdown.cancel();
            }
        })
    };

    let alert_task = tokio::spawn(print_alerts(alerts.events(), *output, shutdown.clone()));

    let server_task = if config.server.enabled {
        let addr = config
            .bind_addr()
            .map_err(|e| color_eyre::eyre::eyre!("{}", e))?;
        let state = AppState {
            snapshots: snapshots.clone(),
            alerts: alerts.clone(),
        };
        let shutdown = shutdown.clone();
        output.info(format!("Serving tee times on http://{}/api/golf-data", addr));
        Some(tokio::spawn(async move {
            if let Err(e) = server::serve(addr, state, shutdown.clone()).await {
                error!(error = %e, "HTTP publisher failed");
                shutdown.cancel();
            }
        }))
    } else {
        None
    };

    output.success(format!(
        "Monitoring {} day(s) every {}s, {} course(s) watched (Ctrl-C to stop)",
        config.scheduler.window_days,
        config.scheduler.interval_secs,
        alerts.len()
    ));

    let scheduler = PollScheduler::new(
        TeescannerFetcher::new(config.source.clone(), path_manager.browser_dir()),
        SchedulerSettings::from(&config.scheduler),
    );
    let monitor = Monitor::new(merge_store, alerts.clone());
    scheduler.run_forever(&monitor, shutdown.clone()).await;

    shutdown.cancel();
    ctrl_c.abort();
    if let Some(task) = server_task {
        let _ = task.await;
    }
    let _ = alert_task.await;

    output.success("Monitor stopped");
    Ok(())
}

async fn print_alerts(mut events: AlertStream, output: Output, shutdown: CancellationToken) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.next() => event,
        };
        let Some(event) = event else { break };

        let date = event
            .play_date
            .map(|d| format!(" on {}", d))
            .unwrap_or_default();
        let message = format!(
            "{}{}: {} -> {} teams left ({} booked) {}",
            event.course_name,
            date,
            event.previous_slots,
            event.current_slots,
            event.booked(),
            event.play_time
        );
        output.alert(message.trim_end(), &serde_json::to_value(&event).unwrap_or_default());
    }
}
