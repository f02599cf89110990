use crate::error::SchedulerError;
use async_trait::async_trait;
use chrono::{Days, Local, NaiveDate, NaiveDateTime, Timelike};
use futures::stream::{self, StreamExt};
use std::time::Duration;
use teewatch_config::SchedulerConfig;
use teewatch_models::{RawRecord, TeeTimeRecord};
use teewatch_sources::{FetchError, PageFetcher};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub window_days: u32,
    pub interval: Duration,
    pub penalty_interval: Duration,
    pub fetch_timeout: Duration,
    pub max_concurrent_fetches: usize,
}

impl From<&SchedulerConfig> for SchedulerSettings {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            window_days: config.window_days,
            interval: config.interval(),
            penalty_interval: config.penalty_interval(),
            fetch_timeout: config.fetch_timeout(),
            max_concurrent_fetches: config.max_concurrent_fetches,
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

/// `days` consecutive play dates starting at `today`
pub fn target_dates(today: NaiveDate, days: u32) -> Vec<NaiveDate> {
    (0..days)
        .filter_map(|offset| today.checked_add_days(Days::new(u64::from(offset))))
        .collect()
}

/// A play date that produced no data this cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFetchError {
    pub play_date: NaiveDate,
    pub reason: String,
}

/// Result of one pass over the poll window
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    /// Shared by every record in `batch`
    pub scraped_at: NaiveDateTime,
    pub dates: Vec<NaiveDate>,
    pub batch: Vec<TeeTimeRecord>,
    pub date_errors: Vec<DateFetchError>,
    /// Records discarded because the remaining-teams label had no number
    pub dropped: usize,
}

impl CycleOutcome {
    pub fn fetched_dates(&self) -> usize {
        self.dates.len() - self.date_errors.len()
    }
}

/// Receives every completed cycle, including ones with an empty batch
#[async_trait]
pub trait BatchHandler: Send + Sync {
    async fn handle_batch(&self, outcome: &CycleOutcome) -> anyhow::Result<()>;
}

pub struct PollScheduler<F: PageFetcher> {
    fetcher: F,
    settings: SchedulerSettings,
}

impl<F: PageFetcher> PollScheduler<F> {
    pub fn new(fetcher: F, settings: SchedulerSettings) -> Self {
        Self { fetcher, settings }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub async fn run_cycle(&self) -> Result<CycleOutcome, SchedulerError> {
        self.run_cycle_at(Local::now().naive_local()).await
    }

    /// Poll every date in the window that starts at `now`'s date
    pub async fn run_cycle_at(&self, now: NaiveDateTime) -> Result<CycleOutcome, SchedulerError> {
        let scraped_at = now.with_nanosecond(0).unwrap_or(now);
        let dates = target_dates(scraped_at.date(), self.settings.window_days);
        if dates.is_empty() {
            return Err(SchedulerError::EmptyWindow);
        }

        info!(
            operation = "poll_cycle",
            source = %self.fetcher.source_name(),
            first_date = %dates[0],
            days = dates.len(),
            "Starting poll cycle"
        );

        let mut results = stream::iter(dates.iter().copied())
            .map(|play_date| async move { (play_date, self.fetch_date(play_date).await) })
            .buffered(self.settings.max_concurrent_fetches.max(1));

        let mut batch = Vec::new();
        let mut date_errors = Vec::new();
        let mut dropped = 0;

        while let Some((play_date, result)) = results.next().await {
            match result {
                Ok(raw_records) => {
                    let count = raw_records.len();
                    dropped += collect_records(raw_records, scraped_at, &mut batch);
                    debug!(play_date = %play_date, records = count, "Date fetched");
                }
                Err(e) if e.is_fatal() => {
                    error!(play_date = %play_date, error = %e, "Fatal fetch error, aborting cycle");
                    return Err(SchedulerError::Fatal { play_date, source: e });
                }
                Err(e) => {
                    warn!(play_date = %play_date, error = %e, "Failed to fetch date, skipping");
                    date_errors.push(DateFetchError {
                        play_date,
                        reason: e.to_string(),
                    });
                }
            }
        }
        drop(results);

        let outcome = CycleOutcome {
            scraped_at,
            dates,
            batch,
            date_errors,
            dropped,
        };

        info!(
            operation = "poll_cycle",
            records = outcome.batch.len(),
            fetched_dates = outcome.fetched_dates(),
            failed_dates = outcome.date_errors.len(),
            dropped = outcome.dropped,
            "Poll cycle finished"
        );
        Ok(outcome)
    }

    async fn fetch_date(&self, play_date: NaiveDate) -> Result<Vec<RawRecord>, FetchError> {
        match tokio::time::timeout(self.settings.fetch_timeout, self.fetcher.fetch(play_date)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::transient(format!(
                "timed out after {}s",
                self.settings.fetch_timeout.as_secs()
            ))),
        }
    }

    /// Poll until `shutdown` is cancelled. A started cycle always completes and reaches the handler.
    pub async fn run_forever<H>(&self, handler: &H, shutdown: CancellationToken)
    where
        H: BatchHandler + ?Sized,
    {
        info!(
            interval_secs = self.settings.interval.as_secs(),
            penalty_secs = self.settings.penalty_interval.as_secs(),
            days = self.settings.window_days,
            "Poll loop started"
        );

        while !shutdown.is_cancelled() {
            let pause = match self.run_cycle().await {
                Ok(outcome) => {
                    if let Err(e) = handler.handle_batch(&outcome).await {
                        error!(operation = "handle_batch", error = %e, "Failed to process batch, retrying next cycle");
                    }
                    self.settings.interval
                }
                Err(e) => {
                    error!(
                        operation = "poll_cycle",
                        error = %e,
                        retry_in_secs = self.settings.penalty_interval.as_secs(),
                        "Poll cycle failed"
                    );
                    self.settings.penalty_interval
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(pause) => {}
            }
        }

        info!("Poll loop stopping");
        if let Err(e) = self.fetcher.shutdown().await {
            warn!(error = %e, "Page fetcher did not shut down cleanly");
        }
    }
}

/// Returns how many records were dropped
fn collect_records(raw_records: Vec<RawRecord>, scraped_at: NaiveDateTime, batch: &mut Vec<TeeTimeRecord>) -> usize {
    let mut dropped = 0;
    for raw in raw_records {
        let course = raw.golf_course.clone();
        match raw.into_record(scraped_at) {
            Ok(record) => batch.push(record),
            Err(e) => {
                warn!(course = %course, error = %e, "Dropping record with unreadable remaining teams");
                dropped += 1;
            }
        }
    }
    dropped
}
