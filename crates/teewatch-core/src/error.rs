use std::path::PathBuf;
use teewatch_sources::FetchError;
use thiserror::Error;

/// Persistence failure; the previously stored set is left untouched
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("invalid row {line} in {path}: {message}")]
    InvalidRow {
        path: PathBuf,
        line: u64,
        message: String,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io { path: path.into(), source }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        StoreError::Csv { path: path.into(), source }
    }
}

/// Cycle-level failure; the poll loop backs off for the penalty interval
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("page fetcher failed for {play_date}: {source}")]
    Fatal {
        play_date: chrono::NaiveDate,
        #[source]
        source: FetchError,
    },
    #[error("poll window is empty")]
    EmptyWindow,
}
