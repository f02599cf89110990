use thiserror::Error;

/// Failure to fetch one play date's listing
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Worth retrying on the next cycle; only this date is skipped
    #[error("transient fetch error: {0}")]
    Transient(String),
    /// The fetcher itself is broken (e.g. no browser could be launched)
    #[error("fatal fetch error: {0}")]
    Fatal(String),
}

impl FetchError {
    pub fn transient(message: impl Into<String>) -> Self {
        FetchError::Transient(message.into())
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        FetchError::Fatal(message.into())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::Fatal(_))
    }
}
