use async_trait::async_trait;
use chrono::NaiveDate;
use teewatch_models::RawRecord;
use crate::error::FetchError;

#[async_trait]
pub trait PageFetcher: Send + Sync {
    fn source_name(&self) -> &str;

    /// Fetch every listing for one play date. An empty result means no availability.
    async fn fetch(&self, play_date: NaiveDate) -> Result<Vec<RawRecord>, FetchError>;

    // Cleanup/shutdown (optional - default implementation does nothing)
    // Called when the poll loop stops to free resources (e.g., close browser instances)
    async fn shutdown(&self) -> Result<(), FetchError> {
        Ok(())
    }
}
