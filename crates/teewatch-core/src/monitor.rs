use crate::alert::AlertEngine;
use crate::merge_store::MergeStore;
use crate::scheduler::{BatchHandler, CycleOutcome};
use crate::snapshot::SnapshotHolder;
use crate::store::RecordStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Merges each cycle's batch and feeds the resulting snapshot to the alert engine
pub struct Monitor<S: RecordStore> {
    merge_store: Arc<MergeStore<S>>,
    alerts: Arc<AlertEngine>,
}

impl<S: RecordStore> Monitor<S> {
    pub fn new(merge_store: Arc<MergeStore<S>>, alerts: Arc<AlertEngine>) -> Self {
        Self { merge_store, alerts }
    }

    pub fn snapshots(&self) -> &Arc<SnapshotHolder> {
        self.merge_store.snapshots()
    }

    pub fn alerts(&self) -> &Arc<AlertEngine> {
        &self.alerts
    }
}

#[async_trait]
impl<S: RecordStore> BatchHandler for Monitor<S> {
    async fn handle_batch(&self, outcome: &CycleOutcome) -> anyhow::Result<()> {
        let snapshot = self
            .merge_store
            .merge_at(outcome.batch.clone(), outcome.scraped_at)
            .await?;

        let events = self.alerts.observe_snapshot(&snapshot, outcome.scraped_at.date());
        debug!(
            records = snapshot.len(),
            watched = self.alerts.len(),
            alerts = events.len(),
            "Batch handled"
        );
        Ok(())
    }
}
