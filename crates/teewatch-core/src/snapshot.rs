use chrono::NaiveDateTime;
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use teewatch_models::TeeTimeRecord;

/// Deduplicated record set published after a successful merge
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CanonicalSnapshot {
    pub records: Vec<TeeTimeRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<NaiveDateTime>,
}

impl CanonicalSnapshot {
    pub fn new(records: Vec<TeeTimeRecord>, updated_at: NaiveDateTime) -> Self {
        Self {
            records,
            updated_at: Some(updated_at),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Latest published snapshot, shared between the poll loop and readers
#[derive(Debug, Default)]
pub struct SnapshotHolder {
    current: RwLock<Arc<CanonicalSnapshot>>,
}

impl SnapshotHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty until the first successful merge
    pub fn latest(&self) -> Arc<CanonicalSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_update_time(&self) -> Option<NaiveDateTime> {
        self.latest().updated_at
    }

    pub fn publish(&self, snapshot: CanonicalSnapshot) -> Arc<CanonicalSnapshot> {
        let snapshot = Arc::new(snapshot);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = snapshot.clone();
        snapshot
    }
}
