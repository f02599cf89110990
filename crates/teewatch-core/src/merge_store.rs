use crate::error::StoreError;
use crate::merge::merge_with_summary;
use crate::snapshot::{CanonicalSnapshot, SnapshotHolder};
use crate::store::RecordStore;
use chrono::{Local, NaiveDateTime};
use std::sync::Arc;
use teewatch_models::TeeTimeRecord;
use tokio::sync::Mutex;
use tracing::{error, info};

/// Merges batches into the persisted history and publishes the result
pub struct MergeStore<S: RecordStore> {
    store: S,
    snapshots: Arc<SnapshotHolder>,
    merge_lock: Mutex<()>,
}

impl<S: RecordStore> MergeStore<S> {
    pub fn new(store: S, snapshots: Arc<SnapshotHolder>) -> Self {
        Self {
            store,
            snapshots,
            merge_lock: Mutex::new(()),
        }
    }

    pub fn snapshots(&self) -> &Arc<SnapshotHolder> {
        &self.snapshots
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Publish the stored history without merging, so readers have data before the first poll
    pub fn load_existing(&self) -> Result<Arc<CanonicalSnapshot>, StoreError> {
        let records = self.store.load()?;
        let updated_at = records.iter().map(|r| r.scraped_at).max();
        Ok(self.snapshots.publish(CanonicalSnapshot { records, updated_at }))
    }

    pub async fn merge(&self, batch: Vec<TeeTimeRecord>) -> Result<Arc<CanonicalSnapshot>, StoreError> {
        self.merge_at(batch, Local::now().naive_local()).await
    }

    /// One merge runs at a time. The snapshot is only published after the store accepted the new set.
    pub async fn merge_at(
        &self,
        batch: Vec<TeeTimeRecord>,
        now: NaiveDateTime,
    ) -> Result<Arc<CanonicalSnapshot>, StoreError> {
        let _guard = self.merge_lock.lock().await;

        let existing = self.store.load()?;
        let batch_size = batch.len();
        let (merged, summary) = merge_with_summary(existing, batch);

        if let Err(e) = self.store.replace(&merged) {
            error!(
                operation = "merge",
                store = %self.store.describe(),
                error = %e,
                "Failed to persist merged records, keeping previous snapshot"
            );
            return Err(e);
        }

        info!(
            operation = "merge",
            batch = batch_size,
            total = summary.total_records,
            courses = summary.unique_courses,
            added = summary.new_keys,
            discarded = summary.discarded,
            first_play_date = ?summary.first_play_date,
            last_play_date = ?summary.last_play_date,
            "Merged batch"
        );

        Ok(self.snapshots.publish(CanonicalSnapshot::new(merged, now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CsvRecordStore, MemoryRecordStore};
    use chrono::NaiveDate;

    struct FailingStore {
        inner: MemoryRecordStore,
    }

    impl RecordStore for FailingStore {
        fn load(&self) -> Result<Vec<TeeTimeRecord>, StoreError> {
            self.inner.load()
        }

        fn replace(&self, _records: &[TeeTimeRecord]) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk full".to_string()))
        }

        fn describe(&self) -> String {
            "failing".to_string()
        }
    }

    /// Reads slowly so two unserialized merges would both see the same history
    struct SlowStore {
        inner: MemoryRecordStore,
        delay: std::time::Duration,
    }

    impl RecordStore for SlowStore {
        fn load(&self) -> Result<Vec<TeeTimeRecord>, StoreError> {
            let records = self.inner.load();
            std::thread::sleep(self.delay);
            records
        }

        fn replace(&self, records: &[TeeTimeRecord]) -> Result<(), StoreError> {
            self.inner.replace(records)
        }

        fn describe(&self) -> String {
            "slow".to_string()
        }
    }

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_hms_opt(hour, 0, 0).unwrap()
    }

    fn record(course: &str, hour: u32, teams: u32) -> TeeTimeRecord {
        TeeTimeRecord {
            scraped_at: at(hour),
            play_date: NaiveDate::from_ymd_opt(2024, 6, 2).unwrap(),
            golf_course: course.to_string(),
            location: "강원 춘천".to_string(),
            price: "150,000원".to_string(),
            rating: "4.5".to_string(),
            remaining_teams: teams,
            play_times: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_merge_persists_and_publishes() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = Arc::new(SnapshotHolder::new());
        let merge_store = MergeStore::new(CsvRecordStore::new(dir.path().join("tee.csv")), snapshots.clone());

        merge_store.merge_at(vec![record("A", 8, 5)], at(8)).await.unwrap();
        let snapshot = merge_store.merge_at(vec![record("A", 9, 3)], at(9)).await.unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.records[0].remaining_teams, 3);
        assert_eq!(snapshots.last_update_time(), Some(at(9)));
        assert_eq!(merge_store.store().load().unwrap(), snapshot.records);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_previous_snapshot() {
        let snapshots = Arc::new(SnapshotHolder::new());
        snapshots.publish(CanonicalSnapshot::new(vec![record("A", 8, 5)], at(8)));
        let merge_store = MergeStore::new(
            FailingStore {
                inner: MemoryRecordStore::with_records(vec![record("A", 8, 5)]),
            },
            snapshots.clone(),
        );

        let result = merge_store.merge_at(vec![record("A", 9, 1)], at(9)).await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        let latest = snapshots.latest();
        assert_eq!(latest.updated_at, Some(at(8)));
        assert_eq!(latest.records[0].remaining_teams, 5);
        assert_eq!(merge_store.store().load().unwrap()[0].remaining_teams, 5);
    }

    #[tokio::test]
    async fn test_empty_batch_still_publishes() {
        let snapshots = Arc::new(SnapshotHolder::new());
        let merge_store = MergeStore::new(MemoryRecordStore::with_records(vec![record("A", 8, 5)]), snapshots.clone());

        let snapshot = merge_store.merge_at(Vec::new(), at(10)).await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshots.last_update_time(), Some(at(10)));
    }

    #[tokio::test]
    async fn test_load_existing_publishes_history() {
        let snapshots = Arc::new(SnapshotHolder::new());
        let merge_store = MergeStore::new(
            MemoryRecordStore::with_records(vec![record("A", 7, 5), record("B", 8, 2)]),
            snapshots.clone(),
        );

        merge_store.load_existing().unwrap();
        assert_eq!(snapshots.latest().len(), 2);
        assert_eq!(snapshots.last_update_time(), Some(at(8)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_merges_keep_both_batches() {
        let merge_store = Arc::new(MergeStore::new(
            SlowStore {
                inner: MemoryRecordStore::new(),
                delay: std::time::Duration::from_millis(50),
            },
            Arc::new(SnapshotHolder::new()),
        ));

        let first = tokio::spawn({
            let merge_store = merge_store.clone();
            async move { merge_store.merge_at(vec![record("A", 8, 5)], at(8)).await }
        });
        let second = tokio::spawn({
            let merge_store = merge_store.clone();
            async move { merge_store.merge_at(vec![record("B", 9, 2)], at(9)).await }
        });
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        let mut courses: Vec<String> = merge_store
            .store()
            .load()
            .unwrap()
            .into_iter()
            .map(|r| r.golf_course)
            .collect();
        courses.sort();
        assert_eq!(courses, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(merge_store.snapshots().latest().len(), 2);
    }

    #[tokio::test]
    async fn test_unreadable_stored_row_does_not_block_merges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tee.csv");
        std::fs::write(
            &path,
            "scraped_at,play_date,golf_course,location,price,rating,remaining_teams,play_time\n\
             2024-06-01 07:00:00,2024-06-02,Broken,강원,0,4.0,정보없음,[]\n\
             2024-06-01 07:00:00,2024-06-02,A,강원,0,4.0,5팀,[]\n",
        )
        .unwrap();
        let snapshots = Arc::new(SnapshotHolder::new());
        let merge_store = MergeStore::new(CsvRecordStore::new(&path), snapshots.clone());

        let snapshot = merge_store.merge_at(vec![record("B", 9, 2)], at(9)).await.unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshots.last_update_time(), Some(at(9)));
        let stored = merge_store.store().load().unwrap();
        assert_eq!(stored, snapshot.records);
        assert!(stored.iter().all(|r| r.golf_course != "Broken"));
    }
}
