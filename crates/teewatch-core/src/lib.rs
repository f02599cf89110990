pub mod alert;
pub mod error;
pub mod merge;
pub mod merge_store;
pub mod monitor;
pub mod scheduler;
pub mod snapshot;
pub mod store;

pub use alert::{AlertEngine, AlertStream};
pub use error::{SchedulerError, StoreError};
pub use merge::{merge_records, merge_with_summary, MergeSummary};
pub use merge_store::MergeStore;
pub use monitor::Monitor;
pub use scheduler::{target_dates, BatchHandler, CycleOutcome, DateFetchError, PollScheduler, SchedulerSettings};
pub use snapshot::{CanonicalSnapshot, SnapshotHolder};
pub use store::{CsvRecordStore, MemoryRecordStore, RecordStore, STORE_COLUMNS};
