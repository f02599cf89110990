use crate::error::StoreError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use teewatch_models::time_format::{format_timestamp, parse_timestamp};
use teewatch_models::{parse_remaining_teams, TeeTimeRecord, PLAY_DATE_FORMAT};
use tracing::{debug, info, warn};

/// Column order of the persisted table
pub const STORE_COLUMNS: [&str; 8] = [
    "scraped_at",
    "play_date",
    "golf_course",
    "location",
    "price",
    "rating",
    "remaining_teams",
    "play_time",
];

/// Tabular store holding the canonical record set
pub trait RecordStore: Send + Sync {
    /// Load the stored set; a store that was never written is empty
    fn load(&self) -> Result<Vec<TeeTimeRecord>, StoreError>;

    /// Replace the stored set as a whole. On error the previous set must remain readable.
    fn replace(&self, records: &[TeeTimeRecord]) -> Result<(), StoreError>;

    fn describe(&self) -> String;
}

#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    scraped_at: String,
    play_date: String,
    golf_course: String,
    location: String,
    price: String,
    rating: String,
    remaining_teams: String,
    play_time: String,
}

impl CsvRow {
    fn from_record(record: &TeeTimeRecord) -> Self {
        Self {
            scraped_at: format_timestamp(&record.scraped_at),
            play_date: record.play_date.format(PLAY_DATE_FORMAT).to_string(),
            golf_course: record.golf_course.clone(),
            location: record.location.clone(),
            price: record.price.clone(),
            rating: record.rating.clone(),
            remaining_teams: record.remaining_teams.to_string(),
            play_time: serde_json::to_string(&record.play_times).unwrap_or_else(|_| "[]".to_string()),
        }
    }

    fn into_record(self) -> Result<TeeTimeRecord, String> {
        let scraped_at = parse_timestamp(&self.scraped_at)
            .map_err(|e| format!("bad scraped_at '{}': {}", self.scraped_at, e))?;
        let play_date = NaiveDate::parse_from_str(self.play_date.trim(), PLAY_DATE_FORMAT)
            .map_err(|e| format!("bad play_date '{}': {}", self.play_date, e))?;
        // Older files kept the page label ("3팀"), newer ones the bare count
        let remaining_teams = parse_remaining_teams(&self.remaining_teams).map_err(|e| e.to_string())?;

        Ok(TeeTimeRecord {
            scraped_at,
            play_date,
            golf_course: self.golf_course,
            location: self.location,
            price: self.price,
            rating: self.rating,
            remaining_teams,
            play_times: parse_play_times(&self.play_time),
        })
    }
}

/// `play_time` holds a JSON array; a bare label from older files becomes one entry
fn parse_play_times(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    serde_json::from_str::<Vec<String>>(trimmed).unwrap_or_else(|_| vec![trimmed.to_string()])
}

/// CSV file replaced atomically (temp file + rename) on every write
pub struct CsvRecordStore {
    path: PathBuf,
}

impl CsvRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn encode(&self, records: &[TeeTimeRecord]) -> Result<Vec<u8>, StoreError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer
            .write_record(STORE_COLUMNS)
            .map_err(|e| StoreError::csv(&self.path, e))?;
        for record in records {
            writer
                .serialize(CsvRow::from_record(record))
                .map_err(|e| StoreError::csv(&self.path, e))?;
        }
        writer
            .into_inner()
            .map_err(|e| StoreError::io(&self.path, e.into_error()))
    }
}

impl RecordStore for CsvRecordStore {
    /// Rows that cannot be read are skipped with a warning and dropped on the next write
    fn load(&self) -> Result<Vec<TeeTimeRecord>, StoreError> {
        if !self.path.exists() {
            debug!("Store file {:?} does not exist, starting with empty history", self.path);
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&self.path).map_err(|e| StoreError::csv(&self.path, e))?;
        let mut records = Vec::new();
        let mut skipped = 0usize;

        for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
            let line = index as u64 + 2; // 1-based, after the header
            let row = match result {
                Ok(row) => row,
                Err(e) if e.is_io_error() => return Err(StoreError::csv(&self.path, e)),
                Err(e) => {
                    skipped += 1;
                    warn!(operation = "store_load", line, error = %e, "Skipping malformed row");
                    continue;
                }
            };
            match row.into_record() {
                Ok(record) => records.push(record),
                Err(message) => {
                    skipped += 1;
                    let e = StoreError::InvalidRow {
                        path: self.path.clone(),
                        line,
                        message,
                    };
                    warn!(operation = "store_load", error = %e, "Skipping unreadable row");
                }
            }
        }

        if skipped > 0 {
            warn!(
                operation = "store_load",
                skipped,
                loaded = records.len(),
                path = %self.path.display(),
                "Stored rows could not be read"
            );
        }
        debug!("Loaded {} records from {:?}", records.len(), self.path);
        Ok(records)
    }

    fn replace(&self, records: &[TeeTimeRecord]) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let encoded = self.encode(records)?;

        // Atomic write: unique temp file next to the target, then rename.
        // The temp file is removed if anything below fails.
        let mut temp = tempfile::Builder::new()
            .prefix(".teewatch-")
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(|e| StoreError::io(&dir, e))?;
        let written = temp.write_all(&encoded).and_then(|()| temp.as_file().sync_all());
        if let Err(e) = written {
            return Err(StoreError::io(temp.path(), e));
        }

        temp.persist(&self.path).map_err(|e| {
            warn!("Failed to move {:?} into place: {}", e.file.path(), e.error);
            StoreError::io(&self.path, e.error)
        })?;

        info!(
            operation = "store_replace",
            records = records.len(),
            path = %self.path.display(),
            "Store written"
        );
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory store for dry runs and tests
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<Vec<TeeTimeRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<TeeTimeRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }
}

impl RecordStore for MemoryRecordStore {
    fn load(&self) -> Result<Vec<TeeTimeRecord>, StoreError> {
        Ok(self.records.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn replace(&self, records: &[TeeTimeRecord]) -> Result<(), StoreError> {
        *self.records.lock().unwrap_or_else(PoisonError::into_inner) = records.to_vec();
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 11, day).unwrap().and_hms_opt(hour, 0, 0).unwrap()
    }

    fn record(course: &str, teams: u32, times: &[&str]) -> TeeTimeRecord {
        TeeTimeRecord {
            scraped_at: at(28, 9),
            play_date: NaiveDate::from_ymd_opt(2024, 11, 30).unwrap(),
            golf_course: course.to_string(),
            location: "경기 용인".to_string(),
            price: "99,000원".to_string(),
            rating: "4.1".to_string(),
            remaining_teams: teams,
            play_times: times.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvRecordStore::new(dir.path().join("none.csv"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_replace_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvRecordStore::new(dir.path().join("nested").join("tee.csv"));
        let records = vec![
            record("Lakeside, South", 3, &["07:10", "07:17"]),
            record("Sky72 \"Ocean\"", 0, &[]),
        ];

        store.replace(&records).unwrap();
        assert_eq!(store.load().unwrap(), records);
        let entries: Vec<_> = std::fs::read_dir(dir.path().join("nested")).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_header_matches_persisted_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvRecordStore::new(dir.path().join("tee.csv"));
        store.replace(&[record("A", 1, &["08:00"])]).unwrap();

        let content = std::fs::read_to_string(store.path()).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "scraped_at,play_date,golf_course,location,price,rating,remaining_teams,play_time"
        );
        assert!(lines.next().unwrap().starts_with("2024-11-28 09:00:00,2024-11-30,A,"));
    }

    #[test]
    fn test_empty_set_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvRecordStore::new(dir.path().join("tee.csv"));
        store.replace(&[]).unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_loads_legacy_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.csv");
        std::fs::write(
            &path,
            "scraped_at,play_date,golf_course,location,price,rating,remaining_teams,play_time\n\
             2024-11-28 09:00:00,2024-11-30,Lakeside,경기,\"99,000원\",4.1,3팀,07:10\n",
        )
        .unwrap();

        let records = CsvRecordStore::new(&path).load().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].remaining_teams, 3);
        assert_eq!(records[0].play_times, vec!["07:10".to_string()]);
    }

    #[test]
    fn test_unreadable_rows_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixed.csv");
        std::fs::write(
            &path,
            "scraped_at,play_date,golf_course,location,price,rating,remaining_teams,play_time\n\
             yesterday,2024-11-30,Lakeside,경기,0,4.1,3,[]\n\
             2024-11-28 09:00:00,2024-11-30,Bear Creek,경기,0,4.3,정보없음,[]\n\
             2024-11-28 09:00:00,2024-11-30,Sky72,인천,0,4.5,2팀,[]\n",
        )
        .unwrap();

        let records = CsvRecordStore::new(&path).load().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].golf_course, "Sky72");
        assert_eq!(records[0].remaining_teams, 2);
    }

    #[test]
    fn test_failed_replace_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tee.csv");
        // A non-empty directory at the target makes the final rename fail
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), "x").unwrap();

        assert!(CsvRecordStore::new(&path).replace(&[record("B", 1, &[])]).is_err());

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("tee.csv")]);
        assert!(path.join("keep").exists());
    }

    #[test]
    fn test_concurrent_writers_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tee.csv");
        let first = vec![record("A", 1, &["08:00"])];
        let second = vec![record("B", 2, &["09:00"]), record("C", 3, &[])];

        std::thread::scope(|scope| {
            for records in [&first, &second] {
                let store = CsvRecordStore::new(&path);
                scope.spawn(move || {
                    for _ in 0..25 {
                        store.replace(records).unwrap();
                    }
                });
            }
        });

        let stored = CsvRecordStore::new(&path).load().unwrap();
        assert!(stored == first || stored == second);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
