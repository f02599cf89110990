// Reconciliation of scraped batches against the stored history

use chrono::NaiveDate;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use teewatch_models::{CourseDateKey, TeeTimeRecord};

/// Counts reported after every merge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub total_records: usize,
    pub unique_courses: usize,
    pub first_play_date: Option<NaiveDate>,
    pub last_play_date: Option<NaiveDate>,
    /// Keys that did not exist in the history before this batch
    pub new_keys: usize,
    /// Input rows, from history or batch, superseded by another observation of the same key
    pub discarded: usize,
}

/// Keep the most recent observation per (course, play date).
///
/// Ties on `scraped_at` go to the record seen last, so the batch wins over the
/// history and later batch entries win over earlier ones. The result is sorted
/// by `scraped_at` descending, then `play_date` ascending, then course name.
pub fn merge_records(existing: Vec<TeeTimeRecord>, batch: Vec<TeeTimeRecord>) -> Vec<TeeTimeRecord> {
    merge_with_summary(existing, batch).0
}

pub fn merge_with_summary(existing: Vec<TeeTimeRecord>, batch: Vec<TeeTimeRecord>) -> (Vec<TeeTimeRecord>, MergeSummary) {
    let existing_keys: HashSet<CourseDateKey> = existing.iter().map(|r| r.key()).collect();
    let input_count = existing.len() + batch.len();

    let mut latest: HashMap<CourseDateKey, TeeTimeRecord> = HashMap::with_capacity(input_count);
    for record in existing.into_iter().chain(batch) {
        match latest.entry(record.key()) {
            Entry::Occupied(mut slot) => {
                if record.scraped_at >= slot.get().scraped_at {
                    slot.insert(record);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
        }
    }

    let mut merged: Vec<TeeTimeRecord> = latest.into_values().collect();
    sort_canonical(&mut merged);

    let new_keys = merged.iter().filter(|r| !existing_keys.contains(&r.key())).count();
    let summary = MergeSummary {
        total_records: merged.len(),
        unique_courses: merged.iter().map(|r| r.golf_course.as_str()).collect::<HashSet<_>>().len(),
        first_play_date: merged.iter().map(|r| r.play_date).min(),
        last_play_date: merged.iter().map(|r| r.play_date).max(),
        new_keys,
        discarded: input_count - merged.len(),
    };

    (merged, summary)
}

pub fn sort_canonical(records: &mut [TeeTimeRecord]) {
    records.sort_by(|a, b| {
        b.scraped_at
            .cmp(&a.scraped_at)
            .then(a.play_date.cmp(&b.play_date))
            .then_with(|| a.golf_course.cmp(&b.golf_course))
    });
}
