use crate::snapshot::CanonicalSnapshot;
use chrono::{Local, NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use teewatch_models::{AlertEvent, TeeTimeRecord, WatchEntry};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

struct WatchState {
    entry: WatchEntry,
    /// Play date the baseline was taken from, when known
    observed_date: Option<NaiveDate>,
}

/// Subscription registry that reports drops in remaining teams for watched courses
pub struct AlertEngine {
    watches: Mutex<HashMap<String, WatchState>>,
    sender: broadcast::Sender<AlertEvent>,
}

impl AlertEngine {
    pub fn new(channel_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            watches: Mutex::new(HashMap::new()),
            sender,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, WatchState>> {
        self.watches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start watching a course. Re-subscribing replaces the entry and its baseline.
    pub fn subscribe(&self, course_name: impl Into<String>, initial_slots: Option<u32>, play_time: impl Into<String>) {
        self.subscribe_entry(
            WatchEntry::new(course_name)
                .with_initial_slots(initial_slots)
                .with_play_time(play_time),
        );
    }

    pub fn subscribe_entry(&self, entry: WatchEntry) {
        info!(
            operation = "watch_subscribe",
            course = %entry.course_name,
            baseline = ?entry.last_known_slots,
            play_date = ?entry.play_date,
            "Watching course"
        );
        let observed_date = entry.play_date;
        self.insert(entry, observed_date);
    }

    /// Subscribe with the baseline taken from the snapshot when the course is listed there
    pub fn subscribe_from_snapshot(
        &self,
        course_name: &str,
        play_date: Option<NaiveDate>,
        snapshot: &CanonicalSnapshot,
        today: NaiveDate,
    ) -> WatchEntry {
        let record = select_record(&snapshot.records, course_name, play_date, today);
        let entry = WatchEntry::new(course_name)
            .with_initial_slots(record.map(|r| r.remaining_teams))
            .with_play_time(record.map(|r| r.play_time_label()).unwrap_or_default())
            .with_play_date(play_date);

        info!(
            operation = "watch_subscribe",
            course = %course_name,
            baseline = ?entry.last_known_slots,
            play_date = ?play_date,
            "Watching course"
        );
        self.insert(entry.clone(), record.map(|r| r.play_date));
        entry
    }

    fn insert(&self, entry: WatchEntry, observed_date: Option<NaiveDate>) {
        let entry = WatchEntry {
            subscribed: true,
            ..entry
        };
        self.lock()
            .insert(entry.course_name.clone(), WatchState { entry, observed_date });
    }

    /// Returns false when the course was not watched
    pub fn unsubscribe(&self, course_name: &str) -> bool {
        let removed = self.lock().remove(course_name).is_some();
        if removed {
            info!(operation = "watch_unsubscribe", course = %course_name, "Stopped watching course");
        }
        removed
    }

    pub fn is_watched(&self, course_name: &str) -> bool {
        self.lock().contains_key(course_name)
    }

    /// Current subscriptions sorted by course name
    pub fn watch_entries(&self) -> Vec<WatchEntry> {
        let mut entries: Vec<WatchEntry> = self.lock().values().map(|s| s.entry.clone()).collect();
        entries.sort_by(|a, b| a.course_name.cmp(&b.course_name));
        entries
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Record the latest slot count for a course. Emits when the count went down.
    pub fn on_observation(&self, course_name: &str, slots: u32, play_time: &str) -> Option<AlertEvent> {
        self.observe_at(course_name, slots, play_time, None, Local::now().naive_local())
    }

    fn observe_at(
        &self,
        course_name: &str,
        slots: u32,
        play_time: &str,
        play_date: Option<NaiveDate>,
        detected_at: NaiveDateTime,
    ) -> Option<AlertEvent> {
        let event = {
            let mut watches = self.lock();
            let state = watches.get_mut(course_name)?;

            // A different play date starts a new baseline
            let same_date = match (state.observed_date, play_date) {
                (Some(previous), Some(current)) => previous == current,
                _ => true,
            };
            let previous = if same_date { state.entry.last_known_slots } else { None };

            state.entry.last_known_slots = Some(slots);
            state.entry.play_time = play_time.to_string();
            if play_date.is_some() {
                state.observed_date = play_date;
            }

            match previous {
                Some(previous_slots) if slots < previous_slots => Some(AlertEvent {
                    course_name: course_name.to_string(),
                    previous_slots,
                    current_slots: slots,
                    play_time: play_time.to_string(),
                    play_date: play_date.or(state.observed_date),
                    detected_at,
                }),
                _ => None,
            }
        };

        if let Some(event) = &event {
            self.emit(event.clone());
        } else {
            debug!(course = %course_name, slots, "Observation recorded");
        }
        event
    }

    /// Observe every watched course present in the snapshot
    ///
    /// The record observed for a course is the one for the watch's play date, or
    /// the earliest play date on or after `today` when the watch has none.
    pub fn observe_snapshot(&self, snapshot: &CanonicalSnapshot, today: NaiveDate) -> Vec<AlertEvent> {
        let scopes: Vec<(String, Option<NaiveDate>)> = self
            .lock()
            .values()
            .map(|s| (s.entry.course_name.clone(), s.entry.play_date))
            .collect();
        let detected_at = snapshot.updated_at.unwrap_or_else(|| Local::now().naive_local());

        let mut events = Vec::new();
        for (course_name, scope) in scopes {
            let Some(record) = select_record(&snapshot.records, &course_name, scope, today) else {
                continue;
            };
            if let Some(event) = self.observe_at(
                &course_name,
                record.remaining_teams,
                &record.play_time_label(),
                Some(record.play_date),
                detected_at,
            ) {
                events.push(event);
            }
        }
        events
    }

    pub fn events(&self) -> AlertStream {
        AlertStream {
            receiver: self.sender.subscribe(),
        }
    }

    fn emit(&self, event: AlertEvent) {
        info!(
            operation = "alert",
            course = %event.course_name,
            previous = event.previous_slots,
            current = event.current_slots,
            play_date = ?event.play_date,
            "Remaining teams went down"
        );
        if self.sender.send(event).is_err() {
            warn!("No alert listeners, event dropped");
        }
    }
}

fn select_record<'a>(
    records: &'a [TeeTimeRecord],
    course_name: &str,
    scope: Option<NaiveDate>,
    today: NaiveDate,
) -> Option<&'a TeeTimeRecord> {
    let mut candidates = records.iter().filter(|r| r.golf_course == course_name);
    match scope {
        Some(play_date) => candidates.find(|r| r.play_date == play_date),
        None => candidates.filter(|r| r.play_date >= today).min_by_key(|r| r.play_date),
    }
}

/// Consumer-paced view of emitted alerts
pub struct AlertStream {
    receiver: broadcast::Receiver<AlertEvent>,
}

impl AlertStream {
    /// Next event; `None` once the engine is gone. Events lost to lag are skipped.
    pub async fn next(&mut self) -> Option<AlertEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Alert listener fell behind, skipping events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests;
