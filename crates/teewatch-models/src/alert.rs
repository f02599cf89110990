use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A watched course's remaining teams went down between two polls
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertEvent {
    pub course_name: String,
    pub previous_slots: u32,
    pub current_slots: u32,
    pub play_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub play_date: Option<NaiveDate>,
    #[serde(with = "crate::time_format::timestamp")]
    pub detected_at: NaiveDateTime,
}

impl AlertEvent {
    /// Number of teams booked since the previous observation
    pub fn booked(&self) -> u32 {
        self.previous_slots.saturating_sub(self.current_slots)
    }
}
