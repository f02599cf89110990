use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Alert subscription for one course
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatchEntry {
    pub course_name: String,
    pub last_known_slots: Option<u32>, // None until the first observation
    #[serde(default)]
    pub play_time: String, // Display only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub play_date: Option<NaiveDate>, // Restrict observations to one play date
    pub subscribed: bool,
}

impl WatchEntry {
    pub fn new(course_name: impl Into<String>) -> Self {
        Self {
            course_name: course_name.into(),
            last_known_slots: None,
            play_time: String::new(),
            play_date: None,
            subscribed: true,
        }
    }

    pub fn with_initial_slots(mut self, slots: Option<u32>) -> Self {
        self.last_known_slots = slots;
        self
    }

    pub fn with_play_time(mut self, play_time: impl Into<String>) -> Self {
        self.play_time = play_time.into();
        self
    }

    pub fn with_play_date(mut self, play_date: Option<NaiveDate>) -> Self {
        self.play_date = play_date;
        self
    }
}
