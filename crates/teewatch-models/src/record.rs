use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use crate::slots::{parse_remaining_teams, ParseError};

/// Placeholder the listing scraper writes when a field is absent from the page
pub const MISSING_FIELD: &str = "정보없음";

/// One observation of a course's availability for one play date
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeeTimeRecord {
    #[serde(with = "crate::time_format::timestamp")]
    pub scraped_at: NaiveDateTime,
    pub play_date: NaiveDate,
    pub golf_course: String, // Exact-match key, never normalized
    pub location: String,
    pub price: String,
    pub rating: String,
    pub remaining_teams: u32,
    #[serde(default)]
    pub play_times: Vec<String>,
}

/// Deduplication key: one canonical record per course and play date
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CourseDateKey {
    pub golf_course: String,
    pub play_date: NaiveDate,
}

impl TeeTimeRecord {
    pub fn key(&self) -> CourseDateKey {
        CourseDateKey {
            golf_course: self.golf_course.clone(),
            play_date: self.play_date,
        }
    }

    /// Tee times joined for display, e.g. `"07:10, 07:17"`
    pub fn play_time_label(&self) -> String {
        self.play_times.join(", ")
    }
}

/// Field tuple extracted from one listing block, before slot parsing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawRecord {
    pub play_date: NaiveDate,
    pub golf_course: String,
    pub location: String,
    pub price: String,
    pub rating: String,
    pub remaining_teams: String,
    #[serde(default)]
    pub play_times: Vec<String>,
}

impl RawRecord {
    pub fn into_record(self, scraped_at: NaiveDateTime) -> Result<TeeTimeRecord, ParseError> {
        let remaining_teams = parse_remaining_teams(&self.remaining_teams)?;
        Ok(TeeTimeRecord {
            scraped_at,
            play_date: self.play_date,
            golf_course: self.golf_course,
            location: self.location,
            price: self.price,
            rating: self.rating,
            remaining_teams,
            play_times: self.play_times,
        })
    }
}
