use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serializer};

/// Format used for `scraped_at` in the store and in JSON output
pub const SCRAPED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format used for `play_date` in the store and in JSON output
pub const PLAY_DATE_FORMAT: &str = "%Y-%m-%d";

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(SCRAPED_AT_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s.trim(), SCRAPED_AT_FORMAT)
}

/// serde `with` module writing timestamps as `YYYY-MM-DD HH:MM:SS`
pub mod timestamp {
    use super::*;

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}
