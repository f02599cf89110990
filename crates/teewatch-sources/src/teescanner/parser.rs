use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use teewatch_models::{RawRecord, MISSING_FIELD, PLAY_DATE_FORMAT};
use tracing::debug;

/// Selector of one course block on the listing page
pub const LISTING_SELECTOR: &str = "div.golf-inner-info";

/// Collects one object per course block; absent elements come back as null
pub const EXTRACT_LISTING_JS: &str = r#"
(() => {
    const text = (root, selector) => {
        const el = root.querySelector(selector);
        return el ? el.textContent.trim() : null;
    };
    return Array.from(document.querySelectorAll('div.golf-inner-info')).map((div) => ({
        course: text(div, 'strong'),
        location: text(div, 'p.location'),
        price: text(div, 'span.price'),
        rating: text(div, 'a.star-score'),
        teams: text(div, 'button.btn'),
        times: Array.from(div.querySelectorAll('span.time')).map((s) => s.textContent.trim()),
    }));
})()
"#;

/// Page load progress as seen by [`listing_probe_js`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// At least one course block is on the page
    Listing,
    /// The document finished loading and holds no course block yet
    LoadedEmpty,
    Loading,
}

/// Evaluates to `"listing"` once a course block exists, otherwise to `document.readyState`
pub fn listing_probe_js() -> String {
    format!(
        "(() => document.querySelector('{}') !== null ? 'listing' : document.readyState)()",
        LISTING_SELECTOR
    )
}

pub fn parse_page_state(value: &serde_json::Value) -> PageState {
    match value.as_str() {
        Some("listing") => PageState::Listing,
        Some("complete") => PageState::LoadedEmpty,
        _ => PageState::Loading,
    }
}

#[derive(Debug, Default, Deserialize)]
struct ListingBlock {
    #[serde(default)]
    course: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    rating: Option<String>,
    #[serde(default)]
    teams: Option<String>,
    #[serde(default)]
    times: Vec<String>,
}

/// `{base_url}?tab={tab}&roundDay=YYYY-MM-DD`
pub fn listing_url(base_url: &str, tab: &str, play_date: NaiveDate) -> String {
    format!(
        "{}?tab={}&roundDay={}",
        base_url.trim_end_matches('?'),
        tab,
        play_date.format(PLAY_DATE_FORMAT)
    )
}

fn field_or_missing(value: Option<String>) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => MISSING_FIELD.to_string(),
    }
}

/// Convert the extraction script's result into raw records for `play_date`
pub fn parse_listing(value: serde_json::Value, play_date: NaiveDate) -> Result<Vec<RawRecord>> {
    if value.is_null() {
        return Ok(Vec::new());
    }

    let blocks: Vec<ListingBlock> = serde_json::from_value(value)
        .map_err(|e| anyhow!("Unexpected listing payload: {}", e))?;

    let records: Vec<RawRecord> = blocks
        .into_iter()
        .map(|block| RawRecord {
            play_date,
            golf_course: field_or_missing(block.course),
            location: field_or_missing(block.location),
            price: field_or_missing(block.price),
            rating: field_or_missing(block.rating),
            remaining_teams: field_or_missing(block.teams),
            play_times: block
                .times
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        })
        .collect();

    debug!(
        play_date = %play_date,
        blocks = records.len(),
        "Parsed listing blocks"
    );

    Ok(records)
}
