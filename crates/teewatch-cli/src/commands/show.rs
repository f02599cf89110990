use crate::output::{Output, OutputFormat};
use chrono::NaiveDate;
use color_eyre::Result;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table};
use owo_colors::OwoColorize;
use teewatch_config::{Config, PathManager};
use teewatch_core::{CsvRecordStore, RecordStore};
use teewatch_models::{time_format::format_timestamp, TeeTimeRecord, PLAY_DATE_FORMAT};

pub fn run_show(config: &Config, date: Option<NaiveDate>, course: Option<&str>, output: &Output) -> Result<()> {
    let path_manager = PathManager::default();
    let store = CsvRecordStore::new(path_manager.store_file(config));
    let records = store
        .load()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to read {}: {}", store.path().display(), e))?;

    let records = filter_records(records, date, course);

    match output.format() {
        OutputFormat::Human => {
            if output.is_quiet() {
                return Ok(());
            }
            if records.is_empty() {
                output.info(format!("No tee times stored in {} match", store.path().display()));
                return Ok(());
            }
            println!("{}", render_table(&records));
            println!(
                "{} {} records from {}",
                "Total:".dimmed(),
                records.len(),
                store.path().display()
            );
        }
        OutputFormat::Json | OutputFormat::JsonPretty => {
            output.json(&serde_json::to_value(&records)?);
        }
    }
    Ok(())
}

fn filter_records(records: Vec<TeeTimeRecord>, date: Option<NaiveDate>, course: Option<&str>) -> Vec<TeeTimeRecord> {
    records
        .into_iter()
        .filter(|r| date.map_or(true, |d| r.play_date == d))
        .filter(|r| course.map_or(true, |c| r.golf_course.contains(c)))
        .collect()
}

fn render_table(records: &[TeeTimeRecord]) -> Table {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(
        ["Scraped", "Play Date", "Course", "Location", "Price", "Rating", "Teams", "Tee Times"]
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(comfy_table::Attribute::Bold)),
    );

    for record in records {
        let teams = Cell::new(record.remaining_teams).set_alignment(CellAlignment::Right);
        let teams = if record.remaining_teams == 0 {
            teams.fg(comfy_table::Color::Red)
        } else {
            teams.fg(comfy_table::Color::Green)
        };
        table.add_row(vec![
            Cell::new(format_timestamp(&record.scraped_at)),
            Cell::new(record.play_date.format(PLAY_DATE_FORMAT)),
            Cell::new(&record.golf_course).fg(comfy_table::Color::Cyan),
            Cell::new(&record.location),
            Cell::new(&record.price),
            Cell::new(&record.rating),
            teams,
            Cell::new(record.play_time_label()),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(course: &str, day: u32) -> TeeTimeRecord {
        TeeTimeRecord {
            scraped_at: NaiveDate::from_ymd_opt(2024, 9, 1).unwrap().and_hms_opt(8, 0, 0).unwrap(),
            play_date: NaiveDate::from_ymd_opt(2024, 9, day).unwrap(),
            golf_course: course.to_string(),
            location: "제주".to_string(),
            price: "200,000원".to_string(),
            rating: "4.8".to_string(),
            remaining_teams: 2,
            play_times: Vec::new(),
        }
    }

    #[test]
    fn test_filters_combine() {
        let records = vec![record("Pinx", 2), record("Pinx", 3), record("Nine Bridges", 2)];

        let by_date = filter_records(records.clone(), NaiveDate::from_ymd_opt(2024, 9, 2), None);
        assert_eq!(by_date.len(), 2);

        let by_both = filter_records(records.clone(), NaiveDate::from_ymd_opt(2024, 9, 2), Some("Pinx"));
        assert_eq!(by_both.len(), 1);

        assert_eq!(filter_records(records, None, None).len(), 3);
    }

    #[test]
    fn test_table_has_a_row_per_record() {
        let table = render_table(&[record("Pinx", 2), record("Nine Bridges", 3)]);
        assert_eq!(table.row_iter().count(), 2);
    }
}
