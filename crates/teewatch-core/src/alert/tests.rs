use super::*;
use std::time::Duration;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 7, d).unwrap()
}

fn record(course: &str, play_day: u32, teams: u32) -> TeeTimeRecord {
    TeeTimeRecord {
        scraped_at: day(1).and_hms_opt(9, 0, 0).unwrap(),
        play_date: day(play_day),
        golf_course: course.to_string(),
        location: "충북 충주".to_string(),
        price: "89,000원".to_string(),
        rating: "4.0".to_string(),
        remaining_teams: teams,
        play_times: vec!["06:40".to_string(), "07:20".to_string()],
    }
}

fn snapshot(records: Vec<TeeTimeRecord>) -> CanonicalSnapshot {
    CanonicalSnapshot::new(records, day(1).and_hms_opt(9, 0, 0).unwrap())
}

#[test]
fn test_single_event_for_one_drop() {
    let engine = AlertEngine::new(16);
    let _stream = engine.events();
    engine.subscribe("A", None, "");

    let events: Vec<AlertEvent> = [5, 5, 3, 3, 4]
        .into_iter()
        .filter_map(|slots| engine.on_observation("A", slots, "07:00"))
        .collect();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].previous_slots, 5);
    assert_eq!(events[0].current_slots, 3);
    assert_eq!(events[0].booked(), 2);
}

#[test]
fn test_unsubscribe_resets_baseline() {
    let engine = AlertEngine::new(16);
    engine.subscribe("A", None, "");
    assert!(engine.on_observation("A", 5, "").is_none());

    assert!(engine.unsubscribe("A"));
    engine.subscribe("A", None, "");

    assert!(engine.on_observation("A", 3, "").is_none());
}

#[test]
fn test_unwatched_course_is_ignored() {
    let engine = AlertEngine::new(16);
    assert!(engine.on_observation("B", 5, "").is_none());
    assert!(engine.on_observation("B", 1, "").is_none());
    assert!(!engine.is_watched("B"));
    assert!(!engine.unsubscribe("B"));
}

#[test]
fn test_seeded_baseline_alerts_on_first_drop() {
    let engine = AlertEngine::new(16);
    engine.subscribe("A", Some(4), "08:10");

    let event = engine.on_observation("A", 2, "08:10").unwrap();
    assert_eq!(event.previous_slots, 4);
    assert_eq!(event.current_slots, 2);
}

#[test]
fn test_emit_without_listeners_does_not_panic() {
    let engine = AlertEngine::new(1);
    engine.subscribe("A", Some(9), "");
    assert!(engine.on_observation("A", 1, "").is_some());
}

#[test]
fn test_resubscribe_replaces_entry() {
    let engine = AlertEngine::new(4);
    engine.subscribe("A", Some(5), "");
    engine.subscribe("A", Some(1), "");

    assert_eq!(engine.len(), 1);
    assert!(engine.on_observation("A", 3, "").is_none());
}

#[test]
fn test_watch_entries_are_sorted() {
    let engine = AlertEngine::new(4);
    engine.subscribe("Cherry Hill", None, "");
    engine.subscribe("Apple Valley", Some(2), "");

    let names: Vec<String> = engine.watch_entries().into_iter().map(|e| e.course_name).collect();
    assert_eq!(names, vec!["Apple Valley".to_string(), "Cherry Hill".to_string()]);
    assert!(engine.watch_entries().iter().all(|e| e.subscribed));
}

#[test]
fn test_snapshot_observes_earliest_upcoming_date() {
    let engine = AlertEngine::new(8);
    engine.subscribe("A", None, "");

    // Past date (1st) is skipped, the 3rd is the earliest upcoming one
    let first = snapshot(vec![record("A", 1, 0), record("A", 3, 6), record("A", 5, 2)]);
    assert!(engine.observe_snapshot(&first, day(2)).is_empty());

    let second = snapshot(vec![record("A", 1, 0), record("A", 3, 4), record("A", 5, 1)]);
    let events = engine.observe_snapshot(&second, day(2));

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].previous_slots, 6);
    assert_eq!(events[0].current_slots, 4);
    assert_eq!(events[0].play_date, Some(day(3)));
    assert_eq!(events[0].play_time, "06:40, 07:20");
}

#[test]
fn test_snapshot_respects_play_date_scope() {
    let engine = AlertEngine::new(8);
    engine.subscribe_entry(WatchEntry::new("A").with_play_date(Some(day(5))));

    engine.observe_snapshot(&snapshot(vec![record("A", 3, 6), record("A", 5, 2)]), day(1));
    let events = engine.observe_snapshot(&snapshot(vec![record("A", 3, 1), record("A", 5, 2)]), day(1));

    assert!(events.is_empty());
    assert_eq!(engine.watch_entries()[0].last_known_slots, Some(2));
}

#[test]
fn test_rolled_over_date_starts_new_baseline() {
    let engine = AlertEngine::new(8);
    engine.subscribe("A", None, "");

    engine.observe_snapshot(&snapshot(vec![record("A", 3, 6), record("A", 4, 1)]), day(3));
    // The 3rd is now in the past, so the 4th is observed against no baseline
    let events = engine.observe_snapshot(&snapshot(vec![record("A", 3, 6), record("A", 4, 1)]), day(4));

    assert!(events.is_empty());
}

#[test]
fn test_course_missing_from_snapshot_keeps_baseline() {
    let engine = AlertEngine::new(8);
    engine.subscribe("A", None, "");

    engine.observe_snapshot(&snapshot(vec![record("A", 3, 6)]), day(1));
    assert!(engine.observe_snapshot(&snapshot(vec![record("B", 3, 2)]), day(1)).is_empty());

    let events = engine.observe_snapshot(&snapshot(vec![record("A", 3, 5)]), day(1));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].previous_slots, 6);
}

#[tokio::test]
async fn test_stream_delivers_events() {
    let engine = AlertEngine::new(8);
    let mut stream = engine.events();
    engine.subscribe("A", Some(3), "");

    engine.on_observation("A", 2, "");

    let event = tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.course_name, "A");
    assert_eq!(event.current_slots, 2);
}

#[tokio::test]
async fn test_lagging_stream_skips_lost_events() {
    let engine = AlertEngine::new(2);
    let mut stream = engine.events();
    engine.subscribe("A", Some(10), "");

    for slots in [9, 8, 7, 6] {
        engine.on_observation("A", slots, "");
    }

    // Only the newest two fit in the channel
    assert_eq!(stream.next().await.unwrap().current_slots, 7);
    assert_eq!(stream.next().await.unwrap().current_slots, 6);
}

#[tokio::test]
async fn test_stream_ends_when_engine_dropped() {
    let engine = AlertEngine::new(2);
    let mut stream = engine.events();
    drop(engine);

    assert!(stream.next().await.is_none());
}

#[test]
fn test_subscribe_from_snapshot_seeds_baseline() {
    let engine = AlertEngine::new(8);
    let current = snapshot(vec![record("A", 2, 7), record("A", 4, 3)]);

    let entry = engine.subscribe_from_snapshot("A", None, &current, day(1));
    assert_eq!(entry.last_known_slots, Some(7));
    assert_eq!(entry.play_time, "06:40, 07:20");

    let events = engine.observe_snapshot(&snapshot(vec![record("A", 2, 5), record("A", 4, 3)]), day(1));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].previous_slots, 7);
}

#[test]
fn test_subscribe_from_snapshot_unlisted_course() {
    let engine = AlertEngine::new(8);
    let entry = engine.subscribe_from_snapshot("Nowhere", Some(day(9)), &snapshot(Vec::new()), day(1));

    assert_eq!(entry.last_known_slots, None);
    assert_eq!(entry.play_date, Some(day(9)));
    assert!(engine.is_watched("Nowhere"));
}
