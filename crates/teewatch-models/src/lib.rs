pub mod alert;
pub mod record;
pub mod slots;
pub mod time_format;
pub mod watch;

pub use alert::AlertEvent;
pub use record::{CourseDateKey, RawRecord, TeeTimeRecord, MISSING_FIELD};
pub use slots::{parse_remaining_teams, ParseError};
pub use time_format::{PLAY_DATE_FORMAT, SCRAPED_AT_FORMAT};
pub use watch::WatchEntry;
