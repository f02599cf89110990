pub mod client;
pub mod parser;

pub use client::TeescannerFetcher;
pub use parser::{listing_url, parse_listing, EXTRACT_LISTING_JS};
