pub mod error;
pub mod teescanner;
pub mod traits;

pub use error::FetchError;
pub use teescanner::TeescannerFetcher;
pub use traits::PageFetcher;
