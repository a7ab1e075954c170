//! Fetch layer: scrape the hearing-decision archive for a year's case
//! documents and download each one into the raw cache.

mod error;
pub use error::FetchError;

pub mod discover;
pub mod fetcher;
pub mod source;

pub use discover::YearLink;
pub use fetcher::{DEFAULT_ARCHIVE_URL, Fetcher};
pub use source::{HttpSource, PageSource};
