//! Case identity and on-disk cache locations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A case document found on a year's listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredCase {
    /// Stable identifier derived from the document file name (e.g. `21-01234.h1`).
    pub case_id: String,
    pub source_url: String,
}

impl DiscoveredCase {
    pub fn new(case_id: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            case_id: case_id.into(),
            source_url: source_url.into(),
        }
    }
}

/// A fetched case: the raw document is cached at `raw_path`, and its extracted
/// text lives (or will live) at `text_path`.
///
/// Both paths are derived from `case_id`, so a record built on a later run
/// points at the same cache entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseRecord {
    pub case_id: String,
    pub year: i32,
    pub source_url: String,
    pub raw_path: PathBuf,
    pub text_path: PathBuf,
}
