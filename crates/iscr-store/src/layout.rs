//! Paths of every cached artefact under the data directory.
//!
//! ```text
//! {root}/site/{year}/index.html
//! {root}/raw/{year}/{case_id}.pdf
//! {root}/text/{year}/{case_id}.txt
//! {root}/manifest/{year}.json
//! {root}/output/classified_cases_{year}.csv
//! ```

use std::path::{Path, PathBuf};

use iscr_core::{CaseRecord, DiscoveredCase, output};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn site_index_path(&self, year: i32) -> PathBuf {
        self.root
            .join("site")
            .join(year.to_string())
            .join("index.html")
    }

    pub fn raw_path(&self, year: i32, case_id: &str) -> PathBuf {
        self.root
            .join("raw")
            .join(year.to_string())
            .join(format!("{case_id}.pdf"))
    }

    pub fn text_path(&self, year: i32, case_id: &str) -> PathBuf {
        self.root
            .join("text")
            .join(year.to_string())
            .join(format!("{case_id}.txt"))
    }

    pub fn manifest_path(&self, year: i32) -> PathBuf {
        self.root.join("manifest").join(format!("{year}.json"))
    }

    pub fn output_path(&self, year: i32) -> PathBuf {
        self.root.join("output").join(output::file_name(year))
    }

    /// Build the record for a case, pointing at its cache entries.
    pub fn case_record(&self, year: i32, case: &DiscoveredCase) -> CaseRecord {
        CaseRecord {
            case_id: case.case_id.clone(),
            year,
            source_url: case.source_url.clone(),
            raw_path: self.raw_path(year, &case.case_id),
            text_path: self.text_path(year, &case.case_id),
        }
    }
}
