//! Per-year run manifest: the ordered list of discovered cases and how far
//! each one has progressed.
//!
//! ```text
//! pending --fetch--> fetched --extract--> extracted --classify--> classified
//!    \__________________\______________________\______________--> failed
//! ```
//!
//! `classified` and `failed` are terminal. A later run skips terminal cases
//! unless it is forced, in which case every case starts again from `pending`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::case::DiscoveredCase;

/// Progress of a single case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Pending,
    Fetched,
    Extracted,
    Classified,
    Failed,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetched => "fetched",
            Self::Extracted => "extracted",
            Self::Classified => "classified",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Classified | Self::Failed)
    }
}

/// Pipeline stage at which a case failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Fetch,
    Extract,
    Classify,
    Persist,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Extract => "extract",
            Self::Classify => "classify",
            Self::Persist => "persist",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub stage: Stage,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub case_id: String,
    pub source_url: String,
    pub status: CaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    pub updated_at: DateTime<Utc>,
}

/// Counts of cases per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub fetched: usize,
    pub extracted: usize,
    pub classified: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.fetched + self.extracted + self.classified + self.failed
    }
}

/// The discovered cases of one year in discovery order, with a status per case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    pub year: i32,
    entries: Vec<ManifestEntry>,
}

impl RunManifest {
    pub fn new(year: i32) -> Self {
        Self {
            year,
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, case_id: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.case_id == case_id)
    }

    pub fn status(&self, case_id: &str) -> Option<CaseStatus> {
        self.get(case_id).map(|e| e.status)
    }

    /// Add newly discovered cases as `pending`, keeping the order of existing
    /// entries and appending new ones in discovery order.
    ///
    /// A URL already in the manifest keeps the id it was first given, whatever
    /// id the listing derives for it now. A new URL whose id is already bound to
    /// another URL gets the first free `_2`, `_3`, ... suffix. Returns the
    /// discovered cases under their manifest ids, in discovery order.
    pub fn merge_discovered(&mut self, discovered: &[DiscoveredCase]) -> Vec<DiscoveredCase> {
        let mut merged = Vec::with_capacity(discovered.len());
        for case in discovered {
            if let Some(entry) = self.entries.iter().find(|e| e.source_url == case.source_url) {
                merged.push(DiscoveredCase::new(entry.case_id.clone(), entry.source_url.clone()));
                continue;
            }
            let mut case_id = case.case_id.clone();
            let mut n = 1;
            while self.get(&case_id).is_some() {
                n += 1;
                case_id = format!("{}_{n}", case.case_id);
            }
            self.entries.push(ManifestEntry {
                case_id: case_id.clone(),
                source_url: case.source_url.clone(),
                status: CaseStatus::Pending,
                failure: None,
                updated_at: Utc::now(),
            });
            merged.push(DiscoveredCase::new(case_id, case.source_url.clone()));
        }
        merged
    }

    /// Record a successful transition. Clears any previous failure.
    ///
    /// Returns `false` if the case is not in the manifest.
    pub fn advance(&mut self, case_id: &str, status: CaseStatus) -> bool {
        match self.entry_mut(case_id) {
            Some(entry) => {
                entry.status = status;
                entry.failure = None;
                entry.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Mark a case `failed` at `stage`.
    pub fn fail(&mut self, case_id: &str, stage: Stage, reason: impl Into<String>) -> bool {
        match self.entry_mut(case_id) {
            Some(entry) => {
                entry.status = CaseStatus::Failed;
                entry.failure = Some(Failure {
                    stage,
                    reason: reason.into(),
                });
                entry.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Reset every case to `pending` for a forced re-run.
    pub fn reset_all(&mut self) {
        let now = Utc::now();
        for entry in &mut self.entries {
            entry.status = CaseStatus::Pending;
            entry.failure = None;
            entry.updated_at = now;
        }
    }

    /// Cases that still have work to do, in manifest order.
    pub fn outstanding(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.iter().filter(|e| !e.status.is_terminal())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &Failure)> {
        self.entries
            .iter()
            .filter_map(|e| e.failure.as_ref().map(|f| (e.case_id.as_str(), f)))
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for entry in &self.entries {
            match entry.status {
                CaseStatus::Pending => counts.pending += 1,
                CaseStatus::Fetched => counts.fetched += 1,
                CaseStatus::Extracted => counts.extracted += 1,
                CaseStatus::Classified => counts.classified += 1,
                CaseStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    fn entry_mut(&mut self, case_id: &str) -> Option<&mut ManifestEntry> {
        self.entries.iter_mut().find(|e| e.case_id == case_id)
    }
}
