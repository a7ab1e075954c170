//! Classification records produced by the language-model stage.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Adjudication result assigned to a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// Clearance granted or continued.
    Granted,
    /// Clearance denied on an initial application.
    Denied,
    /// Existing clearance revoked.
    Revoked,
    /// The decision text does not state a clear outcome.
    Unknown,
}

impl Outcome {
    pub const ALL: [Outcome; 4] = [
        Outcome::Granted,
        Outcome::Denied,
        Outcome::Revoked,
        Outcome::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Granted => "Granted",
            Self::Denied => "Denied",
            Self::Revoked => "Revoked",
            Self::Unknown => "Unknown",
        }
    }

    /// Parse an outcome label, case-insensitively.
    ///
    /// Besides the canonical names this accepts the labels used by earlier
    /// prompt versions and by the decisions themselves: `Passed`/`Favorable`
    /// map to `Granted`, `Failed`/`Unfavorable` to `Denied`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "granted" | "passed" | "favorable" => Some(Self::Granted),
            "denied" | "failed" | "unfavorable" => Some(Self::Denied),
            "revoked" => Some(Self::Revoked),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validated classification of one case.
///
/// Never mutated after creation. A forced re-run produces a new value that
/// replaces the stored row for the same `case_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub case_id: String,
    pub outcome: Outcome,
    /// Canonical guideline names, kept sorted so the stored form is stable.
    pub guideline_flags: BTreeSet<String>,
    pub rationale_summary: String,
    pub model_version: String,
    pub classified_at: DateTime<Utc>,
}

/// Separator used when guideline flags are flattened into one table cell.
pub const FLAG_SEPARATOR: &str = "; ";

impl ClassificationResult {
    /// Guideline flags joined into a single cell value.
    pub fn flags_cell(&self) -> String {
        self.guideline_flags
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(FLAG_SEPARATOR)
    }

    /// Inverse of [`flags_cell`](Self::flags_cell).
    pub fn parse_flags_cell(cell: &str) -> BTreeSet<String> {
        cell.split(FLAG_SEPARATOR.trim())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}
