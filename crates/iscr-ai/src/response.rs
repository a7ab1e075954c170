//! Strict validation of the model's JSON reply.

use std::collections::BTreeSet;

use iscr_core::Outcome;
use serde::Deserialize;
use thiserror::Error;

use crate::prompt::{MAX_RATIONALE_CHARS, truncate_chars};
use crate::taxonomy::Taxonomy;

/// Why a reply was rejected. Fed back to the model in the corrective prompt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SchemaViolation(pub String);

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawReply {
    outcome: String,
    guideline_flags: Vec<String>,
    rationale_summary: String,
}

/// A reply that passed validation, with flags in canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedResponse {
    pub outcome: Outcome,
    pub guideline_flags: BTreeSet<String>,
    pub rationale_summary: String,
}

/// The outermost `{...}` span, tolerating prose or a markdown fence around it.
fn json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (start < end).then(|| &content[start..=end])
}

pub fn parse_reply(content: &str, taxonomy: &Taxonomy) -> Result<ValidatedResponse, SchemaViolation> {
    if content.trim().is_empty() {
        return Err(SchemaViolation("reply was empty".into()));
    }
    let json = json_object(content)
        .ok_or_else(|| SchemaViolation("reply does not contain a JSON object".into()))?;
    let raw: RawReply = serde_json::from_str(json)
        .map_err(|e| SchemaViolation(format!("invalid reply object: {e}")))?;

    let outcome = Outcome::from_label(&raw.outcome).ok_or_else(|| {
        SchemaViolation(format!(
            "outcome {:?} is not one of Granted, Denied, Revoked, Unknown",
            raw.outcome
        ))
    })?;

    let mut guideline_flags = BTreeSet::new();
    for flag in &raw.guideline_flags {
        let name = taxonomy
            .resolve(flag)
            .ok_or_else(|| SchemaViolation(format!("unknown guideline flag {flag:?}")))?;
        guideline_flags.insert(name.to_string());
    }

    let rationale = raw.rationale_summary.split_whitespace().collect::<Vec<_>>().join(" ");
    if rationale.is_empty() {
        return Err(SchemaViolation("rationale_summary is empty".into()));
    }
    let rationale_summary = truncate_chars(&rationale, MAX_RATIONALE_CHARS)
        .trim_end()
        .to_string();

    Ok(ValidatedResponse {
        outcome,
        guideline_flags,
        rationale_summary,
    })
}
