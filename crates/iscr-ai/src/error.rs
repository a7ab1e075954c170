use std::path::PathBuf;

use iscr_core::Transient;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("LLM request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM API returned {status}: {body}")]
    Api { status: u16, body: String },

    /// The model never produced schema-valid output.
    #[error("schema violation after {attempts} attempt(s): {detail}")]
    Schema { attempts: u32, detail: String },

    #[error("case {case_id} has no text to classify")]
    EmptyInput { case_id: String },

    #[error("guideline taxonomy {}: {detail}", .path.display())]
    Taxonomy { path: PathBuf, detail: String },
}

impl ClassificationError {
    /// The endpoint refused the API key. No case can succeed with it.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Api { status: 401 | 403, .. })
    }
}

impl Transient for ClassificationError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => !e.is_builder() && !e.is_decode(),
            Self::Api { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
