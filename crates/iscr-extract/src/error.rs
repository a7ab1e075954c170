use std::path::PathBuf;

use iscr_core::Transient;
use iscr_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("could not render {}: {detail}", .path.display())]
    Render { path: PathBuf, detail: String },

    #[error("no extractable text in {} (scanned image?)", .path.display())]
    NoText { path: PathBuf },

    #[error("io error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("extraction task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("text cache write failed: {0}")]
    Cache(#[from] StoreError),
}

impl Transient for ExtractionError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}
