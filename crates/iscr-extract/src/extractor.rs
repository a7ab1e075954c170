use std::path::{Path, PathBuf};
use std::sync::Arc;

use iscr_core::CaseRecord;
use iscr_store::write_atomic;
use tracing::{debug, info};

use crate::backend::TextBackend;
use crate::{ExtractionError, normalize};

/// Converts a case's cached PDF into normalised text at `record.text_path`.
#[derive(Clone)]
pub struct Extractor {
    backend: Arc<dyn TextBackend>,
}

impl Extractor {
    pub fn new(backend: Arc<dyn TextBackend>) -> Self {
        Self { backend }
    }

    /// Extract and cache the text for `record`, returning the text path.
    ///
    /// A non-empty text cache is reused without calling the backend.
    pub async fn extract(&self, record: &CaseRecord) -> Result<PathBuf, ExtractionError> {
        if has_text(&record.text_path).await {
            debug!(case_id = %record.case_id, "text cache hit");
            return Ok(record.text_path.clone());
        }

        let raw_path = record.raw_path.clone();
        let pdf = tokio::fs::read(&raw_path)
            .await
            .map_err(|source| ExtractionError::Io {
                path: raw_path.clone(),
                source,
            })?;

        let backend = Arc::clone(&self.backend);
        let pages = tokio::task::spawn_blocking(move || backend.extract_pages(&pdf))
            .await?
            .map_err(|detail| ExtractionError::Render {
                path: raw_path.clone(),
                detail,
            })?;

        let text = normalize::normalize_pages(&pages);
        if text.is_empty() {
            return Err(ExtractionError::NoText { path: raw_path });
        }

        write_atomic(&record.text_path, text.as_bytes())?;
        info!(
            case_id = %record.case_id,
            backend = self.backend.name(),
            pages = pages.len(),
            chars = text.len(),
            "extracted text"
        );
        Ok(record.text_path.clone())
    }

    /// Read previously extracted text.
    pub async fn read_text(&self, record: &CaseRecord) -> Result<String, ExtractionError> {
        tokio::fs::read_to_string(&record.text_path)
            .await
            .map_err(|source| ExtractionError::Io {
                path: record.text_path.clone(),
                source,
            })
    }
}

async fn has_text(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|m| m.is_file() && m.len() > 0)
}
