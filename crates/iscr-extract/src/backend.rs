//! The text-extraction backend seam.

/// Renders a PDF into one text string per page.
///
/// Implementations are synchronous and CPU-bound; the [`Extractor`](crate::Extractor)
/// runs them on the blocking pool.
pub trait TextBackend: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Extract page texts. The error is a human-readable reason.
    fn extract_pages(&self, pdf: &[u8]) -> Result<Vec<String>, String>;
}

/// [`TextBackend`] over the `pdf-extract` crate. Handles PDFs with an embedded
/// text layer; scanned images come back empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractBackend;

impl TextBackend for PdfExtractBackend {
    fn name(&self) -> &str {
        "pdf-extract"
    }

    fn extract_pages(&self, pdf: &[u8]) -> Result<Vec<String>, String> {
        pdf_extract::extract_text_from_mem_by_pages(pdf).map_err(|e| e.to_string())
    }
}
