//! Extraction layer: turn cached case PDFs into normalised plain text and
//! cache it next to the raw document.

mod error;
pub use error::ExtractionError;

pub mod backend;
pub mod extractor;
pub mod normalize;

pub use backend::{PdfExtractBackend, TextBackend};
pub use extractor::Extractor;
pub use normalize::{normalize, normalize_pages};
