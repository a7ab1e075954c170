//! Classification layer: prompt a language model with a case's text and turn
//! its reply into a validated [`ClassificationResult`](iscr_core::ClassificationResult).

mod error;
pub use error::ClassificationError;

pub mod classifier;
pub mod llm;
pub mod prompt;
pub mod response;
pub mod taxonomy;

pub use classifier::{Classifier, ClassifierConfig};
pub use llm::{Completion, DEFAULT_ENDPOINT, LanguageModel, Message, OpenAiChat, Role};
pub use response::{SchemaViolation, ValidatedResponse};
pub use taxonomy::{Guideline, Taxonomy};
