pub mod case;
pub mod classification;
pub mod manifest;
pub mod retry;
pub mod schema;
pub mod year;

pub use case::{CaseRecord, DiscoveredCase};
pub use classification::{ClassificationResult, Outcome};
pub use manifest::{CaseStatus, Failure, ManifestEntry, RunManifest, Stage, StatusCounts};
pub use retry::{RetryPolicy, Transient};
pub use schema::output;
pub use year::{ArchiveYear, InvalidYear};
