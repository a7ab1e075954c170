//! Storage layer: on-disk cache layout, atomic file replacement, run manifests,
//! and the classified-cases CSV table read by the dashboard.

mod error;
pub use error::StoreError;

pub mod atomic;
pub mod layout;
pub mod manifest;
pub mod results;

pub use atomic::write_atomic;
pub use layout::CacheLayout;
pub use manifest::ManifestStore;
pub use results::{ClassifiedCase, ResultStore};
