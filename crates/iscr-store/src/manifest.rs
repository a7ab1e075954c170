use iscr_core::RunManifest;
use tracing::debug;

use crate::{CacheLayout, StoreError, write_atomic};

/// JSON persistence for per-year [`RunManifest`]s.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    layout: CacheLayout,
}

impl ManifestStore {
    pub fn new(layout: CacheLayout) -> Self {
        Self { layout }
    }

    /// Load the manifest for `year`, or an empty one if none was saved yet.
    pub fn load(&self, year: i32) -> Result<RunManifest, StoreError> {
        let path = self.layout.manifest_path(year);
        match std::fs::read(&path) {
            Ok(bytes) => {
                let manifest: RunManifest = serde_json::from_slice(&bytes)?;
                debug!(year, cases = manifest.len(), "loaded run manifest");
                Ok(manifest)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RunManifest::new(year)),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    /// Replace the stored manifest with `manifest`.
    pub fn save(&self, manifest: &RunManifest) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(manifest)?;
        write_atomic(&self.layout.manifest_path(manifest.year), &json)
    }
}
