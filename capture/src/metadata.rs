//! Per-scope capture bookkeeping, stored as one small JSON file per
//! scope. Writes go through a tmp-file rename so a crashed update
//! leaves the previous record intact.

use std::path::{Path, PathBuf};

use chrono::Utc;
use eg_core::types::{CaptureMetadata, ScopeRef};
use errors::CaptureError;

pub struct CaptureMetadataStore {
    dir: PathBuf,
}

impl CaptureMetadataStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, scope: &ScopeRef) -> PathBuf {
        // Scopes may contain path separators; flatten them.
        let safe: String = scope
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }

    /// Load the record for a scope, defaulting when none exists yet.
    pub fn load(&self, scope: &ScopeRef) -> Result<CaptureMetadata, CaptureError> {
        let path = self.path_for(scope);
        match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| CaptureError::Metadata {
                scope: scope.to_string(),
                reason: format!("{}: {}", path.display(), e),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CaptureMetadata::default()),
            Err(e) => Err(CaptureError::Metadata {
                scope: scope.to_string(),
                reason: format!("{}: {}", path.display(), e),
            }),
        }
    }

    /// Read-modify-write under an atomic rename.
    pub fn update<F>(&self, scope: &ScopeRef, mutate: F) -> Result<CaptureMetadata, CaptureError>
    where
        F: FnOnce(&mut CaptureMetadata),
    {
        std::fs::create_dir_all(&self.dir).map_err(|e| CaptureError::Metadata {
            scope: scope.to_string(),
            reason: format!("{}: {}", self.dir.display(), e),
        })?;

        let mut metadata = self.load(scope)?;
        mutate(&mut metadata);
        metadata.updated_at = Some(Utc::now());

        let path = self.path_for(scope);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(&metadata).map_err(|e| CaptureError::Metadata {
            scope: scope.to_string(),
            reason: e.to_string(),
        })?;
        std::fs::write(&tmp, bytes).map_err(|e| CaptureError::Metadata {
            scope: scope.to_string(),
            reason: format!("{}: {}", tmp.display(), e),
        })?;
        std::fs::rename(&tmp, &path).map_err(|e| CaptureError::Metadata {
            scope: scope.to_string(),
            reason: format!("{}: {}", path.display(), e),
        })?;

        Ok(metadata)
    }
}
