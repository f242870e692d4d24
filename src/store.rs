//! Local mirror state file.
//!
//! Persists the [`ProfileSet`] as JSON at `{home}/mirrors.json`. Writes go to a
//! temp file that is renamed over the target, so a crash leaves either the old
//! or the new state on disk.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

use crate::model::ProfileSet;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// File-backed store for the local mirror set.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    /// Load the mirror set. A missing file yields an empty set.
    pub async fn load(&self) -> Result<ProfileSet, StoreError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No mirror state at {}, starting empty", self.path.display());
                return Ok(ProfileSet::default());
            }
            Err(err) => return Err(StoreError::io(&self.path, err)),
        };

        serde_json::from_slice(&bytes).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Atomically replace the on-disk state with `set`.
    pub async fn save(&self, set: &ProfileSet) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }

        let data = serde_json::to_vec_pretty(set).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, data)
            .await
            .map_err(|e| StoreError::io(&tmp_path, e))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;

        tracing::debug!("Saved mirror state to {}", self.path.display());
        Ok(())
    }
}
