//! Directory-backed blob store.
//!
//! Each blob is one file. Writes go to a temp file first and are renamed
//! into place so a concurrent reader never sees a partial blob.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::{SyncTransport, TransportError};

const TMP_SUFFIX: &str = ".tmp";

#[derive(Debug, Clone)]
pub struct DirTransport {
    root: PathBuf,
}

impl DirTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, name: &str) -> Result<PathBuf, TransportError> {
        if name.is_empty()
            || name.contains(['/', '\\'])
            || name == "."
            || name == ".."
            || name.ends_with(TMP_SUFFIX)
        {
            return Err(TransportError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }
}

fn not_found_or(err: std::io::Error, name: &str) -> TransportError {
    if err.kind() == std::io::ErrorKind::NotFound {
        TransportError::NotFound(name.to_string())
    } else {
        TransportError::Io(err)
    }
}

#[async_trait]
impl SyncTransport for DirTransport {
    fn kind(&self) -> &'static str {
        "dir"
    }

    async fn upload(&self, name: &str, data: &[u8]) -> Result<(), TransportError> {
        let path = self.blob_path(name)?;
        fs::create_dir_all(&self.root).await?;

        let tmp_path = self.root.join(format!("{}{}", name, TMP_SUFFIX));
        fs::write(&tmp_path, data).await?;
        fs::rename(&tmp_path, &path).await?;

        tracing::debug!(blob = %path.display(), bytes = data.len(), "Wrote blob");
        Ok(())
    }

    async fn download(&self, name: &str) -> Result<Vec<u8>, TransportError> {
        let path = self.blob_path(name)?;
        fs::read(&path).await.map_err(|e| not_found_or(e, name))
    }

    async fn list(&self) -> Result<Vec<String>, TransportError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.ends_with(TMP_SUFFIX) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<(), TransportError> {
        let path = self.blob_path(name)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| not_found_or(e, name))
    }
}
