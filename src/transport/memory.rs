//! In-memory blob store (non-persistent).

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{SyncTransport, TransportError};

/// Clones share the same blobs.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    blobs: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a blob directly, bypassing `upload`.
    pub async fn put_raw(&self, name: &str, data: Vec<u8>) {
        self.blobs.write().await.insert(name.to_string(), data);
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl SyncTransport for MemoryTransport {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn upload(&self, name: &str, data: &[u8]) -> Result<(), TransportError> {
        self.blobs
            .write()
            .await
            .insert(name.to_string(), data.to_vec());
        Ok(())
    }

    async fn download(&self, name: &str) -> Result<Vec<u8>, TransportError> {
        self.blobs
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(name.to_string()))
    }

    async fn list(&self) -> Result<Vec<String>, TransportError> {
        Ok(self.blobs.read().await.keys().cloned().collect())
    }

    async fn delete(&self, name: &str) -> Result<(), TransportError> {
        match self.blobs.write().await.remove(name) {
            Some(_) => Ok(()),
            None => Err(TransportError::NotFound(name.to_string())),
        }
    }
}
