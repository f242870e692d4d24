//! Named-blob stores the sync engine uploads snapshots to.
//!
//! Supports:
//! - `memory`: in-process map (tests, dry runs)
//! - `dir`: a local directory, e.g. one kept in sync by a cloud drive
//! - `gist`: a secret GitHub gist over the REST API

mod dir;
pub mod gist;
mod memory;

pub use dir::DirTransport;
pub use gist::GistTransport;
pub use memory::MemoryTransport;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    /// The blob (or the container holding it) does not exist yet.
    #[error("Remote blob not found: {0}")]
    NotFound(String),

    #[error("Remote store rejected credentials: {0}")]
    Unauthorized(String),

    #[error("Remote store returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid blob name: {0:?}")]
    InvalidName(String),

    #[error("Unexpected response from remote store: {0}")]
    InvalidResponse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Worth retrying later without changing anything.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::Http {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None if err.is_decode() => Self::InvalidResponse(err.to_string()),
            None => Self::Network(err.to_string()),
        }
    }
}

/// Upload/download of opaque blobs by name.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Short name for logs (`gist`, `dir`, ...).
    fn kind(&self) -> &'static str;

    /// Create or replace the blob `name`.
    async fn upload(&self, name: &str, data: &[u8]) -> Result<(), TransportError>;

    /// Fetch the blob `name`. A missing blob is [`TransportError::NotFound`].
    async fn download(&self, name: &str) -> Result<Vec<u8>, TransportError>;

    /// Names of all stored blobs, sorted.
    async fn list(&self) -> Result<Vec<String>, TransportError>;

    async fn delete(&self, name: &str) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(TransportError::Network("reset".into()).is_transient());
        assert!(TransportError::Http {
            status: 502,
            message: "bad gateway".into()
        }
        .is_transient());
        assert!(!TransportError::Http {
            status: 422,
            message: "invalid".into()
        }
        .is_transient());
        assert!(!TransportError::Unauthorized("token".into()).is_transient());
        assert!(TransportError::NotFound("x".into()).is_not_found());
    }
}
