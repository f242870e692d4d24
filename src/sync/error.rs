//! Error taxonomy for push/pull.

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::store::StoreError;
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Could not decrypt API key of mirror '{mirror}': {source}")]
    KeyDecryption {
        mirror: String,
        #[source]
        source: CryptoError,
    },

    #[error("Data corrupted: checksum mismatch (expected {expected}, got {actual})")]
    Integrity { expected: String, actual: String },

    #[error("Invalid remote snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("No remote snapshot found; push from a configured device first")]
    RemoteMissing,

    #[error("{0} conflict(s) with the remote snapshot; pull and reconcile before pushing")]
    ConflictsRequireResolution(usize),

    #[error("Sync cancelled by user")]
    Cancelled,

    #[error("Manual conflict resolution needs an interactive prompt")]
    PromptUnavailable,

    #[error("Local state error: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    /// A user abort: nothing was changed and nothing should be restored.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Only network-class transport failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_transient())
    }
}
