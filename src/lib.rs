//! # mirrorsync
//!
//! Mirror profile manager for AI coding CLIs with encrypted cloud sync.
//!
//! A mirror is a named API endpoint + credential for one downstream tool
//! (Codex or Claude). Mirrors live in a local JSON file and are kept
//! consistent across machines by trading one encrypted snapshot through a
//! blob store.
//!
//! ## Sync Flow
//! 1. Back up the local state file
//! 2. Download and decrypt the remote snapshot, verify its checksum
//! 3. Detect conflicts against local state
//! 4. Resolve them with the chosen strategy (local / remote / merge / manual)
//! 5. Commit atomically, or upload the new snapshot on push
//!
//! ## Modules
//! - `model`: mirror entries, the local set, tombstones
//! - `crypto`: AES-256-GCM with PBKDF2 (and legacy raw-key) derivation
//! - `snapshot`: the wire snapshot and its checksum
//! - `sync`: conflict detection, resolution, push/pull orchestration
//! - `transport`: blob stores (memory, directory, GitHub Gist)
//! - `apply`: exporting the current mirrors to the environment

pub mod apply;
pub mod backup;
pub mod config;
pub mod crypto;
pub mod model;
pub mod snapshot;
pub mod store;
pub mod sync;
pub mod transport;
pub mod util;

pub use config::Config;
pub use crypto::{CryptoEngine, CryptoError};
pub use model::{ProfileEntry, ProfileSet, ToolType};
pub use snapshot::SyncSnapshot;
pub use store::ProfileStore;
pub use sync::{PushStrategy, ResolutionStrategy, SyncError, SyncOrchestrator};
pub use transport::{SyncTransport, TransportError};
