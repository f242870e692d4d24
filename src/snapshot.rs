//! Sync snapshot: the unit traded with the remote store.
//!
//! A snapshot is built fresh from the local [`ProfileSet`] on every push and
//! discarded after a pull is applied. API keys inside it are individually
//! sealed (`enc:` prefix) and the whole JSON document is then sealed again as
//! one blob before upload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::crypto::{is_encrypted_field, CryptoEngine, CryptoError};
use crate::model::{ProfileEntry, ProfileSet, ToolType};
use crate::sync::error::SyncError;

/// Current snapshot schema version.
pub const SNAPSHOT_VERSION: &str = "3.1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSnapshot {
    /// Active entries only.
    #[serde(default)]
    pub mirrors: Vec<ProfileEntry>,
    /// Tombstones only.
    #[serde(default)]
    pub deleted_mirrors: Vec<ProfileEntry>,
    #[serde(default)]
    pub current_codex: String,
    #[serde(default)]
    pub current_claude: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub device_id: String,
    pub version: String,
    /// SHA-256 over the canonical encoding of the plaintext `mirrors`.
    pub checksum: String,
    #[serde(default = "default_has_api_keys")]
    pub has_api_keys: bool,
}

fn default_has_api_keys() -> bool {
    true
}

/// Checksum over a list of entries, independent of their order.
///
/// Entries are sorted by name and encoded as JSON; object keys serialize in
/// sorted order so the encoding is canonical.
pub fn compute_checksum(mirrors: &[ProfileEntry]) -> String {
    let mut sorted: Vec<&ProfileEntry> = mirrors.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut hasher = Sha256::new();
    for entry in sorted {
        // Serializing a plain struct of strings/maps cannot fail.
        let value = serde_json::to_value(entry).unwrap_or(serde_json::Value::Null);
        hasher.update(value.to_string().as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Compare dotted schema versions numerically.
fn version_is_newer(candidate: &str, current: &str) -> bool {
    let parse = |v: &str| -> Vec<u64> {
        v.split('.')
            .map(|part| part.trim().parse::<u64>().unwrap_or(0))
            .collect()
    };
    parse(candidate) > parse(current)
}

impl SyncSnapshot {
    /// Build a sealed-field snapshot from the local set.
    ///
    /// The checksum is computed over the plaintext active entries before any
    /// API key is encrypted.
    pub fn from_profile_set(
        set: &ProfileSet,
        device_id: &str,
        crypto: &CryptoEngine,
    ) -> Result<Self, CryptoError> {
        let mut mirrors: Vec<ProfileEntry> = set.active().cloned().collect();
        mirrors.sort_by(|a, b| a.name.cmp(&b.name));
        let checksum = compute_checksum(&mirrors);

        let mut deleted_mirrors: Vec<ProfileEntry> = set.tombstones().cloned().collect();
        deleted_mirrors.sort_by(|a, b| a.name.cmp(&b.name));

        for entry in mirrors.iter_mut().chain(deleted_mirrors.iter_mut()) {
            entry.api_key = crypto.encrypt_field(&entry.api_key)?;
        }

        Ok(Self {
            mirrors,
            deleted_mirrors,
            current_codex: set.current_codex.clone(),
            current_claude: set.current_claude.clone(),
            timestamp: Utc::now(),
            device_id: device_id.to_string(),
            version: SNAPSHOT_VERSION.to_string(),
            checksum,
            has_api_keys: true,
        })
    }

    /// Decrypt every embedded API key in place.
    ///
    /// A tombstone whose key will not decrypt has its key cleared with a
    /// warning. An active entry whose key will not decrypt is fatal.
    pub fn decrypt_api_keys(&mut self, crypto: &CryptoEngine) -> Result<(), SyncError> {
        for entry in self.mirrors.iter_mut() {
            entry.api_key = crypto
                .decrypt_field(&entry.api_key)
                .map_err(|source| SyncError::KeyDecryption {
                    mirror: entry.name.clone(),
                    source,
                })?;
        }

        for entry in self.deleted_mirrors.iter_mut() {
            match crypto.decrypt_field(&entry.api_key) {
                Ok(key) => entry.api_key = key,
                Err(e) => {
                    tracing::warn!(
                        mirror = %entry.name,
                        error = %e,
                        "Could not decrypt API key of deleted mirror, clearing it"
                    );
                    entry.api_key.clear();
                }
            }
        }
        Ok(())
    }

    /// Whether any API key is still in `enc:` form.
    pub fn has_sealed_keys(&self) -> bool {
        self.mirrors
            .iter()
            .chain(self.deleted_mirrors.iter())
            .any(|m| is_encrypted_field(&m.api_key))
    }

    /// Recompute the checksum over `mirrors` and compare it to the declared one.
    pub fn verify_checksum(&self) -> Result<(), SyncError> {
        let actual = compute_checksum(&self.mirrors);
        if actual != self.checksum {
            return Err(SyncError::Integrity {
                expected: self.checksum.clone(),
                actual,
            });
        }
        Ok(())
    }

    pub fn is_newer_schema(&self) -> bool {
        version_is_newer(&self.version, SNAPSHOT_VERSION)
    }

    /// Serialize and seal the snapshot for upload.
    pub fn seal(&self, crypto: &CryptoEngine) -> Result<Vec<u8>, SyncError> {
        let json = serde_json::to_vec(self)
            .map_err(|e| SyncError::InvalidSnapshot(format!("Failed to encode snapshot: {}", e)))?;
        Ok(crypto.encrypt(&json)?)
    }

    /// Open a sealed blob: outer decrypt, parse, then decrypt embedded keys.
    pub fn open(blob: &[u8], crypto: &CryptoEngine) -> Result<Self, SyncError> {
        let json = crypto.decrypt(blob)?;
        let mut snapshot: SyncSnapshot = serde_json::from_slice(&json)
            .map_err(|e| SyncError::InvalidSnapshot(format!("Failed to parse snapshot: {}", e)))?;

        if snapshot.is_newer_schema() {
            tracing::warn!(
                version = %snapshot.version,
                supported = SNAPSHOT_VERSION,
                "Remote snapshot was written by a newer version"
            );
        }

        snapshot.decrypt_api_keys(crypto)?;
        Ok(snapshot)
    }

    pub fn current(&self, tool: ToolType) -> &str {
        match tool {
            ToolType::Codex => &self.current_codex,
            ToolType::Claude => &self.current_claude,
        }
    }

    /// Names of remote tombstones with their deletion time.
    pub fn tombstone_times(&self) -> BTreeMap<&str, Option<DateTime<Utc>>> {
        self.deleted_mirrors
            .iter()
            .map(|m| (m.name.as_str(), m.deleted_at))
            .collect()
    }
}

/// Replace local mirror data with a decrypted snapshot.
///
/// The checksum is verified first; on mismatch `local` is returned untouched
/// via the error path. Local API keys are kept when the remote one is empty,
/// local-only entries and tombstones are preserved, and current pointers
/// are revalidated.
pub fn apply_snapshot(local: &ProfileSet, snapshot: &SyncSnapshot) -> Result<ProfileSet, SyncError> {
    snapshot.verify_checksum()?;

    let mut next = local.clone();
    let mut mirrors: Vec<ProfileEntry> = Vec::with_capacity(snapshot.mirrors.len());

    for remote in &snapshot.mirrors {
        let mut entry = remote.clone();
        entry.deleted = false;
        entry.deleted_at = None;
        if entry.api_key.is_empty() {
            if let Some(existing) = local.find_active(&entry.name) {
                entry.api_key = existing.api_key.clone();
            }
        }
        entry.refresh_env_key();
        mirrors.push(entry);
    }

    for tomb in &snapshot.deleted_mirrors {
        if mirrors.iter().any(|m| m.name == tomb.name) {
            continue;
        }
        let mut entry = tomb.without_api_key();
        entry.deleted = true;
        if entry.deleted_at.is_none() {
            entry.deleted_at = Some(snapshot.timestamp);
        }
        mirrors.push(entry);
    }

    // Local entries the remote has no record of were never pushed.
    for local_entry in &local.mirrors {
        if !mirrors.iter().any(|m| m.name == local_entry.name) {
            mirrors.push(local_entry.clone());
        }
    }

    next.mirrors = mirrors;
    next.current_codex = snapshot.current_codex.clone();
    next.current_claude = snapshot.current_claude.clone();
    next.revalidate_current();
    next.sort();
    Ok(next)
}
