//! Timestamped copies of the local state file.
//!
//! Every push/pull snapshots the state file before touching it. Backups are
//! grouped by prefix (`pre-pull`, `post-push`, ...) and only the newest N per
//! prefix are kept.

use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs;

pub const PRE_PUSH: &str = "pre-push";
pub const POST_PUSH: &str = "post-push";
pub const PRE_PULL: &str = "pre-pull";
pub const POST_PULL: &str = "post-pull";

/// Default number of backups retained per prefix.
pub const DEFAULT_RETAIN: usize = 10;

#[derive(Debug, Clone)]
pub struct BackupManager {
    dir: PathBuf,
    retain: usize,
}

impl BackupManager {
    pub fn new(dir: impl Into<PathBuf>, retain: usize) -> Self {
        Self {
            dir: dir.into(),
            retain: retain.max(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy `source` into the backup directory under `prefix`.
    ///
    /// Returns `None` when there is nothing to back up yet.
    pub async fn create(&self, prefix: &str, source: &Path) -> anyhow::Result<Option<PathBuf>> {
        if fs::metadata(source).await.is_err() {
            return Ok(None);
        }

        fs::create_dir_all(&self.dir).await?;
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6fZ").to_string();
        let target = self.free_path(prefix, &stamp).await;

        fs::copy(source, &target).await?;
        tracing::debug!(backup = %target.display(), "Created backup");

        self.prune(prefix).await?;
        Ok(Some(target))
    }

    /// First unused `<prefix>-<stamp>-<NNN>.json`. The padded counter keeps
    /// same-stamp backups in creation order when sorted.
    async fn free_path(&self, prefix: &str, stamp: &str) -> PathBuf {
        let mut n = 0u32;
        loop {
            let target = self.dir.join(format!("{}-{}-{:03}.json", prefix, stamp, n));
            if fs::metadata(&target).await.is_err() {
                return target;
            }
            n += 1;
        }
    }

    /// Backups for `prefix`, newest first.
    pub async fn list(&self, prefix: &str) -> anyhow::Result<Vec<PathBuf>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let marker = format!("{}-", prefix);
        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with(&marker) && name.ends_with(".json") {
                found.push(entry.path());
            }
        }

        // Timestamps sort lexically.
        found.sort();
        found.reverse();
        Ok(found)
    }

    pub async fn latest(&self, prefix: &str) -> anyhow::Result<Option<PathBuf>> {
        Ok(self.list(prefix).await?.into_iter().next())
    }

    /// Copy a backup back over `target` (temp file + rename).
    pub async fn restore(&self, backup: &Path, target: &Path) -> anyhow::Result<()> {
        let tmp_path = target.with_extension("json.restore");
        fs::copy(backup, &tmp_path).await?;
        fs::rename(&tmp_path, target).await?;
        tracing::info!(backup = %backup.display(), "Restored mirror state from backup");
        Ok(())
    }

    async fn prune(&self, prefix: &str) -> anyhow::Result<()> {
        let backups = self.list(prefix).await?;
        for stale in backups.iter().skip(self.retain) {
            if let Err(e) = fs::remove_file(stale).await {
                tracing::warn!(backup = %stale.display(), error = %e, "Failed to prune backup");
            }
        }
        Ok(())
    }
}
