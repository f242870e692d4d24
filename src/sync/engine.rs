//! Push/pull orchestration.
//!
//! Both directions share one shape:
//! backup → fetch/open remote → detect → resolve → verify → commit → backup.
//! Everything that can fail on the remote side (decrypt, checksum, user
//! abort) happens before the local state file is touched.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::conflict::{detect_conflicts, ConflictReport};
use super::error::SyncError;
use super::prompt::ConflictPrompter;
use super::resolver::{ConflictResolver, PushStrategy, ResolutionStrategy};
use crate::backup::{BackupManager, POST_PULL, POST_PUSH, PRE_PULL, PRE_PUSH};
use crate::crypto::CryptoEngine;
use crate::model::{tombstone_retention, ProfileSet};
use crate::snapshot::{apply_snapshot, SyncSnapshot};
use crate::store::ProfileStore;
use crate::transport::SyncTransport;

/// The one blob name all devices share.
pub const DEFAULT_BLOB_NAME: &str = "mirrors.sync";

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub blob_name: String,
    /// Prompt per field during `merge` instead of comparing timestamps.
    pub interactive: bool,
    pub backup_after_sync: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            blob_name: DEFAULT_BLOB_NAME.to_string(),
            interactive: false,
            backup_after_sync: true,
        }
    }
}

/// What a push or pull did.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// Conflicts detected against the remote snapshot.
    pub conflicts: usize,
    /// Push only: no remote snapshot existed yet.
    pub first_push: bool,
    /// The local mirror list or pointers changed.
    pub changed: bool,
    pub active_mirrors: usize,
    pub last_sync: DateTime<Utc>,
    /// Local state as committed.
    pub state: ProfileSet,
}

/// Read-only comparison with the remote snapshot.
#[derive(Debug, Clone)]
pub struct SyncStatus {
    pub remote_exists: bool,
    pub remote_device: Option<String>,
    pub remote_timestamp: Option<DateTime<Utc>>,
    pub remote_version: Option<String>,
    pub local_active: usize,
    pub remote_active: usize,
    pub last_sync: Option<DateTime<Utc>>,
    pub report: Option<ConflictReport>,
}

pub struct SyncOrchestrator {
    transport: Arc<dyn SyncTransport>,
    store: ProfileStore,
    backups: BackupManager,
    crypto: CryptoEngine,
    options: SyncOptions,
    prompter: Option<Arc<dyn ConflictPrompter>>,
}

impl SyncOrchestrator {
    pub fn new(
        transport: Arc<dyn SyncTransport>,
        store: ProfileStore,
        backups: BackupManager,
        password: &str,
        options: SyncOptions,
    ) -> Result<Self, SyncError> {
        let crypto = CryptoEngine::new(password)?;
        Ok(Self::with_crypto(transport, store, backups, crypto, options))
    }

    pub fn with_crypto(
        transport: Arc<dyn SyncTransport>,
        store: ProfileStore,
        backups: BackupManager,
        crypto: CryptoEngine,
        options: SyncOptions,
    ) -> Self {
        Self {
            transport,
            store,
            backups,
            crypto,
            options,
            prompter: None,
        }
    }

    pub fn with_prompter(mut self, prompter: Arc<dyn ConflictPrompter>) -> Self {
        self.prompter = Some(prompter);
        self
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    fn resolver(&self) -> ConflictResolver<'_> {
        let resolver = ConflictResolver::new();
        match self.prompter.as_deref() {
            Some(prompter) => resolver.with_prompter(prompter, self.options.interactive),
            None => resolver,
        }
    }

    async fn download_blob(&self) -> Result<Option<Vec<u8>>, SyncError> {
        match self.transport.download(&self.options.blob_name).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Decrypt, parse and checksum-verify a remote blob.
    fn open_verified(&self, blob: &[u8]) -> Result<SyncSnapshot, SyncError> {
        let snapshot = SyncSnapshot::open(blob, &self.crypto)?;
        snapshot.verify_checksum()?;
        Ok(snapshot)
    }

    /// Best effort: a failed backup is logged and the operation continues.
    async fn backup(&self, prefix: &str) -> Option<PathBuf> {
        match self.backups.create(prefix, self.store.path()).await {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(prefix = %prefix, error = %e, "Backup failed, continuing");
                None
            }
        }
    }

    /// Persist `state`, restoring the pre-operation backup if the write fails.
    async fn commit(&self, state: &ProfileSet, pre_backup: Option<&Path>) -> Result<(), SyncError> {
        let Err(e) = self.store.save(state).await else {
            return Ok(());
        };

        tracing::error!(error = %e, "Failed to write mirror state");
        if let Some(backup) = pre_backup {
            if let Err(restore_err) = self.backups.restore(backup, self.store.path()).await {
                tracing::error!(
                    backup = %backup.display(),
                    error = %restore_err,
                    "Failed to restore backup after write failure"
                );
            }
        }
        Err(e.into())
    }

    /// Fetch the remote snapshot and fold it into the local state.
    pub async fn pull(&self, strategy: ResolutionStrategy) -> Result<SyncOutcome, SyncError> {
        tracing::info!(
            transport = self.transport.kind(),
            blob = %self.options.blob_name,
            strategy = %strategy,
            "Starting pull"
        );

        let local = self.store.load().await?;
        let pre_backup = self.backup(PRE_PULL).await;

        let blob = self.download_blob().await?.ok_or(SyncError::RemoteMissing)?;
        let remote = self.open_verified(&blob)?;
        tracing::debug!(
            remote_device = %remote.device_id,
            remote_mirrors = remote.mirrors.len(),
            "Opened remote snapshot"
        );

        let report = detect_conflicts(&local, &remote);
        let mut next = if report.is_empty() {
            apply_snapshot(&local, &remote)?
        } else {
            tracing::info!(conflicts = report.len(), "Remote snapshot diverged from local state");
            match self.resolver().resolve(&local, &remote, &report, strategy) {
                Ok(resolved) => resolved,
                Err(e) if e.is_cancelled() => {
                    tracing::info!("Pull cancelled, local state unchanged");
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        };

        for tool in next.revalidate_current() {
            tracing::info!(tool = %tool, "Current mirror no longer exists, cleared");
        }

        let changed = next.mirrors != local.mirrors
            || next.current_codex != local.current_codex
            || next.current_claude != local.current_claude;
        let now = Utc::now();
        next.last_sync = Some(now);
        next.ensure_device_id();

        self.commit(&next, pre_backup.as_deref()).await?;
        if self.options.backup_after_sync {
            self.backup(POST_PULL).await;
        }

        let active_mirrors = next.active().count();
        tracing::info!(
            conflicts = report.len(),
            changed,
            active_mirrors,
            "Pull complete"
        );

        Ok(SyncOutcome {
            conflicts: report.len(),
            first_push: false,
            changed,
            active_mirrors,
            last_sync: now,
            state: next,
        })
    }

    /// Upload the local state, reconciling with the remote first.
    pub async fn push(&self, strategy: PushStrategy) -> Result<SyncOutcome, SyncError> {
        tracing::info!(
            transport = self.transport.kind(),
            blob = %self.options.blob_name,
            strategy = %strategy,
            "Starting push"
        );

        let mut local = self.store.load().await?;
        let device_id = local.ensure_device_id();
        let pre_backup = self.backup(PRE_PUSH).await;

        let blob = self.download_blob().await?;
        let first_push = blob.is_none();
        let mut conflicts = 0;
        let mut next = local.clone();

        if let Some(blob) = blob {
            match self.open_verified(&blob) {
                Ok(remote) => {
                    let report = detect_conflicts(&local, &remote);
                    conflicts = report.len();
                    if !report.is_empty() {
                        match strategy {
                            PushStrategy::Auto | PushStrategy::Merge => {
                                next = self.resolver().resolve(
                                    &local,
                                    &remote,
                                    &report,
                                    ResolutionStrategy::Merge,
                                )?;
                            }
                            PushStrategy::Force => {
                                tracing::warn!(conflicts, "Overwriting remote snapshot despite conflicts");
                            }
                            PushStrategy::Manual => {
                                tracing::info!(conflicts, "Push refused, remote has diverged");
                                return Err(SyncError::ConflictsRequireResolution(conflicts));
                            }
                        }
                    }
                }
                Err(e) if strategy == PushStrategy::Force => {
                    tracing::warn!(error = %e, "Remote snapshot unreadable, overwriting it");
                }
                Err(e) => return Err(e),
            }
        } else {
            tracing::info!("No remote snapshot yet, first push");
        }

        let now = Utc::now();
        next.last_sync = Some(now);
        let snapshot = SyncSnapshot::from_profile_set(&next, &device_id, &self.crypto)?;
        let sealed = snapshot.seal(&self.crypto)?;
        self.transport
            .upload(&self.options.blob_name, &sealed)
            .await?;
        tracing::debug!(bytes = sealed.len(), "Uploaded snapshot");

        let purged = next.purge_tombstones(now - tombstone_retention());
        if purged > 0 {
            tracing::info!(purged, "Dropped tombstones past retention");
        }

        let changed = next.mirrors != local.mirrors
            || next.current_codex != local.current_codex
            || next.current_claude != local.current_claude;
        local = next;
        self.commit(&local, pre_backup.as_deref()).await?;
        if self.options.backup_after_sync {
            self.backup(POST_PUSH).await;
        }

        let active_mirrors = local.active().count();
        tracing::info!(first_push, conflicts, active_mirrors, "Push complete");

        Ok(SyncOutcome {
            conflicts,
            first_push,
            changed,
            active_mirrors,
            last_sync: now,
            state: local,
        })
    }

    /// Compare against the remote without changing anything.
    pub async fn status(&self) -> Result<SyncStatus, SyncError> {
        let local = self.store.load().await?;
        let local_active = local.active().count();

        let Some(blob) = self.download_blob().await? else {
            return Ok(SyncStatus {
                remote_exists: false,
                remote_device: None,
                remote_timestamp: None,
                remote_version: None,
                local_active,
                remote_active: 0,
                last_sync: local.last_sync,
                report: None,
            });
        };

        let remote = self.open_verified(&blob)?;
        let report = detect_conflicts(&local, &remote);
        Ok(SyncStatus {
            remote_exists: true,
            remote_device: Some(remote.device_id.clone()),
            remote_timestamp: Some(remote.timestamp),
            remote_version: Some(remote.version.clone()),
            local_active,
            remote_active: remote.mirrors.len(),
            last_sync: local.last_sync,
            report: Some(report),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_engine;
    use crate::model::{ProfileEntry, ToolType};
    use crate::sync::prompt::ManualChoice;
    use crate::sync::resolver::tests::ScriptedPrompter;
    use crate::transport::{MemoryTransport, TransportError};
    use chrono::Duration;

    fn orchestrator(dir: &Path, transport: &MemoryTransport, password: &str) -> SyncOrchestrator {
        SyncOrchestrator::with_crypto(
            Arc::new(transport.clone()),
            ProfileStore::new(dir.join("mirrors.json")),
            BackupManager::new(dir.join("backups"), 5),
            test_engine(password),
            SyncOptions::default(),
        )
    }

    async fn seed(orch: &SyncOrchestrator, build: impl FnOnce(&mut ProfileSet)) -> ProfileSet {
        let mut set = ProfileSet::default();
        build(&mut set);
        orch.store().save(&set).await.unwrap();
        set
    }

    fn two_mirrors(set: &mut ProfileSet) {
        set.add(
            ProfileEntry::new("official", ToolType::Codex, "https://api.openai.com/v1")
                .with_api_key("sk-1"),
        )
        .unwrap();
        set.add(ProfileEntry::new("relay", ToolType::Claude, "https://relay").with_api_key("sk-2"))
            .unwrap();
        set.switch("official").unwrap();
        set.switch("relay").unwrap();
    }

    #[tokio::test]
    async fn first_push_then_pull_on_new_device() {
        let transport = MemoryTransport::new();
        let dir_a = tempfile::tempdir().expect("tempdir");
        let dir_b = tempfile::tempdir().expect("tempdir");
        let a = orchestrator(dir_a.path(), &transport, "pw");
        let b = orchestrator(dir_b.path(), &transport, "pw");

        seed(&a, two_mirrors).await;
        let pushed = a.push(PushStrategy::Auto).await.unwrap();
        assert!(pushed.first_push);
        assert_eq!(pushed.conflicts, 0);
        assert!(pushed.state.device_id.is_some());
        assert_eq!(transport.len().await, 1);

        let pulled = b.pull(ResolutionStrategy::Merge).await.unwrap();
        assert!(pulled.conflicts > 0);
        assert_eq!(pulled.active_mirrors, 2);
        // Credentials are not imported for mirrors this device never had.
        assert!(pulled.state.active().all(|m| m.api_key.is_empty()));
        assert_eq!(pulled.state.current_codex, "official");
        assert_eq!(pulled.state.current_claude, "relay");

        let on_disk = b.store().load().await.unwrap();
        assert_eq!(on_disk.mirrors, pulled.state.mirrors);
        assert!(on_disk.last_sync.is_some());
    }

    #[tokio::test]
    async fn pull_in_sync_is_quiet() {
        let transport = MemoryTransport::new();
        let dir = tempfile::tempdir().expect("tempdir");
        let orch = orchestrator(dir.path(), &transport, "pw");

        seed(&orch, two_mirrors).await;
        orch.push(PushStrategy::Auto).await.unwrap();

        let pulled = orch.pull(ResolutionStrategy::Manual).await.unwrap();
        assert_eq!(pulled.conflicts, 0);
        assert!(!pulled.changed);
        assert_eq!(pulled.state.find_active("relay").unwrap().api_key, "sk-2");
    }

    #[tokio::test]
    async fn pull_without_remote_fails() {
        let transport = MemoryTransport::new();
        let dir = tempfile::tempdir().expect("tempdir");
        let orch = orchestrator(dir.path(), &transport, "pw");

        let err = orch.pull(ResolutionStrategy::Merge).await.unwrap_err();
        assert!(matches!(err, SyncError::RemoteMissing));
    }

    #[tokio::test]
    async fn pull_with_wrong_password_leaves_local_untouched() {
        let transport = MemoryTransport::new();
        let dir_a = tempfile::tempdir().expect("tempdir");
        let dir_b = tempfile::tempdir().expect("tempdir");
        let a = orchestrator(dir_a.path(), &transport, "pw");
        let b = orchestrator(dir_b.path(), &transport, "other");

        seed(&a, two_mirrors).await;
        a.push(PushStrategy::Auto).await.unwrap();
        seed(&b, |set| {
            set.add(ProfileEntry::new("mine", ToolType::Codex, "https://m"))
                .unwrap();
        })
        .await;
        let before = std::fs::read(b.store().path()).unwrap();

        let err = b.pull(ResolutionStrategy::Merge).await.unwrap_err();
        assert!(matches!(err, SyncError::Crypto(_)));
        assert!(!err.is_retryable());
        assert_eq!(std::fs::read(b.store().path()).unwrap(), before);
    }

    #[tokio::test]
    async fn corrupted_checksum_blocks_pull() {
        let transport = MemoryTransport::new();
        let dir = tempfile::tempdir().expect("tempdir");
        let orch = orchestrator(dir.path(), &transport, "pw");
        let crypto = test_engine("pw");

        let local = seed(&orch, two_mirrors).await;
        let mut snapshot = SyncSnapshot::from_profile_set(&local, "elsewhere", &crypto).unwrap();
        snapshot.checksum = "0".repeat(64);
        transport
            .put_raw(DEFAULT_BLOB_NAME, snapshot.seal(&crypto).unwrap())
            .await;
        let before = std::fs::read(orch.store().path()).unwrap();

        let err = orch.pull(ResolutionStrategy::Remote).await.unwrap_err();
        assert!(matches!(err, SyncError::Integrity { .. }));
        assert!(err.to_string().contains("Data corrupted"));
        assert_eq!(std::fs::read(orch.store().path()).unwrap(), before);
    }

    #[tokio::test]
    async fn manual_abort_is_clean_cancellation() {
        let transport = MemoryTransport::new();
        let dir_a = tempfile::tempdir().expect("tempdir");
        let dir_b = tempfile::tempdir().expect("tempdir");
        let a = orchestrator(dir_a.path(), &transport, "pw");
        let b = orchestrator(dir_b.path(), &transport, "pw").with_prompter(Arc::new(
            ScriptedPrompter::new(None, Some(ManualChoice::Abort)),
        ));

        seed(&a, two_mirrors).await;
        a.push(PushStrategy::Auto).await.unwrap();
        seed(&b, |set| {
            set.add(ProfileEntry::new("mine", ToolType::Codex, "https://m"))
                .unwrap();
        })
        .await;
        let before = std::fs::read(b.store().path()).unwrap();

        let err = b.pull(ResolutionStrategy::Manual).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(std::fs::read(b.store().path()).unwrap(), before);
    }

    #[tokio::test]
    async fn remote_deletion_propagates_on_pull() {
        let transport = MemoryTransport::new();
        let dir_a = tempfile::tempdir().expect("tempdir");
        let dir_b = tempfile::tempdir().expect("tempdir");
        let a = orchestrator(dir_a.path(), &transport, "pw");
        let b = orchestrator(dir_b.path(), &transport, "pw");

        seed(&a, two_mirrors).await;
        a.push(PushStrategy::Auto).await.unwrap();
        seed(&b, two_mirrors).await;
        b.pull(ResolutionStrategy::Merge).await.unwrap();

        let mut state = a.store().load().await.unwrap();
        state.remove("relay").unwrap();
        a.store().save(&state).await.unwrap();
        a.push(PushStrategy::Auto).await.unwrap();

        let pulled = b.pull(ResolutionStrategy::Merge).await.unwrap();
        assert!(pulled.state.find_active("relay").is_none());
        assert!(pulled.state.find("relay").unwrap().is_tombstone());
        assert_eq!(pulled.state.current_claude, "");
        assert_eq!(pulled.state.find_active("official").unwrap().api_key, "sk-1");
    }

    #[tokio::test]
    async fn push_merges_remote_changes() {
        let transport = MemoryTransport::new();
        let dir_a = tempfile::tempdir().expect("tempdir");
        let dir_b = tempfile::tempdir().expect("tempdir");
        let a = orchestrator(dir_a.path(), &transport, "pw");
        let b = orchestrator(dir_b.path(), &transport, "pw");

        seed(&a, two_mirrors).await;
        a.push(PushStrategy::Auto).await.unwrap();

        seed(&b, |set| {
            set.add(ProfileEntry::new("local-only", ToolType::Codex, "https://l").with_api_key("kl"))
                .unwrap();
        })
        .await;
        let pushed = b.push(PushStrategy::Auto).await.unwrap();
        assert!(!pushed.first_push);
        assert!(pushed.conflicts > 0);
        assert!(pushed.changed);
        assert_eq!(pushed.active_mirrors, 3);
        assert_eq!(pushed.state.find_active("local-only").unwrap().api_key, "kl");

        let status = a.status().await.unwrap();
        assert!(status.remote_exists);
        assert_eq!(status.remote_active, 3);
    }

    #[tokio::test]
    async fn manual_push_refuses_on_conflict() {
        let transport = MemoryTransport::new();
        let dir_a = tempfile::tempdir().expect("tempdir");
        let dir_b = tempfile::tempdir().expect("tempdir");
        let a = orchestrator(dir_a.path(), &transport, "pw");
        let b = orchestrator(dir_b.path(), &transport, "pw");

        seed(&a, two_mirrors).await;
        a.push(PushStrategy::Auto).await.unwrap();
        let remote_before = transport.download(DEFAULT_BLOB_NAME).await.unwrap();

        seed(&b, |set| {
            set.add(ProfileEntry::new("other", ToolType::Codex, "https://o"))
                .unwrap();
        })
        .await;
        let err = b.push(PushStrategy::Manual).await.unwrap_err();
        assert!(matches!(err, SyncError::ConflictsRequireResolution(n) if n > 0));
        assert_eq!(
            transport.download(DEFAULT_BLOB_NAME).await.unwrap(),
            remote_before
        );
    }

    #[tokio::test]
    async fn force_push_overwrites_unreadable_remote() {
        let transport = MemoryTransport::new();
        let dir = tempfile::tempdir().expect("tempdir");
        let orch = orchestrator(dir.path(), &transport, "pw");

        transport.put_raw(DEFAULT_BLOB_NAME, b"garbage".to_vec()).await;
        seed(&orch, two_mirrors).await;

        assert!(orch.push(PushStrategy::Auto).await.is_err());
        let pushed = orch.push(PushStrategy::Force).await.unwrap();
        assert!(!pushed.first_push);

        let status = orch.status().await.unwrap();
        assert_eq!(status.remote_active, 2);
        assert!(status.report.unwrap().is_empty());
    }

    #[tokio::test]
    async fn push_purges_expired_tombstones() {
        let transport = MemoryTransport::new();
        let dir = tempfile::tempdir().expect("tempdir");
        let orch = orchestrator(dir.path(), &transport, "pw");

        seed(&orch, |set| {
            two_mirrors(set);
            set.remove("relay").unwrap();
            set.mirrors
                .iter_mut()
                .filter(|m| m.name == "relay")
                .for_each(|m| m.deleted_at = Some(Utc::now() - Duration::days(45)));
        })
        .await;

        let pushed = orch.push(PushStrategy::Auto).await.unwrap();
        assert!(pushed.state.find("relay").is_none());
    }

    #[tokio::test]
    async fn status_is_read_only() {
        let transport = MemoryTransport::new();
        let dir = tempfile::tempdir().expect("tempdir");
        let orch = orchestrator(dir.path(), &transport, "pw");

        let status = orch.status().await.unwrap();
        assert!(!status.remote_exists);
        assert!(status.report.is_none());

        seed(&orch, two_mirrors).await;
        orch.push(PushStrategy::Auto).await.unwrap();
        let mut state = orch.store().load().await.unwrap();
        state
            .update(
                "official",
                crate::model::ProfilePatch {
                    base_url: Some("https://changed".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        orch.store().save(&state).await.unwrap();
        let before = std::fs::read(orch.store().path()).unwrap();

        let status = orch.status().await.unwrap();
        assert!(status.remote_exists);
        assert_eq!(status.report.unwrap().len(), 1);
        assert_eq!(std::fs::read(orch.store().path()).unwrap(), before);
    }

    #[tokio::test]
    async fn backups_are_taken() {
        let transport = MemoryTransport::new();
        let dir = tempfile::tempdir().expect("tempdir");
        let orch = orchestrator(dir.path(), &transport, "pw");

        seed(&orch, two_mirrors).await;
        orch.push(PushStrategy::Auto).await.unwrap();
        orch.pull(ResolutionStrategy::Merge).await.unwrap();

        let backups = BackupManager::new(dir.path().join("backups"), 5);
        assert_eq!(backups.list(PRE_PUSH).await.unwrap().len(), 1);
        assert_eq!(backups.list(POST_PUSH).await.unwrap().len(), 1);
        assert_eq!(backups.list(PRE_PULL).await.unwrap().len(), 1);
        assert_eq!(backups.list(POST_PULL).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn not_found_is_first_push_but_other_errors_are_not() {
        struct Failing;

        #[async_trait::async_trait]
        impl SyncTransport for Failing {
            fn kind(&self) -> &'static str {
                "failing"
            }
            async fn upload(&self, _: &str, _: &[u8]) -> Result<(), TransportError> {
                Ok(())
            }
            async fn download(&self, _: &str) -> Result<Vec<u8>, TransportError> {
                Err(TransportError::Network("connection reset".into()))
            }
            async fn list(&self) -> Result<Vec<String>, TransportError> {
                Ok(Vec::new())
            }
            async fn delete(&self, _: &str) -> Result<(), TransportError> {
                Ok(())
            }
        }

        let dir = tempfile::tempdir().expect("tempdir");
        let orch = SyncOrchestrator::with_crypto(
            Arc::new(Failing),
            ProfileStore::new(dir.path().join("mirrors.json")),
            BackupManager::new(dir.path().join("backups"), 5),
            test_engine("pw"),
            SyncOptions::default(),
        );

        let err = orch.push(PushStrategy::Force).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
