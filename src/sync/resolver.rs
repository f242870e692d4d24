//! Conflict resolution strategies.
//!
//! `local` keeps the local set and imports new remote mirrors without their
//! keys. `remote` adopts the remote list but never takes API keys from the
//! wire. `merge` reconciles field by field and propagates recent remote
//! deletions. `manual` asks the user to pick one of the others.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;

use super::conflict::{field_conflicts, ConflictReport, ConflictType, FieldConflict, MirrorField};
use super::error::SyncError;
use super::prompt::{ChoiceTag, ConflictPrompter, FieldChoice, ManualChoice};
use crate::crypto::is_encrypted_field;
use crate::model::{
    recent_tombstone_window, ProfileEntry, ProfileSet, ToolType, DEFAULT_MIRROR_NAME,
};
use crate::snapshot::SyncSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported conflict strategy: {0}")]
pub struct ParseStrategyError(pub String);

/// Strategy used when a pull finds conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionStrategy {
    Local,
    Remote,
    #[default]
    Merge,
    Manual,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Merge => "merge",
            Self::Manual => "manual",
        }
    }
}

impl FromStr for ResolutionStrategy {
    type Err = ParseStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            "merge" => Ok(Self::Merge),
            "manual" => Ok(Self::Manual),
            _ => Err(ParseStrategyError(s.to_string())),
        }
    }
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy used when a push finds the remote diverged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushStrategy {
    /// Merge, then push the merged state.
    #[default]
    Auto,
    Merge,
    /// Overwrite the remote regardless of conflicts.
    Force,
    /// Refuse and ask the user to pull first.
    Manual,
}

impl PushStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Merge => "merge",
            Self::Force => "force",
            Self::Manual => "manual",
        }
    }
}

impl FromStr for PushStrategy {
    type Err = ParseStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "merge" => Ok(Self::Merge),
            "force" => Ok(Self::Force),
            "manual" => Ok(Self::Manual),
            _ => Err(ParseStrategyError(s.to_string())),
        }
    }
}

impl std::fmt::Display for PushStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Produces a new [`ProfileSet`] from a local set, a decrypted remote
/// snapshot and the conflicts between them. Never mutates its inputs.
pub struct ConflictResolver<'a> {
    prompter: Option<&'a dyn ConflictPrompter>,
    interactive: bool,
    now: DateTime<Utc>,
}

impl Default for ConflictResolver<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> ConflictResolver<'a> {
    pub fn new() -> Self {
        Self {
            prompter: None,
            interactive: false,
            now: Utc::now(),
        }
    }

    /// Attach a prompter. Field-level prompts are only used when
    /// `interactive` is set; `manual` always uses it.
    pub fn with_prompter(mut self, prompter: &'a dyn ConflictPrompter, interactive: bool) -> Self {
        self.prompter = Some(prompter);
        self.interactive = interactive;
        self
    }

    /// Pin the clock used for the recent-tombstone window.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn resolve(
        &self,
        local: &ProfileSet,
        remote: &SyncSnapshot,
        report: &ConflictReport,
        strategy: ResolutionStrategy,
    ) -> Result<ProfileSet, SyncError> {
        tracing::info!(
            strategy = %strategy,
            conflicts = report.len(),
            "Resolving sync conflicts"
        );
        match strategy {
            ResolutionStrategy::Local => Ok(self.keep_local(local, report)),
            ResolutionStrategy::Remote => Ok(self.take_remote(local, remote)),
            ResolutionStrategy::Merge => Ok(self.merge(local, remote)),
            ResolutionStrategy::Manual => self.manual(local, remote, report),
        }
    }

    fn keep_local(&self, local: &ProfileSet, report: &ConflictReport) -> ProfileSet {
        let mut next = local.clone();
        for conflict in report.of_kind(ConflictType::NewMirror) {
            if let Some(remote_entry) = &conflict.remote {
                let mut entry = remote_entry.without_api_key();
                entry.refresh_env_key();
                tracing::debug!(mirror = %entry.name, "Importing new remote mirror without its key");
                next.mirrors.push(entry);
            }
        }
        next
    }

    fn take_remote(&self, local: &ProfileSet, remote: &SyncSnapshot) -> ProfileSet {
        let mut next = local.clone();

        let mut mirrors: Vec<ProfileEntry> = remote
            .mirrors
            .iter()
            .map(|remote_entry| {
                let mut entry = remote_entry.clone();
                entry.api_key = local
                    .find_active(&entry.name)
                    .map(|m| m.api_key.clone())
                    .unwrap_or_default();
                entry.deleted = false;
                entry.deleted_at = None;
                entry.refresh_env_key();
                entry
            })
            .collect();
        mirrors.extend(remote.deleted_mirrors.iter().map(|tomb| {
            let mut entry = tomb.without_api_key();
            entry.deleted = true;
            entry
        }));

        next.mirrors = mirrors;
        next.current_codex = remote.current_codex.clone();
        next.current_claude = remote.current_claude.clone();
        next.sort();
        next
    }

    fn merge(&self, local: &ProfileSet, remote: &SyncSnapshot) -> ProfileSet {
        let remote_active: BTreeMap<&str, &ProfileEntry> = remote
            .mirrors
            .iter()
            .map(|m| (m.name.as_str(), m))
            .collect();
        let remote_deleted = remote.tombstone_times();

        let mut merged: BTreeMap<String, ProfileEntry> = BTreeMap::new();
        for entry in local.active() {
            merged
                .entry(entry.name.clone())
                .or_insert_with(|| entry.clone());
        }
        let mut tombstones: BTreeMap<String, ProfileEntry> = BTreeMap::new();
        for tomb in local.tombstones() {
            tombstones
                .entry(tomb.name.clone())
                .or_insert_with(|| tomb.clone());
        }

        // Non-conflicting merge first, then collect what still differs.
        let mut pending: Vec<FieldConflict> = Vec::new();
        for (name, entry) in merged.iter_mut() {
            let Some(remote_entry) = remote_active.get(name.as_str()) else {
                continue;
            };
            if entry.api_key.is_empty()
                && !remote_entry.api_key.is_empty()
                && !is_encrypted_field(&remote_entry.api_key)
            {
                tracing::debug!(mirror = %name, "Adopting remote API key for keyless local mirror");
                entry.api_key = remote_entry.api_key.clone();
            }
            pending.extend(field_conflicts(entry, remote_entry, &remote.device_id));
        }

        let total = pending.len();
        for (i, conflict) in pending.iter().enumerate() {
            let choice = self.choose(conflict, i + 1, total);
            if let Some(entry) = merged.get_mut(&conflict.mirror) {
                self.apply_choice(entry, conflict, choice);
            }
        }

        for (name, remote_entry) in &remote_active {
            if merged.contains_key(*name) {
                continue;
            }
            let deleted_locally = local
                .tombstones()
                .any(|t| t.name == *name && t.deleted_at.is_some());
            if deleted_locally || remote_deleted.contains_key(name) {
                tracing::debug!(mirror = %name, "Honoring deletion of remote mirror");
                continue;
            }
            let mut entry = remote_entry.without_api_key();
            entry.refresh_env_key();
            merged.insert(name.to_string(), entry);
        }

        let recent_cutoff = self.now - recent_tombstone_window();
        for tomb in &remote.deleted_mirrors {
            if merged.contains_key(&tomb.name) && remote_active.contains_key(tomb.name.as_str()) {
                tracing::debug!(mirror = %tomb.name, "Remote mirror was deleted then re-added, keeping it");
                continue;
            }
            let recent_deletion = tomb.deleted_at.filter(|at| *at >= recent_cutoff);
            match recent_deletion {
                Some(at) => {
                    if let Some(mut entry) = merged.remove(&tomb.name) {
                        tracing::info!(mirror = %tomb.name, deleted_at = %at, "Propagating remote deletion");
                        entry.mark_deleted(at);
                        tombstones.insert(tomb.name.clone(), entry);
                        continue;
                    }
                }
                None if merged.contains_key(&tomb.name) => {
                    tracing::debug!(mirror = %tomb.name, "Ignoring stale remote tombstone");
                    continue;
                }
                None => {}
            }
            if !tombstones.contains_key(&tomb.name) && !merged.contains_key(&tomb.name) {
                let mut entry = tomb.without_api_key();
                entry.deleted = true;
                tombstones.insert(tomb.name.clone(), entry);
            }
        }

        let mut next = local.clone();
        next.mirrors = merged.into_values().collect();
        let active_names: Vec<String> = next.mirrors.iter().map(|m| m.name.clone()).collect();
        next.mirrors.extend(
            tombstones
                .into_values()
                .filter(|t| !active_names.contains(&t.name)),
        );
        next.sort();

        for tool in ToolType::ALL {
            let selected = reselect_current(&next, tool, local.current(tool), remote.current(tool));
            if selected != next.current(tool) {
                tracing::debug!(tool = %tool, mirror = %selected, "Reselected current mirror");
            }
            next.set_current(tool, selected);
        }
        next
    }

    fn manual(
        &self,
        local: &ProfileSet,
        remote: &SyncSnapshot,
        report: &ConflictReport,
    ) -> Result<ProfileSet, SyncError> {
        let prompter = self.prompter.ok_or(SyncError::PromptUnavailable)?;

        let choice = prompter.choose_strategy(report).map_err(|e| {
            tracing::warn!(error = %e, "No strategy chosen, cancelling");
            SyncError::Cancelled
        })?;

        match choice {
            ManualChoice::Merge => Ok(self.merge(local, remote)),
            ManualChoice::Local => Ok(self.keep_local(local, report)),
            ManualChoice::Remote => {
                let confirmed = prompter
                    .confirm("Replace local mirrors with the remote snapshot?")
                    .unwrap_or(false);
                if confirmed {
                    Ok(self.take_remote(local, remote))
                } else {
                    tracing::info!("Remote overwrite not confirmed");
                    Err(SyncError::Cancelled)
                }
            }
            ManualChoice::Abort => {
                tracing::info!("Sync aborted by user");
                Err(SyncError::Cancelled)
            }
        }
    }

    fn choose(&self, conflict: &FieldConflict, index: usize, total: usize) -> FieldChoice {
        if self.interactive {
            if let Some(prompter) = self.prompter {
                return match prompter.prompt_field_choice(conflict, index, total) {
                    Ok(choice) => choice,
                    Err(e) => {
                        tracing::warn!(
                            mirror = %conflict.mirror,
                            field = %conflict.field,
                            error = %e,
                            "Prompt failed, keeping local value"
                        );
                        FieldChoice::local(conflict)
                    }
                };
            }
        }

        // Credentials are never taken from the wire without a prompt.
        if conflict.field.is_secret() {
            return FieldChoice::local(conflict);
        }
        if conflict.remote_time > conflict.local_time {
            FieldChoice::remote(conflict)
        } else {
            FieldChoice::local(conflict)
        }
    }

    fn apply_choice(&self, entry: &mut ProfileEntry, conflict: &FieldConflict, choice: FieldChoice) {
        if choice.tag == ChoiceTag::Local || choice.value == conflict.local_value {
            return;
        }

        match conflict.field {
            MirrorField::BaseUrl => entry.base_url = choice.value,
            MirrorField::ModelName => {
                entry.model_name = Some(choice.value).filter(|v| !v.is_empty());
            }
            MirrorField::ApiKey => entry.api_key = choice.value,
            MirrorField::ToolType => match ToolType::from_id(&choice.value) {
                Some(tool) => {
                    entry.tool_type = tool;
                    entry.refresh_env_key();
                }
                None => {
                    tracing::warn!(
                        mirror = %entry.name,
                        value = %choice.value,
                        "Unknown tool type, keeping local value"
                    );
                    return;
                }
            },
        }

        entry.last_modified = match choice.tag {
            ChoiceTag::Remote => entry.last_modified.max(conflict.remote_time),
            _ => self.now,
        };
    }
}

/// Pick the current mirror for `tool` after a merge: the local pointer,
/// then the remote pointer, then the default mirror, then the first
/// surviving mirror of that tool, else empty.
pub fn reselect_current(set: &ProfileSet, tool: ToolType, local: &str, remote: &str) -> String {
    [local, remote, DEFAULT_MIRROR_NAME]
        .into_iter()
        .find(|name| set.resolves(tool, name))
        .map(str::to_string)
        .or_else(|| {
            set.active()
                .filter(|m| m.tool_type == tool)
                .map(|m| m.name.clone())
                .min()
        })
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::sync::conflict::detect_conflicts;
    use crate::sync::conflict::tests::{entry, snapshot_of, tombstone};
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Prompter with canned answers. `None` answers behave like closed input.
    pub(crate) struct ScriptedPrompter {
        pub field_answer: Option<ChoiceTag>,
        pub strategy: Option<ManualChoice>,
        pub confirm: bool,
        pub field_calls: AtomicUsize,
    }

    impl ScriptedPrompter {
        pub(crate) fn new(field_answer: Option<ChoiceTag>, strategy: Option<ManualChoice>) -> Self {
            Self {
                field_answer,
                strategy,
                confirm: true,
                field_calls: AtomicUsize::new(0),
            }
        }
    }

    impl ConflictPrompter for ScriptedPrompter {
        fn prompt_field_choice(
            &self,
            conflict: &FieldConflict,
            _index: usize,
            _total: usize,
        ) -> anyhow::Result<FieldChoice> {
            self.field_calls.fetch_add(1, Ordering::SeqCst);
            match self.field_answer {
                Some(ChoiceTag::Local) => Ok(FieldChoice::local(conflict)),
                Some(ChoiceTag::Remote) => Ok(FieldChoice::remote(conflict)),
                Some(ChoiceTag::Custom) => Ok(FieldChoice {
                    value: "custom".to_string(),
                    tag: ChoiceTag::Custom,
                }),
                None => anyhow::bail!("input closed"),
            }
        }

        fn choose_strategy(&self, _report: &ConflictReport) -> anyhow::Result<ManualChoice> {
            self.strategy.ok_or_else(|| anyhow::anyhow!("input closed"))
        }

        fn confirm(&self, _message: &str) -> anyhow::Result<bool> {
            Ok(self.confirm)
        }
    }

    fn resolve(
        resolver: &ConflictResolver<'_>,
        local: &ProfileSet,
        remote: &SyncSnapshot,
        strategy: ResolutionStrategy,
    ) -> Result<ProfileSet, SyncError> {
        let report = detect_conflicts(local, remote);
        resolver.resolve(local, remote, &report, strategy)
    }

    fn pair(local_url: &str, remote_url: &str) -> (ProfileSet, SyncSnapshot) {
        let mut local = ProfileSet::default();
        local.mirrors.push(entry("x", ToolType::Codex, local_url, "k1"));
        local.current_codex = "x".to_string();

        let mut remote_set = ProfileSet::default();
        let mut remote_entry = entry("x", ToolType::Codex, remote_url, "k2");
        remote_entry.last_modified = local.mirrors[0].last_modified + Duration::hours(1);
        remote_set.mirrors.push(remote_entry);
        remote_set.current_codex = "x".to_string();
        (local, snapshot_of(&remote_set))
    }

    #[test]
    fn strategy_parsing() {
        assert_eq!("merge".parse::<ResolutionStrategy>().unwrap(), ResolutionStrategy::Merge);
        assert_eq!(" Manual ".parse::<ResolutionStrategy>().unwrap(), ResolutionStrategy::Manual);
        let err = "newest".parse::<ResolutionStrategy>().unwrap_err();
        assert_eq!(err.to_string(), "Unsupported conflict strategy: newest");
        assert_eq!("force".parse::<PushStrategy>().unwrap(), PushStrategy::Force);
        assert!("overwrite".parse::<PushStrategy>().is_err());
        assert_eq!(ResolutionStrategy::default(), ResolutionStrategy::Merge);
        assert_eq!(PushStrategy::default(), PushStrategy::Auto);
    }

    #[test]
    fn merge_preserves_local_secret() {
        let (local, remote) = pair("https://old", "https://new");
        let merged = resolve(&ConflictResolver::new(), &local, &remote, ResolutionStrategy::Merge)
            .unwrap();

        let x = merged.find_active("x").unwrap();
        assert_eq!(x.api_key, "k1");
        assert_eq!(x.base_url, "https://new");
        assert_eq!(x.last_modified, remote.mirrors[0].last_modified);
    }

    #[test]
    fn merge_tie_keeps_local() {
        let (local, mut remote) = pair("https://old", "https://new");
        remote.mirrors[0].last_modified = local.mirrors[0].last_modified;

        let merged = resolve(&ConflictResolver::new(), &local, &remote, ResolutionStrategy::Merge)
            .unwrap();
        assert_eq!(merged.find_active("x").unwrap().base_url, "https://old");
    }

    #[test]
    fn merge_adopts_remote_key_when_local_empty() {
        let (mut local, remote) = pair("https://same", "https://same");
        local.mirrors[0].api_key.clear();

        let merged = resolve(&ConflictResolver::new(), &local, &remote, ResolutionStrategy::Merge)
            .unwrap();
        assert_eq!(merged.find_active("x").unwrap().api_key, "k2");
    }

    #[test]
    fn merge_tool_type_change_refreshes_env_key() {
        let (local, mut remote) = pair("https://same", "https://same");
        remote.mirrors[0].tool_type = ToolType::Claude;

        let merged = resolve(&ConflictResolver::new(), &local, &remote, ResolutionStrategy::Merge)
            .unwrap();
        let x = merged.find_active("x").unwrap();
        assert_eq!(x.tool_type, ToolType::Claude);
        assert_eq!(x.env_key, "ANTHROPIC_AUTH_TOKEN");
        // The codex pointer can no longer resolve to `x`.
        assert_eq!(merged.current_codex, "");
        assert_eq!(merged.current_claude, "x");
    }

    #[test]
    fn tombstone_propagation() {
        let now = Utc::now();
        let mut local = ProfileSet::default();
        local.mirrors.push(entry("y", ToolType::Claude, "https://y", "ky"));
        local.current_claude = "y".to_string();

        let mut remote = snapshot_of(&ProfileSet::default());
        remote
            .deleted_mirrors
            .push(tombstone("y", ToolType::Claude, now - Duration::hours(1)));

        let merged = resolve(
            &ConflictResolver::new().at(now),
            &local,
            &remote,
            ResolutionStrategy::Merge,
        )
        .unwrap();
        assert!(merged.find_active("y").is_none());
        assert!(merged.find("y").unwrap().is_tombstone());
        assert_eq!(merged.current_claude, "");
    }

    #[test]
    fn stale_tombstone_ignored() {
        let now = Utc::now();
        let mut local = ProfileSet::default();
        local.mirrors.push(entry("y", ToolType::Claude, "https://y", "ky"));

        let mut remote = snapshot_of(&ProfileSet::default());
        remote
            .deleted_mirrors
            .push(tombstone("y", ToolType::Claude, now - Duration::days(30)));

        let merged = resolve(
            &ConflictResolver::new().at(now),
            &local,
            &remote,
            ResolutionStrategy::Merge,
        )
        .unwrap();
        assert!(merged.find_active("y").is_some());
        assert_eq!(merged.mirrors.iter().filter(|m| m.name == "y").count(), 1);
    }

    #[test]
    fn merge_remote_only_mirrors() {
        let now = Utc::now();
        let mut local = ProfileSet::default();
        local.mirrors.push(tombstone("gone", ToolType::Codex, now));

        let mut remote_set = ProfileSet::default();
        remote_set.mirrors.push(entry("fresh", ToolType::Codex, "https://f", "kf"));
        remote_set.mirrors.push(entry("gone", ToolType::Codex, "https://g", "kg"));
        let remote = snapshot_of(&remote_set);

        let merged = resolve(&ConflictResolver::new(), &local, &remote, ResolutionStrategy::Merge)
            .unwrap();
        let fresh = merged.find_active("fresh").unwrap();
        assert_eq!(fresh.api_key, "");
        assert!(merged.find_active("gone").is_none());
        assert!(merged.find("gone").unwrap().deleted);
    }

    #[test]
    fn merge_keeps_mirror_deleted_then_readded_remotely() {
        let now = Utc::now();
        let mut local = ProfileSet::default();
        local.mirrors.push(entry("x", ToolType::Codex, "https://x", "kx"));
        local.mirrors.push(entry("z", ToolType::Codex, "https://z-old", "kz"));

        let mut remote = snapshot_of(&local);
        // An unrelated field conflict forces the merge path.
        remote.mirrors[1].base_url = "https://z-new".to_string();
        remote.mirrors[1].last_modified = now - Duration::hours(1);
        remote.checksum = crate::snapshot::compute_checksum(&remote.mirrors);
        remote
            .deleted_mirrors
            .push(tombstone("x", ToolType::Codex, now - Duration::hours(2)));

        let merged = resolve(
            &ConflictResolver::new().at(now),
            &local,
            &remote,
            ResolutionStrategy::Merge,
        )
        .unwrap();
        assert_eq!(merged.find_active("x").unwrap().api_key, "kx");
        assert_eq!(merged.mirrors.iter().filter(|m| m.name == "x").count(), 1);
        assert_eq!(merged.find_active("z").unwrap().base_url, "https://z-new");
    }

    #[test]
    fn merge_skips_remote_only_mirror_listed_as_deleted_remotely() {
        let now = Utc::now();
        let mut remote_set = ProfileSet::default();
        remote_set.mirrors.push(entry("n", ToolType::Claude, "https://n", "kn"));
        let mut remote = snapshot_of(&remote_set);
        remote
            .deleted_mirrors
            .push(tombstone("n", ToolType::Claude, now - Duration::days(20)));

        let merged = resolve(
            &ConflictResolver::new().at(now),
            &ProfileSet::default(),
            &remote,
            ResolutionStrategy::Merge,
        )
        .unwrap();
        assert!(merged.find_active("n").is_none());
        assert_eq!(merged.current_claude, "");
    }

    #[test]
    fn merge_imports_remote_tombstones_without_keys() {
        let now = Utc::now();
        let mut remote = snapshot_of(&ProfileSet::default());
        let mut old = tombstone("old", ToolType::Codex, now - Duration::days(2));
        old.api_key = "sk-remote-secret".to_string();
        remote.deleted_mirrors.push(old);

        let merged = resolve(
            &ConflictResolver::new().at(now),
            &ProfileSet::default(),
            &remote,
            ResolutionStrategy::Merge,
        )
        .unwrap();
        let old = merged.find("old").unwrap();
        assert!(old.is_tombstone());
        assert_eq!(old.api_key, "");
    }

    #[test]
    fn current_pointer_safety() {
        let now = Utc::now();
        let mut local = ProfileSet::default();
        local.mirrors.push(entry("official", ToolType::Codex, "https://o", "k"));
        local.mirrors.push(entry("doomed", ToolType::Codex, "https://d", "k"));
        local.mirrors.push(entry("b-claude", ToolType::Claude, "https://b", "k"));
        local.mirrors.push(entry("a-claude", ToolType::Claude, "https://a", "k"));
        local.current_codex = "doomed".to_string();
        local.current_claude = "never-existed".to_string();

        let mut remote = snapshot_of(&local);
        remote.mirrors.retain(|m| m.name != "doomed");
        remote.checksum = crate::snapshot::compute_checksum(&remote.mirrors);
        remote
            .deleted_mirrors
            .push(tombstone("doomed", ToolType::Codex, now - Duration::minutes(5)));
        remote.current_codex = "doomed".to_string();
        remote.current_claude = "official".to_string();

        let merged = resolve(
            &ConflictResolver::new().at(now),
            &local,
            &remote,
            ResolutionStrategy::Merge,
        )
        .unwrap();

        assert_eq!(merged.current_codex, "official");
        // `official` is a codex mirror, so claude falls through to the first by name.
        assert_eq!(merged.current_claude, "a-claude");
        for tool in ToolType::ALL {
            let current = merged.current(tool);
            assert!(current.is_empty() || merged.resolves(tool, current));
        }
    }

    #[test]
    fn reselect_prefers_remote_pointer_when_local_gone() {
        let mut set = ProfileSet::default();
        set.mirrors.push(entry("official", ToolType::Codex, "https://o", "k"));
        set.mirrors.push(entry("other", ToolType::Codex, "https://x", "k"));

        assert_eq!(reselect_current(&set, ToolType::Codex, "missing", "other"), "other");
        assert_eq!(reselect_current(&set, ToolType::Codex, "", ""), "official");
        assert_eq!(reselect_current(&set, ToolType::Claude, "other", ""), "");
    }

    #[test]
    fn local_strategy_imports_new_without_keys() {
        let local = {
            let mut s = ProfileSet::default();
            s.mirrors.push(entry("x", ToolType::Codex, "https://local", "k1"));
            s
        };
        let mut remote_set = ProfileSet::default();
        remote_set.mirrors.push(entry("x", ToolType::Codex, "https://remote", "k2"));
        remote_set.mirrors.push(entry("z", ToolType::Claude, "https://z", "kz"));
        let remote = snapshot_of(&remote_set);

        let next = resolve(&ConflictResolver::new(), &local, &remote, ResolutionStrategy::Local)
            .unwrap();
        assert_eq!(next.find_active("x").unwrap().base_url, "https://local");
        let z = next.find_active("z").unwrap();
        assert_eq!(z.api_key, "");
        assert_eq!(z.env_key, "ANTHROPIC_AUTH_TOKEN");
    }

    #[test]
    fn remote_strategy_never_takes_wire_keys() {
        let (local, mut remote) = pair("https://old", "https://new");
        remote
            .mirrors
            .push(entry("w", ToolType::Claude, "https://w", "kw"));
        remote.current_claude = "w".to_string();

        let next = resolve(&ConflictResolver::new(), &local, &remote, ResolutionStrategy::Remote)
            .unwrap();
        let x = next.find_active("x").unwrap();
        assert_eq!(x.base_url, "https://new");
        assert_eq!(x.api_key, "k1");
        assert_eq!(next.find_active("w").unwrap().api_key, "");
        assert_eq!(next.current_claude, "w");
    }

    #[test]
    fn interactive_field_prompt_and_fallback() {
        let (local, remote) = pair("https://old", "https://new");

        let prompter = ScriptedPrompter::new(Some(ChoiceTag::Custom), None);
        let resolver = ConflictResolver::new().with_prompter(&prompter, true);
        let merged = resolve(&resolver, &local, &remote, ResolutionStrategy::Merge).unwrap();
        let x = merged.find_active("x").unwrap();
        assert_eq!(x.base_url, "custom");
        assert_eq!(x.api_key, "custom");
        assert_eq!(prompter.field_calls.load(Ordering::SeqCst), 2);

        let closed = ScriptedPrompter::new(None, None);
        let resolver = ConflictResolver::new().with_prompter(&closed, true);
        let merged = resolve(&resolver, &local, &remote, ResolutionStrategy::Merge).unwrap();
        let x = merged.find_active("x").unwrap();
        assert_eq!(x.base_url, "https://old");
        assert_eq!(x.api_key, "k1");
    }

    #[test]
    fn non_interactive_prompter_is_not_asked() {
        let (local, remote) = pair("https://old", "https://new");
        let prompter = ScriptedPrompter::new(Some(ChoiceTag::Local), None);
        let resolver = ConflictResolver::new().with_prompter(&prompter, false);

        resolve(&resolver, &local, &remote, ResolutionStrategy::Merge).unwrap();
        assert_eq!(prompter.field_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn manual_choices() {
        let (local, remote) = pair("https://old", "https://new");

        let abort = ScriptedPrompter::new(None, Some(ManualChoice::Abort));
        let err = resolve(
            &ConflictResolver::new().with_prompter(&abort, false),
            &local,
            &remote,
            ResolutionStrategy::Manual,
        )
        .unwrap_err();
        assert!(err.is_cancelled());

        let closed = ScriptedPrompter::new(None, None);
        let err = resolve(
            &ConflictResolver::new().with_prompter(&closed, false),
            &local,
            &remote,
            ResolutionStrategy::Manual,
        )
        .unwrap_err();
        assert!(err.is_cancelled());

        let mut declined = ScriptedPrompter::new(None, Some(ManualChoice::Remote));
        declined.confirm = false;
        let err = resolve(
            &ConflictResolver::new().with_prompter(&declined, false),
            &local,
            &remote,
            ResolutionStrategy::Manual,
        )
        .unwrap_err();
        assert!(err.is_cancelled());

        let merge = ScriptedPrompter::new(None, Some(ManualChoice::Merge));
        let merged = resolve(
            &ConflictResolver::new().with_prompter(&merge, false),
            &local,
            &remote,
            ResolutionStrategy::Manual,
        )
        .unwrap();
        assert_eq!(merged.find_active("x").unwrap().base_url, "https://new");
    }

    #[test]
    fn manual_without_prompter_fails() {
        let (local, remote) = pair("https://old", "https://new");
        let err = resolve(&ConflictResolver::new(), &local, &remote, ResolutionStrategy::Manual)
            .unwrap_err();
        assert!(matches!(err, SyncError::PromptUnavailable));
    }
}
