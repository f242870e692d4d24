//! Conflict detection between the local mirror set and a remote snapshot.
//!
//! The remote snapshot must already have every API key decrypted. An `enc:`
//! value reaching a comparison means that step was skipped; it is logged and
//! the API key comparison is skipped for that entry.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::crypto::is_encrypted_field;
use crate::model::{ProfileEntry, ProfileSet, ToolType};
use crate::snapshot::SyncSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    NewMirror,
    ModifiedMirror,
    DeletedMirror,
    CurrentChange,
}

impl ConflictType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewMirror => "new_mirror",
            Self::ModifiedMirror => "modified_mirror",
            Self::DeletedMirror => "deleted_mirror",
            Self::CurrentChange => "current_change",
        }
    }
}

impl std::fmt::Display for ConflictType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side removed the mirror in a `deleted_mirror` conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionCase {
    /// Tombstoned locally, still active remotely.
    DeletedLocally,
    /// Active locally, tombstoned remotely.
    DeletedRemotely,
    /// Tombstoned locally, unknown remotely.
    LocalOnly,
}

/// Fields compared between two versions of the same mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorField {
    BaseUrl,
    ModelName,
    ToolType,
    ApiKey,
}

impl MirrorField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BaseUrl => "base_url",
            Self::ModelName => "model_name",
            Self::ToolType => "tool_type",
            Self::ApiKey => "api_key",
        }
    }

    pub fn is_secret(&self) -> bool {
        matches!(self, Self::ApiKey)
    }
}

impl std::fmt::Display for MirrorField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single differing field of a mirror present on both sides.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldConflict {
    pub mirror: String,
    pub field: MirrorField,
    pub local_value: String,
    pub remote_value: String,
    pub local_time: DateTime<Utc>,
    pub remote_time: DateTime<Utc>,
    pub remote_device: String,
}

/// Local and remote values of a current-mirror pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentChange {
    pub tool: ToolType,
    pub local: String,
    pub remote: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub kind: ConflictType,
    /// Mirror name, or the tool id for `current_change`.
    pub name: String,
    pub description: String,
    pub local: Option<ProfileEntry>,
    pub remote: Option<ProfileEntry>,
    pub deletion: Option<DeletionCase>,
    pub current: Option<CurrentChange>,
    pub fields: Vec<FieldConflict>,
}

impl Conflict {
    fn mirror(kind: ConflictType, name: &str, description: String) -> Self {
        Self {
            kind,
            name: name.to_string(),
            description,
            local: None,
            remote: None,
            deletion: None,
            current: None,
            fields: Vec::new(),
        }
    }
}

/// Result of a detection pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictReport {
    pub conflicts: Vec<Conflict>,
    pub detected_at: DateTime<Utc>,
    pub remote_device: String,
}

impl ConflictReport {
    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    pub fn of_kind(&self, kind: ConflictType) -> impl Iterator<Item = &Conflict> {
        self.conflicts.iter().filter(move |c| c.kind == kind)
    }

    pub fn names(&self, kind: ConflictType) -> BTreeSet<&str> {
        self.of_kind(kind).map(|c| c.name.as_str()).collect()
    }
}

fn model_value(entry: &ProfileEntry) -> String {
    entry.model_name.clone().unwrap_or_default()
}

/// Enumerate the differing fields of two same-named mirrors.
///
/// Only `base_url`, `model_name`, `tool_type` and `api_key` are compared.
pub fn field_conflicts(
    local: &ProfileEntry,
    remote: &ProfileEntry,
    remote_device: &str,
) -> Vec<FieldConflict> {
    let mut pairs = vec![
        (
            MirrorField::BaseUrl,
            local.base_url.clone(),
            remote.base_url.clone(),
        ),
        (MirrorField::ModelName, model_value(local), model_value(remote)),
        (
            MirrorField::ToolType,
            local.tool_type.id().to_string(),
            remote.tool_type.id().to_string(),
        ),
    ];

    if is_encrypted_field(&local.api_key) || is_encrypted_field(&remote.api_key) {
        tracing::error!(
            mirror = %local.name,
            "API key still encrypted at comparison time; skipping api_key comparison"
        );
    } else {
        pairs.push((
            MirrorField::ApiKey,
            local.api_key.clone(),
            remote.api_key.clone(),
        ));
    }

    pairs
        .into_iter()
        .filter(|(_, l, r)| l != r)
        .map(|(field, local_value, remote_value)| FieldConflict {
            mirror: local.name.clone(),
            field,
            local_value,
            remote_value,
            local_time: local.last_modified,
            remote_time: remote.last_modified,
            remote_device: remote_device.to_string(),
        })
        .collect()
}

/// Diff the local set against a decrypted remote snapshot.
pub fn detect_conflicts(local: &ProfileSet, remote: &SyncSnapshot) -> ConflictReport {
    let remote_active: BTreeMap<&str, &ProfileEntry> = remote
        .mirrors
        .iter()
        .map(|m| (m.name.as_str(), m))
        .collect();
    let remote_deleted: BTreeMap<&str, &ProfileEntry> = remote
        .deleted_mirrors
        .iter()
        .map(|m| (m.name.as_str(), m))
        .collect();

    let local_active: BTreeSet<&str> = local.active().map(|m| m.name.as_str()).collect();
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut conflicts = Vec::new();

    for entry in &local.mirrors {
        let name = entry.name.as_str();
        // An active entry shadows a stale tombstone of the same name.
        if !entry.is_active() && local_active.contains(name) {
            continue;
        }
        if !seen.insert(name) {
            continue;
        }

        if entry.is_active() {
            if let Some(remote_entry) = remote_active.get(name) {
                let fields = field_conflicts(entry, remote_entry, &remote.device_id);
                if !fields.is_empty() {
                    let changed: Vec<&str> = fields.iter().map(|f| f.field.as_str()).collect();
                    let mut conflict = Conflict::mirror(
                        ConflictType::ModifiedMirror,
                        name,
                        format!("Mirror '{}' differs in: {}", name, changed.join(", ")),
                    );
                    conflict.local = Some(entry.clone());
                    conflict.remote = Some((*remote_entry).clone());
                    conflict.fields = fields;
                    conflicts.push(conflict);
                }
            } else if let Some(tomb) = remote_deleted.get(name) {
                let mut conflict = Conflict::mirror(
                    ConflictType::DeletedMirror,
                    name,
                    format!("Mirror '{}' was deleted on another device", name),
                );
                conflict.local = Some(entry.clone());
                conflict.remote = Some((*tomb).clone());
                conflict.deletion = Some(DeletionCase::DeletedRemotely);
                conflicts.push(conflict);
            }
        } else if let Some(remote_entry) = remote_active.get(name) {
            let mut conflict = Conflict::mirror(
                ConflictType::DeletedMirror,
                name,
                format!("Mirror '{}' was deleted locally but is still active remotely", name),
            );
            conflict.local = Some(entry.clone());
            conflict.remote = Some((*remote_entry).clone());
            conflict.deletion = Some(DeletionCase::DeletedLocally);
            conflicts.push(conflict);
        } else if !remote_deleted.contains_key(name) {
            let mut conflict = Conflict::mirror(
                ConflictType::DeletedMirror,
                name,
                format!("Local deletion of mirror '{}' has not been synced", name),
            );
            conflict.local = Some(entry.clone());
            conflict.deletion = Some(DeletionCase::LocalOnly);
            conflicts.push(conflict);
        }
    }

    for (name, remote_entry) in &remote_active {
        if seen.contains(name) {
            continue;
        }
        let readded = remote_deleted
            .get(name)
            .and_then(|tomb| tomb.deleted_at)
            .is_some();
        let description = if readded {
            format!("Mirror '{}' was deleted then re-added on another device", name)
        } else {
            format!("New mirror '{}' from another device", name)
        };
        let mut conflict = Conflict::mirror(ConflictType::NewMirror, name, description);
        conflict.remote = Some((*remote_entry).clone());
        conflicts.push(conflict);
    }

    for tool in ToolType::ALL {
        let local_current = local.current(tool);
        let remote_current = remote.current(tool);
        if local_current != remote_current {
            let mut conflict = Conflict::mirror(
                ConflictType::CurrentChange,
                tool.id(),
                format!(
                    "Current {} mirror differs: local '{}', remote '{}'",
                    tool, local_current, remote_current
                ),
            );
            conflict.current = Some(CurrentChange {
                tool,
                local: local_current.to_string(),
                remote: remote_current.to_string(),
            });
            conflicts.push(conflict);
        }
    }

    tracing::debug!(count = conflicts.len(), "Conflict detection finished");

    ConflictReport {
        conflicts,
        detected_at: Utc::now(),
        remote_device: remote.device_id.clone(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::snapshot::{compute_checksum, SNAPSHOT_VERSION};
    use chrono::Duration;

    pub(crate) fn entry(name: &str, tool: ToolType, url: &str, key: &str) -> ProfileEntry {
        let mut e = ProfileEntry::new(name, tool, url).with_api_key(key);
        let t = Utc::now() - Duration::days(10);
        e.created_at = t;
        e.last_modified = t;
        e
    }

    pub(crate) fn tombstone(name: &str, tool: ToolType, deleted_at: DateTime<Utc>) -> ProfileEntry {
        let mut e = entry(name, tool, "https://deleted", "");
        e.mark_deleted(deleted_at);
        e
    }

    /// Decrypted snapshot built straight from a set, as if just pulled.
    pub(crate) fn snapshot_of(set: &ProfileSet) -> SyncSnapshot {
        let mirrors: Vec<ProfileEntry> = set.active().cloned().collect();
        SyncSnapshot {
            checksum: compute_checksum(&mirrors),
            mirrors,
            deleted_mirrors: set.tombstones().cloned().collect(),
            current_codex: set.current_codex.clone(),
            current_claude: set.current_claude.clone(),
            timestamp: Utc::now(),
            device_id: "remote-device".to_string(),
            version: SNAPSHOT_VERSION.to_string(),
            has_api_keys: true,
        }
    }

    fn base_set() -> ProfileSet {
        let mut set = ProfileSet::default();
        set.mirrors.push(entry("official", ToolType::Codex, "https://api.openai.com/v1", "k1"));
        set.mirrors.push(entry("relay", ToolType::Claude, "https://relay", "k2"));
        set.current_codex = "official".to_string();
        set.current_claude = "relay".to_string();
        set
    }

    #[test]
    fn identical_sides_have_no_conflicts() {
        let local = base_set();
        let report = detect_conflicts(&local, &snapshot_of(&local));
        assert!(report.is_empty());
        assert_eq!(report.remote_device, "remote-device");
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let local = base_set();
        let mut remote = snapshot_of(&local);
        remote.mirrors.reverse();
        assert!(detect_conflicts(&local, &remote).is_empty());
    }

    #[test]
    fn new_mirror_and_readded() {
        let local = base_set();
        let mut remote_set = local.clone();
        remote_set.mirrors.push(entry("fresh", ToolType::Codex, "https://f", "k"));
        remote_set.mirrors.push(entry("back", ToolType::Claude, "https://b", "k"));
        let mut remote = snapshot_of(&remote_set);
        remote
            .deleted_mirrors
            .push(tombstone("back", ToolType::Claude, Utc::now() - Duration::days(3)));

        let report = detect_conflicts(&local, &remote);
        let new: Vec<_> = report.of_kind(ConflictType::NewMirror).collect();
        assert_eq!(new.len(), 2);
        let back = new.iter().find(|c| c.name == "back").unwrap();
        assert!(back.description.contains("deleted then re-added"));
        let fresh = new.iter().find(|c| c.name == "fresh").unwrap();
        assert!(!fresh.description.contains("re-added"));
    }

    #[test]
    fn modified_mirror_lists_fields() {
        let local = base_set();
        let mut remote_set = local.clone();
        remote_set.mirrors[0].base_url = "https://elsewhere".to_string();
        remote_set.mirrors[0].api_key = "other".to_string();
        remote_set.mirrors[0].model_name = Some("gpt-5".to_string());

        let report = detect_conflicts(&local, &snapshot_of(&remote_set));
        let modified: Vec<_> = report.of_kind(ConflictType::ModifiedMirror).collect();
        assert_eq!(modified.len(), 1);
        let fields: Vec<MirrorField> = modified[0].fields.iter().map(|f| f.field).collect();
        assert_eq!(
            fields,
            vec![MirrorField::BaseUrl, MirrorField::ModelName, MirrorField::ApiKey]
        );
        assert_eq!(modified[0].fields[0].remote_device, "remote-device");
    }

    #[test]
    fn extra_env_only_difference_is_not_a_conflict() {
        let local = base_set();
        let mut remote_set = local.clone();
        remote_set.mirrors[0]
            .extra_env
            .insert("HTTP_PROXY".to_string(), "x".to_string());
        assert!(detect_conflicts(&local, &snapshot_of(&remote_set)).is_empty());
    }

    #[test]
    fn encrypted_key_skips_api_key_comparison() {
        let local = base_set();
        let mut remote = snapshot_of(&local);
        remote.mirrors[0].api_key = "enc:c29tZXRoaW5n".to_string();

        let report = detect_conflicts(&local, &remote);
        assert!(report.of_kind(ConflictType::ModifiedMirror).next().is_none());
    }

    #[test]
    fn three_deletion_cases() {
        let now = Utc::now();
        let mut local = base_set();
        // (i) deleted locally, active remotely
        local.mirrors.push(tombstone("a", ToolType::Codex, now));
        // (ii) active locally, deleted remotely
        local.mirrors.push(entry("b", ToolType::Codex, "https://b", "kb"));
        // (iii) deleted locally, unknown remotely
        local.mirrors.push(tombstone("c", ToolType::Claude, now));

        let mut remote_set = base_set();
        remote_set.mirrors.push(entry("a", ToolType::Codex, "https://a", "ka"));
        let mut remote = snapshot_of(&remote_set);
        remote.deleted_mirrors.push(tombstone("b", ToolType::Codex, now));

        let report = detect_conflicts(&local, &remote);
        let deleted: Vec<_> = report.of_kind(ConflictType::DeletedMirror).collect();
        assert_eq!(deleted.len(), 3);
        assert_eq!(deleted[0].name, "a");
        assert_eq!(deleted[0].deletion, Some(DeletionCase::DeletedLocally));
        assert_eq!(deleted[1].name, "b");
        assert_eq!(deleted[1].deletion, Some(DeletionCase::DeletedRemotely));
        assert_eq!(deleted[2].name, "c");
        assert_eq!(deleted[2].deletion, Some(DeletionCase::LocalOnly));
        assert!(report.of_kind(ConflictType::NewMirror).next().is_none());
    }

    #[test]
    fn synced_tombstone_is_quiet() {
        let now = Utc::now();
        let mut local = base_set();
        local.mirrors.push(tombstone("old", ToolType::Codex, now));
        let remote = snapshot_of(&local);

        assert!(detect_conflicts(&local, &remote).is_empty());
    }

    #[test]
    fn current_change_per_tool() {
        let local = base_set();
        let mut remote = snapshot_of(&local);
        remote.current_codex = String::new();
        remote.current_claude = "relay-2".to_string();

        let report = detect_conflicts(&local, &remote);
        let changes: Vec<_> = report.of_kind(ConflictType::CurrentChange).collect();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].current.as_ref().unwrap().tool, ToolType::Codex);
        assert_eq!(changes[1].current.as_ref().unwrap().remote, "relay-2");
    }
}
