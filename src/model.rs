//! Mirror profile data model.
//!
//! A mirror is a named API endpoint + credential for one downstream AI CLI.
//! Removal is a soft delete: the entry stays in the set as a tombstone so the
//! deletion can be carried to other machines on the next sync.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Name of the built-in mirror preferred when a current pointer must be
/// reselected.
pub const DEFAULT_MIRROR_NAME: &str = "official";

/// Downstream CLI a mirror targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolType {
    Codex,
    Claude,
}

impl ToolType {
    pub const ALL: [ToolType; 2] = [ToolType::Codex, ToolType::Claude];

    pub fn id(&self) -> &'static str {
        match self {
            Self::Codex => "codex",
            Self::Claude => "claude",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id.trim().to_ascii_lowercase().as_str() {
            "codex" => Some(Self::Codex),
            "claude" => Some(Self::Claude),
            _ => None,
        }
    }

    /// Environment variable that carries the API key for this tool.
    pub fn env_key(&self) -> &'static str {
        match self {
            Self::Codex => "OPENAI_API_KEY",
            Self::Claude => "ANTHROPIC_AUTH_TOKEN",
        }
    }

    pub fn base_url_env(&self) -> &'static str {
        match self {
            Self::Codex => "OPENAI_BASE_URL",
            Self::Claude => "ANTHROPIC_BASE_URL",
        }
    }

    pub fn model_env(&self) -> &'static str {
        match self {
            Self::Codex => "OPENAI_MODEL",
            Self::Claude => "ANTHROPIC_MODEL",
        }
    }
}

impl std::fmt::Display for ToolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// A single mirror profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileEntry {
    pub name: String,
    pub base_url: String,
    /// Plaintext locally; `enc:`-prefixed inside a sealed snapshot.
    #[serde(default)]
    pub api_key: String,
    /// Derived from `tool_type`; stored for the downstream adapters.
    #[serde(default)]
    pub env_key: String,
    pub tool_type: ToolType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_env: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Fields written by newer versions, carried through untouched.
    #[serde(flatten)]
    pub unknown: BTreeMap<String, serde_json::Value>,
}

impl ProfileEntry {
    pub fn new(name: impl Into<String>, tool_type: ToolType, base_url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key: String::new(),
            env_key: tool_type.env_key().to_string(),
            tool_type,
            model_name: None,
            extra_env: BTreeMap::new(),
            created_at: now,
            last_modified: now,
            deleted: false,
            deleted_at: None,
            unknown: BTreeMap::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_name = Some(model.into());
        self
    }

    /// Active entries are the ones not tombstoned.
    pub fn is_active(&self) -> bool {
        !self.deleted
    }

    /// A tombstone that carries a deletion time.
    pub fn is_tombstone(&self) -> bool {
        self.deleted && self.deleted_at.is_some()
    }

    /// Recompute `env_key` from the tool type.
    pub fn refresh_env_key(&mut self) {
        self.env_key = self.tool_type.env_key().to_string();
    }

    /// Turn the entry into a tombstone stamped with `at`.
    pub fn mark_deleted(&mut self, at: DateTime<Utc>) {
        self.deleted = true;
        self.deleted_at = Some(at);
        self.last_modified = at;
    }

    /// Copy with the credential removed.
    pub fn without_api_key(&self) -> Self {
        let mut entry = self.clone();
        entry.api_key.clear();
        entry
    }
}

/// Partial update for [`ProfileSet::update`].
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model_name: Option<Option<String>>,
    pub extra_env: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProfileError {
    #[error("Mirror already exists: {0}")]
    AlreadyExists(String),

    #[error("Mirror not found: {0}")]
    NotFound(String),

    #[error("Mirror name must not be empty")]
    EmptyName,
}

/// Locally persisted set of mirrors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileSet {
    #[serde(default)]
    pub mirrors: Vec<ProfileEntry>,
    #[serde(default)]
    pub current_codex: String,
    #[serde(default)]
    pub current_claude: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub unknown: BTreeMap<String, serde_json::Value>,
}

impl ProfileSet {
    /// Entries that are not tombstoned.
    pub fn active(&self) -> impl Iterator<Item = &ProfileEntry> {
        self.mirrors.iter().filter(|m| m.is_active())
    }

    pub fn tombstones(&self) -> impl Iterator<Item = &ProfileEntry> {
        self.mirrors.iter().filter(|m| !m.is_active())
    }

    /// Any entry, active or tombstoned, with this name.
    pub fn find(&self, name: &str) -> Option<&ProfileEntry> {
        self.find_active(name)
            .or_else(|| self.mirrors.iter().find(|m| m.name == name))
    }

    pub fn find_active(&self, name: &str) -> Option<&ProfileEntry> {
        self.active().find(|m| m.name == name)
    }

    fn find_active_mut(&mut self, name: &str) -> Option<&mut ProfileEntry> {
        self.mirrors
            .iter_mut()
            .find(|m| m.is_active() && m.name == name)
    }

    pub fn current(&self, tool: ToolType) -> &str {
        match tool {
            ToolType::Codex => &self.current_codex,
            ToolType::Claude => &self.current_claude,
        }
    }

    pub fn set_current(&mut self, tool: ToolType, name: impl Into<String>) {
        let name = name.into();
        match tool {
            ToolType::Codex => self.current_codex = name,
            ToolType::Claude => self.current_claude = name,
        }
    }

    /// Add a new mirror. A tombstone with the same name is replaced.
    pub fn add(&mut self, mut entry: ProfileEntry) -> Result<(), ProfileError> {
        if entry.name.trim().is_empty() {
            return Err(ProfileError::EmptyName);
        }
        if self.find_active(&entry.name).is_some() {
            return Err(ProfileError::AlreadyExists(entry.name));
        }
        self.mirrors.retain(|m| m.name != entry.name);
        entry.refresh_env_key();
        entry.deleted = false;
        entry.deleted_at = None;
        self.mirrors.push(entry);
        Ok(())
    }

    /// Apply `patch` to an active mirror and bump its modification time.
    pub fn update(&mut self, name: &str, patch: ProfilePatch) -> Result<(), ProfileError> {
        let entry = self
            .find_active_mut(name)
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))?;

        if let Some(base_url) = patch.base_url {
            entry.base_url = base_url;
        }
        if let Some(api_key) = patch.api_key {
            entry.api_key = api_key;
        }
        if let Some(model_name) = patch.model_name {
            entry.model_name = model_name;
        }
        if let Some(extra_env) = patch.extra_env {
            entry.extra_env = extra_env;
        }
        entry.last_modified = Utc::now();
        Ok(())
    }

    /// Soft-delete a mirror and clear any current pointer to it.
    pub fn remove(&mut self, name: &str) -> Result<(), ProfileError> {
        let now = Utc::now();
        let entry = self
            .find_active_mut(name)
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))?;
        entry.mark_deleted(now);
        let tool = entry.tool_type;

        if self.current(tool) == name {
            self.set_current(tool, "");
        }
        Ok(())
    }

    /// Make `name` the current mirror for its tool type.
    pub fn switch(&mut self, name: &str) -> Result<ToolType, ProfileError> {
        let tool = self
            .find_active(name)
            .map(|m| m.tool_type)
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))?;
        self.set_current(tool, name);
        Ok(tool)
    }

    /// Whether `name` is an active entry of `tool`.
    pub fn resolves(&self, tool: ToolType, name: &str) -> bool {
        !name.is_empty()
            && self
                .find_active(name)
                .map(|m| m.tool_type == tool)
                .unwrap_or(false)
    }

    /// Clear current pointers that do not name an active entry of the
    /// matching tool type. Returns the tool types whose pointer was cleared.
    pub fn revalidate_current(&mut self) -> Vec<ToolType> {
        let mut cleared = Vec::new();
        for tool in ToolType::ALL {
            let current = self.current(tool).to_string();
            if !current.is_empty() && !self.resolves(tool, &current) {
                tracing::debug!(tool = %tool, mirror = %current, "Clearing dangling current pointer");
                self.set_current(tool, "");
                cleared.push(tool);
            }
        }
        cleared
    }

    /// Hard-delete tombstones deleted before `cutoff`. Returns the number removed.
    pub fn purge_tombstones(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.mirrors.len();
        self.mirrors.retain(|m| match (m.deleted, m.deleted_at) {
            (true, Some(at)) => at >= cutoff,
            _ => true,
        });
        before - self.mirrors.len()
    }

    /// Return the device ID, generating one on first use.
    pub fn ensure_device_id(&mut self) -> String {
        match &self.device_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => {
                let id = uuid::Uuid::new_v4().to_string();
                self.device_id = Some(id.clone());
                id
            }
        }
    }

    /// Sort entries by name for stable on-disk output.
    pub fn sort(&mut self) {
        self.mirrors.sort_by(|a, b| a.name.cmp(&b.name).then(a.deleted.cmp(&b.deleted)));
    }
}

/// Tombstones newer than this are propagated onto active local entries.
pub fn recent_tombstone_window() -> Duration {
    Duration::days(7)
}

/// Tombstones older than this are dropped after a successful push.
pub fn tombstone_retention() -> Duration {
    Duration::days(30)
}
