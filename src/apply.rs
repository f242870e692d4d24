//! Apply the current mirrors to downstream tools.
//!
//! Environment changes go through an [`EnvSink`] instead of touching the
//! process environment directly, so the same code path can export shell
//! lines, mutate the real environment, or record into a map in tests.
//! Tool-specific config files are written by [`MirrorApplier`]s.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::model::{ProfileEntry, ProfileSet, ToolType};
use crate::util::shell_quote;

/// Destination for environment variable changes.
pub trait EnvSink {
    fn set(&mut self, key: &str, value: &str);
    fn unset(&mut self, key: &str);
}

/// Mutates the environment of the running process.
#[derive(Debug, Default)]
pub struct ProcessEnvSink;

impl EnvSink for ProcessEnvSink {
    fn set(&mut self, key: &str, value: &str) {
        std::env::set_var(key, value);
    }

    fn unset(&mut self, key: &str) {
        std::env::remove_var(key);
    }
}

/// Records variables in memory. `None` marks an explicit unset.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MemoryEnvSink {
    pub vars: BTreeMap<String, Option<String>>,
}

impl MemoryEnvSink {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).and_then(|v| v.as_deref())
    }
}

impl EnvSink for MemoryEnvSink {
    fn set(&mut self, key: &str, value: &str) {
        self.vars.insert(key.to_string(), Some(value.to_string()));
    }

    fn unset(&mut self, key: &str) {
        self.vars.insert(key.to_string(), None);
    }
}

/// Collects POSIX shell lines, for `eval "$(mirrorsync env)"`.
#[derive(Debug, Default, Clone)]
pub struct ShellExportSink {
    pub lines: Vec<String>,
}

impl ShellExportSink {
    pub fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }
}

impl EnvSink for ShellExportSink {
    fn set(&mut self, key: &str, value: &str) {
        self.lines
            .push(format!("export {}={}", key, shell_quote(value)));
    }

    fn unset(&mut self, key: &str) {
        self.lines.push(format!("unset {}", key));
    }
}

/// Writes one tool's native configuration for a mirror.
#[async_trait]
pub trait MirrorApplier: Send + Sync {
    fn tool_type(&self) -> ToolType;

    async fn apply_mirror(&self, entry: &ProfileEntry) -> anyhow::Result<()>;
}

fn clear_tool_env(tool: ToolType, sink: &mut dyn EnvSink) {
    sink.unset(tool.env_key());
    sink.unset(tool.base_url_env());
    sink.unset(tool.model_env());
}

fn export_entry(entry: &ProfileEntry, sink: &mut dyn EnvSink) {
    let tool = entry.tool_type;
    if entry.api_key.is_empty() {
        sink.unset(tool.env_key());
    } else {
        sink.set(tool.env_key(), &entry.api_key);
    }
    sink.set(tool.base_url_env(), &entry.base_url);
    match entry.model_name.as_deref().filter(|m| !m.is_empty()) {
        Some(model) => sink.set(tool.model_env(), model),
        None => sink.unset(tool.model_env()),
    }
    for (key, value) in &entry.extra_env {
        if !is_env_name(key) {
            tracing::warn!(mirror = %entry.name, key = %key, "Skipping extra env var with invalid name");
            continue;
        }
        sink.set(key, value);
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
fn is_env_name(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Apply the current mirror of every tool type.
///
/// A tool without a resolvable current mirror has its variables unset.
/// Returns the tool/mirror pairs that were applied.
pub async fn apply_current(
    set: &ProfileSet,
    appliers: &[Box<dyn MirrorApplier>],
    sink: &mut dyn EnvSink,
) -> anyhow::Result<Vec<(ToolType, String)>> {
    let mut applied = Vec::new();

    for tool in ToolType::ALL {
        let name = set.current(tool);
        let Some(entry) = set.find_active(name).filter(|m| m.tool_type == tool) else {
            if !name.is_empty() {
                tracing::warn!(tool = %tool, mirror = %name, "Current mirror not found, clearing its environment");
            }
            clear_tool_env(tool, sink);
            continue;
        };

        for applier in appliers.iter().filter(|a| a.tool_type() == tool) {
            applier.apply_mirror(entry).await?;
        }
        export_entry(entry, sink);

        tracing::debug!(tool = %tool, mirror = %entry.name, "Applied mirror");
        applied.push((tool, entry.name.clone()));
    }

    Ok(applied)
}
