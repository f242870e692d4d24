//! Configuration management for mirrorsync.
//!
//! Configuration is read from environment variables:
//! - `MIRRORSYNC_HOME` - Optional. State directory. Defaults to `$HOME/.mirrorsync`.
//! - `MIRRORSYNC_PASSWORD` - Required for push/pull/status. Sync password.
//! - `MIRRORSYNC_TRANSPORT` - Optional. `gist` (default) or `dir`.
//! - `MIRRORSYNC_GIST_TOKEN` - Required for the gist transport. GitHub token with gist scope.
//! - `MIRRORSYNC_GIST_ID` - Optional. Existing gist. Otherwise the ID saved in
//!   `$MIRRORSYNC_HOME/gist_id` is used, or one is created on first push and saved there.
//! - `MIRRORSYNC_GIST_API` - Optional. Defaults to `https://api.github.com`.
//! - `MIRRORSYNC_DIR` - Required for the dir transport. Blob directory.
//! - `MIRRORSYNC_STRATEGY` - Optional. Pull strategy. Defaults to `merge`.
//! - `MIRRORSYNC_PUSH_STRATEGY` - Optional. Push strategy. Defaults to `auto`.
//! - `MIRRORSYNC_INTERACTIVE` - Optional. Prompt per field during merge. Defaults to `false`.
//! - `MIRRORSYNC_BACKUP_RETAIN` - Optional. Backups kept per kind. Defaults to `10`.
//! - `MIRRORSYNC_BACKUP_AFTER_SYNC` - Optional. Take post-sync backups. Defaults to `true`.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::backup::{BackupManager, DEFAULT_RETAIN};
use crate::store::ProfileStore;
use crate::sync::{PushStrategy, ResolutionStrategy, SyncOptions};
use crate::transport::{gist, DirTransport, GistTransport, SyncTransport};
use crate::util::{home_dir, parse_bool};

const STATE_FILE: &str = "mirrors.json";
const BACKUP_DIR: &str = "backups";
const GIST_ID_FILE: &str = "gist_id";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Which remote store snapshots go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Gist,
    Dir,
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gist" => Ok(Self::Gist),
            "dir" | "directory" => Ok(Self::Dir),
            other => Err(format!("unknown transport '{}'", other)),
        }
    }
}

/// GitHub Gist settings.
#[derive(Debug, Clone)]
pub struct GistConfig {
    pub token: Option<String>,
    pub gist_id: Option<String>,
    pub api_url: String,
}

impl Default for GistConfig {
    fn default() -> Self {
        Self {
            token: None,
            gist_id: None,
            api_url: gist::DEFAULT_API_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// State directory holding the mirror file and backups
    pub home: PathBuf,

    /// Sync password (checked lazily, only sync commands need it)
    pub password: Option<String>,

    pub transport: TransportKind,

    pub gist: GistConfig,

    /// Blob directory for the dir transport
    pub sync_dir: Option<PathBuf>,

    /// Default pull strategy
    pub strategy: ResolutionStrategy,

    /// Default push strategy
    pub push_strategy: PushStrategy,

    pub interactive: bool,

    pub backup_retain: usize,

    pub backup_after_sync: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from any name → value lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let home = var("MIRRORSYNC_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(home_dir()).join(".mirrorsync"));

        let transport = match var("MIRRORSYNC_TRANSPORT") {
            Some(value) => value
                .parse()
                .map_err(|e| ConfigError::InvalidValue("MIRRORSYNC_TRANSPORT".to_string(), e))?,
            None => TransportKind::Gist,
        };

        let gist = GistConfig {
            token: var("MIRRORSYNC_GIST_TOKEN"),
            gist_id: var("MIRRORSYNC_GIST_ID"),
            api_url: var("MIRRORSYNC_GIST_API")
                .unwrap_or_else(|| gist::DEFAULT_API_URL.to_string()),
        };

        let strategy = match var("MIRRORSYNC_STRATEGY") {
            Some(value) => value.parse().map_err(|e: crate::sync::ParseStrategyError| {
                ConfigError::InvalidValue("MIRRORSYNC_STRATEGY".to_string(), e.to_string())
            })?,
            None => ResolutionStrategy::default(),
        };

        let push_strategy = match var("MIRRORSYNC_PUSH_STRATEGY") {
            Some(value) => value.parse().map_err(|e: crate::sync::ParseStrategyError| {
                ConfigError::InvalidValue("MIRRORSYNC_PUSH_STRATEGY".to_string(), e.to_string())
            })?,
            None => PushStrategy::default(),
        };

        let backup_retain = match var("MIRRORSYNC_BACKUP_RETAIN") {
            Some(value) => value.trim().parse::<usize>().map_err(|e| {
                ConfigError::InvalidValue("MIRRORSYNC_BACKUP_RETAIN".to_string(), format!("{}", e))
            })?,
            None => DEFAULT_RETAIN,
        };

        Ok(Self {
            home,
            password: lookup("MIRRORSYNC_PASSWORD").filter(|p| !p.is_empty()),
            transport,
            gist,
            sync_dir: var("MIRRORSYNC_DIR").map(PathBuf::from),
            strategy,
            push_strategy,
            interactive: var("MIRRORSYNC_INTERACTIVE")
                .map(|v| parse_bool(&v))
                .unwrap_or(false),
            backup_retain,
            backup_after_sync: var("MIRRORSYNC_BACKUP_AFTER_SYNC")
                .map(|v| parse_bool(&v))
                .unwrap_or(true),
        })
    }

    /// Create a config rooted at `home` with defaults (useful for testing).
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            password: None,
            transport: TransportKind::Dir,
            gist: GistConfig::default(),
            sync_dir: None,
            strategy: ResolutionStrategy::default(),
            push_strategy: PushStrategy::default(),
            interactive: false,
            backup_retain: DEFAULT_RETAIN,
            backup_after_sync: true,
        }
    }

    pub fn state_path(&self) -> PathBuf {
        self.home.join(STATE_FILE)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.home.join(BACKUP_DIR)
    }

    pub fn gist_id_path(&self) -> PathBuf {
        self.home.join(GIST_ID_FILE)
    }

    pub fn store(&self) -> ProfileStore {
        ProfileStore::new(self.state_path())
    }

    pub fn backups(&self) -> BackupManager {
        BackupManager::new(self.backup_dir(), self.backup_retain)
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            interactive: self.interactive,
            backup_after_sync: self.backup_after_sync,
            ..SyncOptions::default()
        }
    }

    pub fn require_password(&self) -> Result<&str, ConfigError> {
        self.password
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("MIRRORSYNC_PASSWORD".to_string()))
    }

    /// Build the configured transport.
    pub fn build_transport(&self) -> Result<Arc<dyn SyncTransport>, ConfigError> {
        match self.transport {
            TransportKind::Gist => {
                let token = self.gist.token.as_deref().ok_or_else(|| {
                    ConfigError::MissingEnvVar("MIRRORSYNC_GIST_TOKEN".to_string())
                })?;
                Ok(Arc::new(
                    GistTransport::new(&self.gist.api_url, token, self.gist.gist_id.clone())
                        .with_id_file(self.gist_id_path()),
                ))
            }
            TransportKind::Dir => {
                let dir = self
                    .sync_dir
                    .clone()
                    .ok_or_else(|| ConfigError::MissingEnvVar("MIRRORSYNC_DIR".to_string()))?;
                Ok(Arc::new(DirTransport::new(dir)))
            }
        }
    }
}
