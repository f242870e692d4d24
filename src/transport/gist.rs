//! GitHub Gist transport.
//!
//! Every blob is one file of a single secret gist, stored base64-encoded
//! because gist files must be text. The gist is created on the first upload
//! when no ID is configured, and its ID is written to the ID file so later
//! runs keep using it.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use super::{SyncTransport, TransportError};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const GIST_DESCRIPTION: &str = "mirrorsync profile snapshot";
const USER_AGENT: &str = concat!("mirrorsync/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct GistResponse {
    id: String,
    #[serde(default)]
    files: BTreeMap<String, Option<GistFile>>,
}

#[derive(Debug, Deserialize)]
struct GistFile {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    truncated: bool,
    #[serde(default)]
    raw_url: Option<String>,
}

pub struct GistTransport {
    client: Client,
    api_url: String,
    token: String,
    gist_id: RwLock<Option<String>>,
    id_file: Option<PathBuf>,
}

impl GistTransport {
    pub fn new(api_url: &str, token: &str, gist_id: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            gist_id: RwLock::new(gist_id.filter(|id| !id.trim().is_empty())),
            id_file: None,
        }
    }

    /// Remember created gists in `path`. An ID already stored there is used
    /// when none was passed to [`GistTransport::new`].
    pub fn with_id_file(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = self.gist_id.get_mut();
        if current.is_none() {
            *current = read_id_file(&path);
        }
        self.id_file = Some(path);
        self
    }

    /// The gist in use, including one created by an earlier upload.
    pub async fn gist_id(&self) -> Option<String> {
        self.gist_id.read().await.clone()
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
    }

    fn gist_url(&self, id: &str) -> String {
        format!("{}/gists/{}", self.api_url, id)
    }

    async fn require_id(&self, name: &str) -> Result<String, TransportError> {
        self.gist_id()
            .await
            .ok_or_else(|| TransportError::NotFound(format!("{} (no gist configured)", name)))
    }

    async fn fetch_gist(&self, id: &str) -> Result<GistResponse, TransportError> {
        let resp = self
            .authorized(self.client.get(self.gist_url(id)))
            .send()
            .await?;
        let text = checked_body(resp, id).await?;
        serde_json::from_str(&text).map_err(|e| TransportError::InvalidResponse(e.to_string()))
    }

    async fn fetch_raw(&self, raw_url: &str) -> Result<String, TransportError> {
        let resp = self.authorized(self.client.get(raw_url)).send().await?;
        checked_body(resp, raw_url).await
    }

    async fn create_gist(&self, name: &str, content: String) -> Result<String, TransportError> {
        let body = serde_json::json!({
            "description": GIST_DESCRIPTION,
            "public": false,
            "files": { name: { "content": content } }
        });

        let resp = self
            .authorized(self.client.post(format!("{}/gists", self.api_url)))
            .json(&body)
            .send()
            .await?;
        let text = checked_body(resp, name).await?;
        let created: GistResponse =
            serde_json::from_str(&text).map_err(|e| TransportError::InvalidResponse(e.to_string()))?;

        tracing::info!(gist_id = %created.id, "Created secret gist for sync snapshots");
        *self.gist_id.write().await = Some(created.id.clone());
        self.persist_id(&created.id).await?;
        Ok(created.id)
    }

    async fn persist_id(&self, id: &str) -> Result<(), TransportError> {
        let Some(path) = &self.id_file else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, format!("{}\n", id)).await?;
        tokio::fs::rename(&tmp_path, path).await?;
        tracing::debug!(path = %path.display(), "Saved gist ID");
        Ok(())
    }

    async fn patch_files(&self, id: &str, files: serde_json::Value) -> Result<(), TransportError> {
        let resp = self
            .authorized(self.client.patch(self.gist_url(id)))
            .json(&serde_json::json!({ "files": files }))
            .send()
            .await?;
        checked_body(resp, id).await?;
        Ok(())
    }
}

fn read_id_file(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Some(raw.trim().to_string()).filter(|id| !id.is_empty()),
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "Could not read gist ID file");
            }
            None
        }
    }
}

/// Map a non-success status to a transport error.
fn status_error(status: StatusCode, what: &str, body: String) -> TransportError {
    match status {
        StatusCode::NOT_FOUND => TransportError::NotFound(what.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TransportError::Unauthorized(body),
        _ => TransportError::Http {
            status: status.as_u16(),
            message: body,
        },
    }
}

async fn checked_body(resp: reqwest::Response, what: &str) -> Result<String, TransportError> {
    let status = resp.status();
    let text = resp.text().await?;
    if !status.is_success() {
        return Err(status_error(status, what, text));
    }
    Ok(text)
}

fn decode_blob(name: &str, content: &str) -> Result<Vec<u8>, TransportError> {
    STANDARD
        .decode(content.trim())
        .map_err(|e| TransportError::InvalidResponse(format!("{}: {}", name, e)))
}

#[async_trait]
impl SyncTransport for GistTransport {
    fn kind(&self) -> &'static str {
        "gist"
    }

    async fn upload(&self, name: &str, data: &[u8]) -> Result<(), TransportError> {
        let content = STANDARD.encode(data);
        match self.gist_id().await {
            Some(id) => {
                self.patch_files(&id, serde_json::json!({ name: { "content": content } }))
                    .await?;
                tracing::debug!(gist_id = %id, blob = %name, bytes = data.len(), "Updated gist file");
            }
            None => {
                self.create_gist(name, content).await?;
            }
        }
        Ok(())
    }

    async fn download(&self, name: &str) -> Result<Vec<u8>, TransportError> {
        let id = self.require_id(name).await?;
        let gist = self.fetch_gist(&id).await?;
        let file = gist
            .files
            .get(name)
            .and_then(|f| f.as_ref())
            .ok_or_else(|| TransportError::NotFound(name.to_string()))?;

        let content = match (&file.content, file.truncated, &file.raw_url) {
            (Some(content), false, _) => content.clone(),
            (_, _, Some(raw_url)) => {
                tracing::debug!(blob = %name, "Gist file truncated, following raw_url");
                self.fetch_raw(raw_url).await?
            }
            _ => {
                return Err(TransportError::InvalidResponse(format!(
                    "gist file {} has no content",
                    name
                )))
            }
        };
        decode_blob(name, &content)
    }

    async fn list(&self) -> Result<Vec<String>, TransportError> {
        let Some(id) = self.gist_id().await else {
            return Ok(Vec::new());
        };
        let gist = self.fetch_gist(&id).await?;
        Ok(gist.files.into_keys().collect())
    }

    async fn delete(&self, name: &str) -> Result<(), TransportError> {
        let id = self.require_id(name).await?;
        self.patch_files(&id, serde_json::json!({ name: null })).await
    }
}
