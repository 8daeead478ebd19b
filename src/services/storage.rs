//! Built-in object storage backends.
//!
//! The endpoint scheme chooses the backend: `http://` / `https://` uploads
//! with an HTTP `PUT` (S3-compatible gateways, MinIO with presigned-less
//! policies, plain WebDAV), anything else is treated as a local directory.

use super::{ImageBytes, ObjectStorage};
use crate::config::StorageConfig;
use crate::error::DocParseError;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Build the backend described by `config`.
pub fn from_config(
    config: &StorageConfig,
    timeout_secs: u64,
) -> Result<Arc<dyn ObjectStorage>, DocParseError> {
    let endpoint = config.endpoint.trim();
    if endpoint.is_empty() {
        return Err(DocParseError::InvalidConfig(
            "storage endpoint is empty".into(),
        ));
    }
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Ok(Arc::new(HttpObjectStorage::new(config, timeout_secs)?))
    } else {
        Ok(Arc::new(LocalDirStorage::new(config)))
    }
}

fn join_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key.trim_start_matches('/'))
}

// ── HTTP ─────────────────────────────────────────────────────────────────

/// Uploads with `PUT {endpoint}/{bucket}/{key}`.
pub struct HttpObjectStorage {
    client: reqwest::Client,
    upload_base: String,
    public_base: String,
    token: Option<String>,
}

impl HttpObjectStorage {
    pub fn new(config: &StorageConfig, timeout_secs: u64) -> Result<Self, DocParseError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| DocParseError::InvalidConfig(format!("storage client: {e}")))?;
        let upload_base = if config.bucket.is_empty() {
            config.endpoint.trim_end_matches('/').to_string()
        } else {
            join_url(&config.endpoint, &config.bucket)
        };
        let public_base = config
            .public_base_url
            .clone()
            .unwrap_or_else(|| upload_base.clone());
        Ok(Self {
            client,
            upload_base,
            public_base,
            token: config.token.clone(),
        })
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn put(&self, key: &str, image: &ImageBytes) -> Result<String, String> {
        let target = join_url(&self.upload_base, key);
        let mut request = self
            .client
            .put(&target)
            .header(reqwest::header::CONTENT_TYPE, image.mime_type.as_str())
            .body(image.data.clone());
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP {} from {}", response.status(), target));
        }
        debug!("Uploaded {} bytes to {}", image.data.len(), target);
        Ok(join_url(&self.public_base, key))
    }
}

// ── Local directory ──────────────────────────────────────────────────────

/// Writes images below a directory and returns `file://` URLs (or URLs under
/// `public_base_url` when one is configured).
pub struct LocalDirStorage {
    root: PathBuf,
    public_base: Option<String>,
}

impl LocalDirStorage {
    pub fn new(config: &StorageConfig) -> Self {
        let endpoint = config.endpoint.trim();
        let dir = endpoint.strip_prefix("file://").unwrap_or(endpoint);
        let mut root = PathBuf::from(dir);
        if !config.bucket.is_empty() {
            root.push(&config.bucket);
        }
        Self {
            root,
            public_base: config.public_base_url.clone(),
        }
    }

    /// `root/key`, refusing keys that are absolute or contain `..`.
    fn path_for(&self, key: &str) -> Result<PathBuf, String> {
        let relative = Path::new(key.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(format!("key '{key}' escapes the storage directory"));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStorage for LocalDirStorage {
    async fn put(&self, key: &str, image: &ImageBytes) -> Result<String, String> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("create {}: {e}", parent.display()))?;
        }
        tokio::fs::write(&path, &image.data)
            .await
            .map_err(|e| format!("write {}: {e}", path.display()))?;
        debug!("Stored {} bytes at {}", image.data.len(), path.display());

        Ok(match self.public_base {
            Some(ref base) => join_url(base, key),
            None => format!("file://{}", path.display()),
        })
    }
}
