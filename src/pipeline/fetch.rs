//! Image byte resolution: placeholder reference → original image bytes.
//!
//! Lookup order is fixed: bytes the reader extracted into
//! [`Document::embedded_images`], then `data:` URIs, then `http(s)://` URLs,
//! then local paths (relative ones against `image_base_dir`). The MIME type is
//! always sniffed from the bytes; anything `image` cannot identify is
//! rejected so a stray HTML error page never gets uploaded as a picture.

use crate::model::{Document, ImageSource};
use crate::services::ImageBytes;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Resolves image sources for one document. Cheap to share across tasks.
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    client: reqwest::Client,
    embedded: Arc<HashMap<String, Vec<u8>>>,
    base_dir: Option<PathBuf>,
}

impl ImageFetcher {
    pub fn new(
        document: &Document,
        base_dir: Option<PathBuf>,
        timeout_secs: u64,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self {
            client,
            embedded: Arc::new(document.embedded_images.clone()),
            base_dir,
        })
    }

    /// Decide where `reference` points.
    pub fn classify(&self, reference: &str) -> ImageSource {
        if self.embedded.contains_key(reference) {
            ImageSource::Embedded(reference.to_string())
        } else if reference.starts_with("data:") {
            ImageSource::DataUri(reference.to_string())
        } else if reference.starts_with("http://") || reference.starts_with("https://") {
            ImageSource::Remote(reference.to_string())
        } else {
            let path = PathBuf::from(reference.strip_prefix("file://").unwrap_or(reference));
            let path = match self.base_dir {
                Some(ref base) if path.is_relative() => base.join(path),
                _ => path,
            };
            ImageSource::LocalPath(path)
        }
    }

    /// Load the bytes behind `source` and sniff their type.
    pub async fn fetch(&self, source: &ImageSource) -> Result<ImageBytes, String> {
        let data = match source {
            ImageSource::Embedded(key) => self
                .embedded
                .get(key)
                .cloned()
                .ok_or_else(|| format!("no embedded image '{key}'"))?,
            ImageSource::DataUri(uri) => decode_data_uri(uri)?,
            ImageSource::LocalPath(path) => tokio::fs::read(path)
                .await
                .map_err(|e| format!("{}: {e}", path.display()))?,
            ImageSource::Remote(url) => self.download(url).await?,
        };
        let mime_type = sniff(&data)?;
        debug!("Resolved {:?} → {} bytes {}", source_kind(source), data.len(), mime_type);
        Ok(ImageBytes { data, mime_type })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, String> {
        let response = self.client.get(url).send().await.map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP {} from {}", response.status(), url));
        }
        let bytes = response.bytes().await.map_err(|e| e.to_string())?;
        Ok(bytes.to_vec())
    }
}

fn source_kind(source: &ImageSource) -> &'static str {
    match source {
        ImageSource::Embedded(_) => "embedded",
        ImageSource::DataUri(_) => "data-uri",
        ImageSource::LocalPath(_) => "local",
        ImageSource::Remote(_) => "remote",
    }
}

/// Decode `data:[<mime>][;base64],<payload>`. Only base64 payloads carry
/// binary images; a non-base64 payload is taken verbatim.
fn decode_data_uri(uri: &str) -> Result<Vec<u8>, String> {
    let rest = uri.strip_prefix("data:").ok_or("not a data URI")?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or("data URI has no ',' separator")?;
    if meta.split(';').any(|p| p.eq_ignore_ascii_case("base64")) {
        let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        STANDARD
            .decode(cleaned)
            .map_err(|e| format!("invalid base64 in data URI: {e}"))
    } else {
        Ok(payload.as_bytes().to_vec())
    }
}

/// MIME type of `data`, or an error when it is not a recognised image.
pub fn sniff(data: &[u8]) -> Result<String, String> {
    if data.is_empty() {
        return Err("empty image".to_string());
    }
    image::guess_format(data)
        .map(|format| format.to_mime_type().to_string())
        .map_err(|_| "content is not a recognised image format".to_string())
}
