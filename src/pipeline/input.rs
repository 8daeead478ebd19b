//! Input resolution: turn a caller-supplied source into document bytes.
//!
//! Readers work on byte slices, so a path is read fully into memory and a URL
//! is downloaded the same way. The file name is kept alongside the bytes
//! because format detection falls back to the extension when the content has
//! no magic number (Markdown, plain text).

use crate::error::DocParseError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Where a document comes from.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// In-memory content. `file_name` is used only for format detection.
    Bytes {
        data: Vec<u8>,
        file_name: Option<String>,
    },
    /// A file on the local filesystem.
    Path(PathBuf),
    /// An `http://` or `https://` URL.
    Url(String),
}

impl DocumentSource {
    /// Interpret a CLI-style argument: URLs become [`DocumentSource::Url`],
    /// anything else a path.
    pub fn from_arg(input: &str) -> Self {
        if is_url(input) {
            DocumentSource::Url(input.to_string())
        } else {
            DocumentSource::Path(PathBuf::from(input))
        }
    }
}

/// Document bytes plus the name they came under.
#[derive(Debug, Clone)]
pub struct LoadedSource {
    pub data: Vec<u8>,
    pub file_name: Option<String>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load the bytes behind `source`.
pub async fn load_source(
    source: DocumentSource,
    timeout_secs: u64,
) -> Result<LoadedSource, DocParseError> {
    match source {
        DocumentSource::Bytes { data, file_name } => Ok(LoadedSource { data, file_name }),
        DocumentSource::Path(path) => read_local(&path).await,
        DocumentSource::Url(url) => download_url(&url, timeout_secs).await,
    }
}

async fn read_local(path: &Path) -> Result<LoadedSource, DocParseError> {
    let data = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        ErrorKind::PermissionDenied => DocParseError::PermissionDenied {
            path: path.to_path_buf(),
        },
        ErrorKind::NotFound => DocParseError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => DocParseError::Unreadable {
            detail: format!("{}: {e}", path.display()),
        },
    })?;
    debug!("Read {} bytes from {}", data.len(), path.display());
    Ok(LoadedSource {
        data,
        file_name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned()),
    })
}

/// Download a URL fully into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<LoadedSource, DocParseError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| DocParseError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let download_error = |e: reqwest::Error| {
        if e.is_timeout() {
            DocParseError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            DocParseError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(download_error)?;
    if !response.status().is_success() {
        return Err(DocParseError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(download_error)?;
    info!("Downloaded {} bytes", bytes.len());
    Ok(LoadedSource {
        data: bytes.to_vec(),
        file_name: filename_from_url(url),
    })
}

/// Last path segment of the URL, when it looks like a file name.
fn filename_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    (!last.is_empty() && last.contains('.')).then(|| last.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.md"));
        assert!(!is_url(""));
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://host.test/papers/report.pdf?dl=1"),
            Some("report.pdf".to_string())
        );
        assert_eq!(filename_from_url("https://host.test/papers/"), None);
        assert_eq!(filename_from_url("not a url"), None);
    }

    #[tokio::test]
    async fn missing_file_is_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_source(DocumentSource::Path(dir.path().join("nope.md")), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, DocParseError::FileNotFound { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn local_file_keeps_its_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "# hi").unwrap();
        let loaded = load_source(DocumentSource::from_arg(path.to_str().unwrap()), 5)
            .await
            .unwrap();
        assert_eq!(loaded.data, b"# hi");
        assert_eq!(loaded.file_name.as_deref(), Some("notes.md"));
    }
}
