//! Error types for the edgequake-docparse library.
//!
//! Two error types for two failure modes:
//!
//! * [`DocParseError`]: **fatal**, the document cannot be turned into chunks
//!   at all (missing file, unsupported format, unreadable bytes). Returned as
//!   `Err(DocParseError)` from the top-level `parse*` functions; no partial
//!   chunks are returned.
//!
//! * [`ImageError`]: **non-fatal**, one image failed to resolve, upload, or
//!   be described. Recorded as an [`ImageDiagnostic`] in
//!   [`crate::output::ParseOutput`]; the owning chunk and every sibling image
//!   are unaffected.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-docparse library.
#[derive(Debug, Error)]
pub enum DocParseError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Document errors ───────────────────────────────────────────────────
    /// No reader is registered for the detected (or undetectable) format.
    #[error("Unsupported document format: {detail}")]
    UnsupportedFormat { detail: String },

    /// The bytes matched a format but could not be decoded.
    #[error("Document is unreadable: {detail}")]
    Unreadable { detail: String },

    /// The document structure is corrupt and cannot be parsed.
    #[error("Document is corrupt: {detail}")]
    CorruptDocument { detail: String },

    /// The document requires a password but none (or a wrong one) was given.
    #[error("Document is encrypted and requires a valid password")]
    PasswordRequired,

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The caller's deadline passed before any chunk could be produced.
    #[error("Deadline exceeded after {elapsed_ms}ms while {stage}")]
    DeadlineExceeded { stage: String, elapsed_ms: u64 },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single image.
///
/// Every variant carries the image id (`"{seq}-{index}"`) so a diagnostic can
/// be traced back to its chunk without extra bookkeeping.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageError {
    /// The original bytes could not be resolved (missing file, HTTP error,
    /// bad data URI, not an image).
    #[error("Image {image_id}: fetch failed: {detail}")]
    Fetch { image_id: String, detail: String },

    /// Persistent storage rejected the upload.
    #[error("Image {image_id}: upload failed: {detail}")]
    Upload { image_id: String, detail: String },

    /// OCR failed; the image is still attached with empty `ocr_text`.
    #[error("Image {image_id}: OCR failed: {detail}")]
    Ocr { image_id: String, detail: String },

    /// Captioning failed; the image is still attached with an empty caption.
    #[error("Image {image_id}: caption failed: {detail}")]
    Caption { image_id: String, detail: String },

    /// The parse deadline expired before the image finished.
    #[error("Image {image_id}: abandoned at deadline")]
    Timeout { image_id: String },
}

impl ImageError {
    /// The image id this error belongs to.
    pub fn image_id(&self) -> &str {
        match self {
            ImageError::Fetch { image_id, .. }
            | ImageError::Upload { image_id, .. }
            | ImageError::Ocr { image_id, .. }
            | ImageError::Caption { image_id, .. }
            | ImageError::Timeout { image_id } => image_id,
        }
    }

    /// Whether the image was dropped from its chunk because of this error.
    ///
    /// OCR and caption failures degrade a field; everything else omits the
    /// image entirely.
    pub fn omits_image(&self) -> bool {
        !matches!(self, ImageError::Ocr { .. } | ImageError::Caption { .. })
    }
}

/// One absorbed image-level failure, reported alongside the chunks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageDiagnostic {
    /// Sequence number of the chunk that owns the image.
    pub chunk_seq: usize,
    /// The placeholder reference as written in the chunk text.
    pub reference: String,
    pub error: ImageError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_display() {
        let e = DocParseError::UnsupportedFormat {
            detail: "extension 'xlsx'".into(),
        };
        assert!(e.to_string().contains("xlsx"), "got: {e}");
    }

    #[test]
    fn deadline_display() {
        let e = DocParseError::DeadlineExceeded {
            stage: "reading document".into(),
            elapsed_ms: 1500,
        };
        let msg = e.to_string();
        assert!(msg.contains("1500ms"));
        assert!(msg.contains("reading document"));
    }

    #[test]
    fn image_error_carries_id() {
        let e = ImageError::Upload {
            image_id: "3-1".into(),
            detail: "HTTP 503".into(),
        };
        assert_eq!(e.image_id(), "3-1");
        assert!(e.to_string().contains("HTTP 503"));
    }

    #[test]
    fn only_fetch_upload_and_timeout_omit_the_image() {
        let id = || "0-0".to_string();
        assert!(ImageError::Fetch { image_id: id(), detail: String::new() }.omits_image());
        assert!(ImageError::Upload { image_id: id(), detail: String::new() }.omits_image());
        assert!(ImageError::Timeout { image_id: id() }.omits_image());
        assert!(!ImageError::Ocr { image_id: id(), detail: String::new() }.omits_image());
        assert!(!ImageError::Caption { image_id: id(), detail: String::new() }.omits_image());
    }

    #[test]
    fn image_error_serialises_with_kind_tag() {
        let e = ImageError::Timeout { image_id: "1-0".into() };
        let json = serde_json::to_string(&e).unwrap();
        assert_eq!(json, r#"{"kind":"timeout","image_id":"1-0"}"#);
    }
}
