//! External collaborators of the enrichment stage.
//!
//! The pipeline talks to storage, OCR, and captioning only through the traits
//! below, so each can be swapped (or mocked in tests) without touching the
//! concurrency logic in [`crate::pipeline::enrich`].
//!
//! Errors are plain `String`s: the enrichment stage wraps them into the
//! matching [`crate::error::ImageError`] variant together with the image id.

pub mod caption;
pub mod ocr;
pub mod storage;

pub use caption::VlmCaptioner;
pub use ocr::{CommandOcr, VlmOcr};
pub use storage::{HttpObjectStorage, LocalDirStorage};

use async_trait::async_trait;

/// Resolved image bytes plus their sniffed MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBytes {
    pub data: Vec<u8>,
    /// e.g. `image/png`.
    pub mime_type: String,
}

impl ImageBytes {
    /// File extension matching the MIME type (`png`, `jpg`, …).
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" => "jpg",
            "image/gif" => "gif",
            "image/webp" => "webp",
            "image/bmp" => "bmp",
            "image/tiff" => "tiff",
            _ => "png",
        }
    }
}

/// Persistent image storage.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `image` under `key` and return its permanent URL.
    async fn put(&self, key: &str, image: &ImageBytes) -> Result<String, String>;
}

/// Optical character recognition.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Text found in the image; empty when there is none.
    async fn recognize(&self, image: &ImageBytes) -> Result<String, String>;
}

/// Natural-language image description.
#[async_trait]
pub trait ImageCaptioner: Send + Sync {
    /// A short caption. `alt` is the document's own label, possibly empty.
    async fn caption(&self, image: &ImageBytes, alt: &str) -> Result<String, String>;
}
