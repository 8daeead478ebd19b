//! Configuration types for document parsing.
//!
//! Every stage receives its settings from one explicit [`ParseConfig`] value;
//! there is no global state. Build it with [`ParseConfig::builder()`], which
//! validates the chunking bounds before any document is touched.

use crate::error::DocParseError;
use crate::progress::ProgressCallback;
use crate::services::{ImageCaptioner, ObjectStorage, OcrEngine};
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for one parse invocation.
///
/// # Example
/// ```rust
/// use edgequake_docparse::ParseConfig;
///
/// let config = ParseConfig::builder()
///     .chunk_size(500)
///     .chunk_overlap(50)
///     .build()
///     .unwrap();
/// assert!(!config.enable_multimodal);
/// ```
#[derive(Clone)]
pub struct ParseConfig {
    /// Maximum rendered size of a chunk, in `char`s. Default: 512.
    ///
    /// Hard for text, soft for atomic units: a table or image placeholder
    /// longer than this is placed alone in its own chunk instead of being cut.
    pub chunk_size: usize,

    /// Trailing `char`s of a chunk repeated at the start of the next one.
    /// Must be smaller than `chunk_size`. Default: 50.
    pub chunk_overlap: usize,

    /// Resolve image placeholders to stored images with OCR and captions.
    /// Default: false (enrichment is a passthrough).
    pub enable_multimodal: bool,

    /// Object storage settings, passed through to the storage backend.
    pub storage: StorageConfig,

    /// Vision-language model settings, passed through to the captioner.
    pub vlm: VlmConfig,

    /// Which OCR backend runs on each image. Default: [`OcrBackend::Disabled`].
    pub ocr_backend: OcrBackend,

    /// Document-wide cap on images processed at once. Default: 5.
    pub concurrency: usize,

    /// Time budget for the whole parse. Default: None (no deadline).
    ///
    /// On expiry, in-flight image work is abandoned and chunks are returned
    /// with whichever images had already finished.
    pub deadline: Option<Duration>,

    /// Retry attempts on a transient VLM failure. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-VLM-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Download timeout for URL documents and remote images. Default: 120.
    pub download_timeout_secs: u64,

    /// Password for encrypted PDFs.
    pub password: Option<String>,

    /// Base directory for relative image paths. Default: None (process cwd).
    pub image_base_dir: Option<PathBuf>,

    /// Pre-constructed LLM provider. Takes precedence over `vlm.provider`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed storage backend. Takes precedence over `storage`.
    pub object_store: Option<Arc<dyn ObjectStorage>>,

    /// Pre-constructed OCR engine. Takes precedence over `ocr_backend`.
    pub ocr_engine: Option<Arc<dyn OcrEngine>>,

    /// Pre-constructed captioner. Takes precedence over `vlm`.
    pub captioner: Option<Arc<dyn ImageCaptioner>>,

    /// Receives per-image enrichment events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
            enable_multimodal: false,
            storage: StorageConfig::default(),
            vlm: VlmConfig::default(),
            ocr_backend: OcrBackend::default(),
            concurrency: 5,
            deadline: None,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            download_timeout_secs: 120,
            password: None,
            image_base_dir: None,
            provider: None,
            object_store: None,
            ocr_engine: None,
            captioner: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ParseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opaque = |set: bool| if set { Some("<dyn>") } else { None };
        f.debug_struct("ParseConfig")
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .field("enable_multimodal", &self.enable_multimodal)
            .field("storage", &self.storage)
            .field("vlm", &self.vlm)
            .field("ocr_backend", &self.ocr_backend)
            .field("concurrency", &self.concurrency)
            .field("deadline", &self.deadline)
            .field("max_retries", &self.max_retries)
            .field("provider", &opaque(self.provider.is_some()))
            .field("object_store", &opaque(self.object_store.is_some()))
            .field("ocr_engine", &opaque(self.ocr_engine.is_some()))
            .field("captioner", &opaque(self.captioner.is_some()))
            .finish()
    }
}

impl ParseConfig {
    /// Create a new builder for `ParseConfig`.
    pub fn builder() -> ParseConfigBuilder {
        ParseConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ParseConfig`].
#[derive(Debug)]
pub struct ParseConfigBuilder {
    config: ParseConfig,
}

impl ParseConfigBuilder {
    pub fn chunk_size(mut self, n: usize) -> Self {
        self.config.chunk_size = n;
        self
    }

    pub fn chunk_overlap(mut self, n: usize) -> Self {
        self.config.chunk_overlap = n;
        self
    }

    pub fn enable_multimodal(mut self, v: bool) -> Self {
        self.config.enable_multimodal = v;
        self
    }

    pub fn storage(mut self, storage: StorageConfig) -> Self {
        self.config.storage = storage;
        self
    }

    pub fn vlm(mut self, vlm: VlmConfig) -> Self {
        self.config.vlm = vlm;
        self
    }

    pub fn ocr_backend(mut self, backend: OcrBackend) -> Self {
        self.config.ocr_backend = backend;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn deadline(mut self, d: Duration) -> Self {
        self.config.deadline = Some(d);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn image_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.image_base_dir = Some(dir.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn object_store(mut self, store: Arc<dyn ObjectStorage>) -> Self {
        self.config.object_store = Some(store);
        self
    }

    pub fn ocr_engine(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.config.ocr_engine = Some(engine);
        self
    }

    pub fn captioner(mut self, captioner: Arc<dyn ImageCaptioner>) -> Self {
        self.config.captioner = Some(captioner);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ParseConfig, DocParseError> {
        let c = &self.config;
        if c.chunk_size == 0 {
            return Err(DocParseError::InvalidConfig(
                "chunk_size must be > 0".into(),
            ));
        }
        if c.chunk_overlap >= c.chunk_size {
            return Err(DocParseError::InvalidConfig(format!(
                "chunk_overlap must be < chunk_size, got {} >= {}",
                c.chunk_overlap, c.chunk_size
            )));
        }
        if c.concurrency == 0 {
            return Err(DocParseError::InvalidConfig(
                "concurrency must be ≥ 1".into(),
            ));
        }
        if c.enable_multimodal && c.object_store.is_none() && c.storage.endpoint.trim().is_empty() {
            return Err(DocParseError::InvalidConfig(
                "enable_multimodal requires a storage endpoint or an injected object store".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Pass-through collaborator settings ───────────────────────────────────

/// Object storage settings. Opaque to the pipeline; read only by the
/// storage backend built from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `http(s)://host[:port]` for an HTTP object store, or `file:///dir` /
    /// a plain directory path for local storage.
    pub endpoint: String,
    /// Bucket (HTTP) or sub-directory (local).
    pub bucket: String,
    /// Bearer token sent with every upload.
    pub token: Option<String>,
    /// Base of the returned permanent URLs. Default: `{endpoint}/{bucket}`.
    pub public_base_url: Option<String>,
    /// Key prefix prepended to every object. Default: empty.
    pub path_prefix: String,
}

/// Vision-language model settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VlmConfig {
    /// Provider name (e.g. "openai", "anthropic", "ollama"). If None, the
    /// provider is auto-detected from the environment.
    pub provider: Option<String>,
    /// Model identifier. Default: provider default (`gpt-4.1-nano` for OpenAI).
    pub model: Option<String>,
    /// Generate captions. Default: true.
    pub caption: bool,
    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,
    /// Maximum tokens per caption or OCR response. Default: 1024.
    pub max_tokens: usize,
    /// Override for the built-in caption prompt.
    pub caption_prompt: Option<String>,
    /// Override for the built-in OCR prompt.
    pub ocr_prompt: Option<String>,
}

impl Default for VlmConfig {
    fn default() -> Self {
        Self {
            provider: None,
            model: None,
            caption: true,
            temperature: 0.1,
            max_tokens: 1024,
            caption_prompt: None,
            ocr_prompt: None,
        }
    }
}

/// OCR backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrBackend {
    /// A local OCR engine (the `tesseract` CLI).
    Engine,
    /// Ask the configured vision model to transcribe the image.
    VisionModel,
    /// No OCR; `ocr_text` stays empty. (default)
    #[default]
    Disabled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = ParseConfig::builder().build().unwrap();
        assert_eq!(c.chunk_size, 512);
        assert_eq!(c.chunk_overlap, 50);
        assert_eq!(c.concurrency, 5);
        assert_eq!(c.ocr_backend, OcrBackend::Disabled);
        assert!(c.deadline.is_none());
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let err = ParseConfig::builder().chunk_size(0).chunk_overlap(0).build();
        assert!(matches!(err, Err(DocParseError::InvalidConfig(_))));
    }

    #[test]
    fn overlap_must_be_below_chunk_size() {
        assert!(ParseConfig::builder().chunk_size(100).chunk_overlap(100).build().is_err());
        assert!(ParseConfig::builder().chunk_size(100).chunk_overlap(99).build().is_ok());
    }

    #[test]
    fn zero_concurrency_rejected() {
        assert!(ParseConfig::builder().concurrency(0).build().is_err());
    }

    #[test]
    fn multimodal_needs_storage() {
        assert!(ParseConfig::builder().enable_multimodal(true).build().is_err());
        let ok = ParseConfig::builder()
            .enable_multimodal(true)
            .storage(StorageConfig {
                endpoint: "http://localhost:9000".into(),
                bucket: "images".into(),
                ..Default::default()
            })
            .build();
        assert!(ok.is_ok());
    }

    #[test]
    fn ocr_backend_serde_names() {
        let b: OcrBackend = serde_json::from_str("\"vision_model\"").unwrap();
        assert_eq!(b, OcrBackend::VisionModel);
        assert_eq!(serde_json::to_string(&OcrBackend::Engine).unwrap(), "\"engine\"");
    }

    #[test]
    fn debug_hides_injected_collaborators() {
        let c = ParseConfig::default();
        let s = format!("{c:?}");
        assert!(s.contains("chunk_size: 512"));
        assert!(s.contains("provider: None"));
    }
}
