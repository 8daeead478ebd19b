//! Parse entry points: document source in, enriched chunks out.
//!
//! One call runs every stage once, in order:
//!
//! ```text
//! input ──▶ reader ──▶ linearize ──▶ segment ──▶ assemble ──▶ enrich
//! (bytes)   (pages)    (one stream)  (units)     (chunks)     (images)
//! ```
//!
//! Only the first two stages can fail the document. Enrichment problems are
//! absorbed into [`ParseOutput::diagnostics`] and never lose a chunk.

use crate::config::{OcrBackend, ParseConfig};
use crate::error::DocParseError;
use crate::output::{ParseOutput, ParseStats};
use crate::pipeline::enrich::Enricher;
use crate::pipeline::fetch::ImageFetcher;
use crate::pipeline::input::{self, DocumentSource};
use crate::pipeline::llm::VisionSettings;
use crate::pipeline::{assemble, linearize, segment};
use crate::progress::NoopProgressCallback;
use crate::reader::{detect_format, ReaderRegistry};
use crate::services::{
    storage, CommandOcr, ImageCaptioner, OcrEngine, VlmCaptioner, VlmOcr,
};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant as StdInstant;
use tokio::time::{timeout_at, Duration, Instant};
use tracing::{debug, info, warn};

const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Parse a document into chunks.
///
/// This is the primary entry point for the library. `config.deadline`, when
/// set, counts from this call.
///
/// # Errors
/// Returns `Err(DocParseError)` only for fatal errors:
/// - File not found / permission denied / download failure
/// - Unsupported, unreadable or corrupt document
/// - Deadline expired before any chunk existed
///
/// # Example
/// ```rust,no_run
/// use edgequake_docparse::{parse, DocumentSource, ParseConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ParseConfig::builder().chunk_size(500).build()?;
/// let output = parse("report-2024", DocumentSource::Path("report.md".into()), &config).await?;
/// for chunk in &output.chunks {
///     println!("#{} {} chars", chunk.seq, chunk.content.chars().count());
/// }
/// # Ok(())
/// # }
/// ```
pub async fn parse(
    document_id: impl Into<String>,
    source: DocumentSource,
    config: &ParseConfig,
) -> Result<ParseOutput, DocParseError> {
    let deadline = config.deadline.map(|d| Instant::now() + d);
    parse_with_registry(
        document_id,
        source,
        config,
        &ReaderRegistry::with_defaults(),
        deadline,
    )
    .await
}

/// Like [`parse`], with an absolute deadline that overrides `config.deadline`.
pub async fn parse_with_deadline(
    document_id: impl Into<String>,
    source: DocumentSource,
    config: &ParseConfig,
    deadline: Instant,
) -> Result<ParseOutput, DocParseError> {
    parse_with_registry(
        document_id,
        source,
        config,
        &ReaderRegistry::with_defaults(),
        Some(deadline),
    )
    .await
}

/// Parse in-memory document bytes. `file_name` is only used to detect the
/// format when the bytes carry no magic number.
pub async fn parse_bytes(
    document_id: impl Into<String>,
    data: impl Into<Vec<u8>>,
    file_name: Option<&str>,
    config: &ParseConfig,
) -> Result<ParseOutput, DocParseError> {
    let source = DocumentSource::Bytes {
        data: data.into(),
        file_name: file_name.map(str::to_string),
    };
    parse(document_id, source, config).await
}

/// Synchronous wrapper around [`parse`].
///
/// Creates a temporary tokio runtime internally; do not call from inside an
/// async context.
pub fn parse_sync(
    document_id: impl Into<String>,
    source: DocumentSource,
    config: &ParseConfig,
) -> Result<ParseOutput, DocParseError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DocParseError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(parse(document_id, source, config))
}

/// Full pipeline with a caller-supplied reader registry.
pub async fn parse_with_registry(
    document_id: impl Into<String>,
    source: DocumentSource,
    config: &ParseConfig,
    registry: &ReaderRegistry,
    deadline: Option<Instant>,
) -> Result<ParseOutput, DocParseError> {
    let total_start = StdInstant::now();
    let document_id = document_id.into();
    info!("Starting parse: {}", document_id);

    // ── Step 1: Load bytes ───────────────────────────────────────────────
    let loaded = within(
        deadline,
        total_start,
        "loading the document",
        input::load_source(source, config.download_timeout_secs),
    )
    .await??;

    // ── Step 2: Read pages ───────────────────────────────────────────────
    let format = detect_format(&loaded.data, loaded.file_name.as_deref())?;
    let reader = registry.require(format)?;
    info!("Reading {} bytes as {}", loaded.data.len(), format);
    let read_config = config.clone();
    let data = loaded.data;
    let reading = tokio::task::spawn_blocking(move || reader.read(&data, &read_config));
    let document = within(deadline, total_start, "reading the document", reading)
        .await?
        .map_err(|e| DocParseError::Internal(format!("Reader task panicked: {}", e)))??;

    // ── Step 3: Linearize, segment, assemble ─────────────────────────────
    let linearized = linearize::linearize(&document);
    let units = segment::segment(&linearized);
    let mut chunks = assemble::assemble(&units, config.chunk_size, config.chunk_overlap);
    info!(
        "{} pages → {} units → {} chunks",
        document.pages.len(),
        units.len(),
        chunks.len()
    );

    let mut stats = ParseStats {
        pages: document.pages.len(),
        units: units.len(),
        chunks: chunks.len(),
        images_found: chunks.iter().map(|c| c.placeholders().count()).sum(),
        ..Default::default()
    };

    // ── Step 4: Enrich ───────────────────────────────────────────────────
    let mut diagnostics = Vec::new();
    if config.enable_multimodal {
        let enrich_start = StdInstant::now();
        let enricher = build_enricher(config)?;
        let fetcher = ImageFetcher::new(
            &document,
            config.image_base_dir.clone(),
            config.download_timeout_secs,
        )
        .map_err(DocParseError::Internal)?;
        let report = enricher
            .enrich(&document_id, &mut chunks, fetcher, deadline)
            .await;
        stats.images_attached = report.images_attached;
        stats.images_failed = report.images_failed();
        stats.enrich_duration_ms = enrich_start.elapsed().as_millis() as u64;
        diagnostics = report.diagnostics;
    } else {
        debug!("Multimodal enrichment disabled; images left as placeholders");
    }

    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    info!(
        "Parse complete: {} chunks, {}/{} images, {}ms total",
        stats.chunks, stats.images_attached, stats.images_found, stats.total_duration_ms
    );

    Ok(ParseOutput {
        document_id,
        format,
        chunks,
        diagnostics,
        stats,
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Await `fut`, failing with `DeadlineExceeded` if `deadline` passes first.
async fn within<F: Future>(
    deadline: Option<Instant>,
    started: StdInstant,
    stage: &str,
    fut: F,
) -> Result<F::Output, DocParseError> {
    match deadline {
        None => Ok(fut.await),
        Some(at) => timeout_at(at, fut).await.map_err(|_| {
            warn!("Deadline expired while {}", stage);
            DocParseError::DeadlineExceeded {
                stage: stage.to_string(),
                elapsed_ms: started.elapsed().as_millis() as u64,
            }
        }),
    }
}

/// Wire up storage, OCR, and captioning from the config. Injected
/// collaborators win over configured ones.
fn build_enricher(config: &ParseConfig) -> Result<Enricher, DocParseError> {
    let store = match config.object_store {
        Some(ref store) => Arc::clone(store),
        None => storage::from_config(&config.storage, config.download_timeout_secs)?,
    };

    let wants_vlm_ocr = config.ocr_engine.is_none() && config.ocr_backend == OcrBackend::VisionModel;
    let wants_vlm_caption = config.captioner.is_none() && config.vlm.caption;
    let provider = if wants_vlm_ocr || wants_vlm_caption {
        match resolve_provider(config) {
            Ok(provider) => Some(provider),
            Err(e) => {
                warn!("Vision model unavailable, captions and VLM OCR disabled: {}", e);
                None
            }
        }
    } else {
        None
    };
    let settings = VisionSettings::from_config(config);

    let ocr: Option<Arc<dyn OcrEngine>> = match config.ocr_engine {
        Some(ref engine) => Some(Arc::clone(engine)),
        None => match config.ocr_backend {
            OcrBackend::Engine => Some(Arc::new(
                CommandOcr::default().with_timeout(Duration::from_secs(config.api_timeout_secs)),
            )),
            OcrBackend::VisionModel => provider.as_ref().map(|p| {
                Arc::new(VlmOcr::new(
                    Arc::clone(p),
                    config.vlm.ocr_prompt.clone(),
                    settings.clone(),
                )) as Arc<dyn OcrEngine>
            }),
            OcrBackend::Disabled => None,
        },
    };

    let captioner: Option<Arc<dyn ImageCaptioner>> = match config.captioner {
        Some(ref captioner) => Some(Arc::clone(captioner)),
        None if config.vlm.caption => provider.as_ref().map(|p| {
            Arc::new(VlmCaptioner::new(
                Arc::clone(p),
                config.vlm.caption_prompt.clone(),
                settings.clone(),
            )) as Arc<dyn ImageCaptioner>
        }),
        None => None,
    };

    Ok(Enricher {
        store,
        ocr,
        captioner,
        progress: config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback)),
        concurrency: config.concurrency,
        path_prefix: config.storage.path_prefix.clone(),
    })
}

/// Instantiate a named provider with the given model.
fn create_vision_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, String> {
    ProviderFactory::create_llm_provider(provider_name, model)
        .map_err(|e| format!("provider '{provider_name}': {e}"))
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.vlm.provider`), API key read from
///    the provider's usual environment variable.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`),
///    both set.
/// 4. **OpenAI** when `OPENAI_API_KEY` is present.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
fn resolve_provider(config: &ParseConfig) -> Result<Arc<dyn LLMProvider>, String> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.vlm.model.as_deref().unwrap_or(DEFAULT_MODEL);
    if let Some(ref name) = config.vlm.provider {
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) = ProviderFactory::from_env().map_err(|e| {
        format!(
            "no LLM provider could be auto-detected from environment \
             (set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider): {e}"
        )
    })?;
    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;

    fn local_store_config(dir: &std::path::Path) -> ParseConfig {
        ParseConfig::builder()
            .enable_multimodal(true)
            .storage(StorageConfig {
                endpoint: dir.display().to_string(),
                ..Default::default()
            })
            .vlm(crate::config::VlmConfig {
                caption: false,
                ..Default::default()
            })
            .build()
            .unwrap()
    }

    #[test]
    fn enricher_without_vlm_needs_no_provider() {
        let dir = tempfile::tempdir().unwrap();
        let enricher = build_enricher(&local_store_config(dir.path())).unwrap();
        assert!(enricher.ocr.is_none());
        assert!(enricher.captioner.is_none());
        assert_eq!(enricher.concurrency, 5);
    }

    #[test]
    fn engine_backend_builds_command_ocr() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = local_store_config(dir.path());
        config.ocr_backend = OcrBackend::Engine;
        assert!(build_enricher(&config).unwrap().ocr.is_some());
    }

    #[tokio::test]
    async fn expired_deadline_is_fatal_for_pending_stage() {
        let past = Instant::now() - Duration::from_millis(1);
        let result = within(
            Some(past),
            StdInstant::now(),
            "reading the document",
            std::future::pending::<()>(),
        )
        .await;
        match result {
            Err(DocParseError::DeadlineExceeded { stage, .. }) => {
                assert_eq!(stage, "reading the document")
            }
            other => panic!("expected DeadlineExceeded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_deadline_just_awaits() {
        let v = within(None, StdInstant::now(), "x", async { 7 }).await.unwrap();
        assert_eq!(v, 7);
    }

    #[tokio::test]
    async fn markdown_bytes_round_trip() {
        let config = ParseConfig::builder().chunk_size(40).chunk_overlap(5).build().unwrap();
        let text = "First paragraph of words.\n\nSecond paragraph with more words in it.";
        let out = parse_bytes("doc", text.as_bytes(), Some("a.md"), &config)
            .await
            .unwrap();
        assert_eq!(out.format, crate::reader::FileFormat::Markdown);
        assert_eq!(out.reconstruct(), text);
        assert_eq!(out.stats.chunks, out.chunks.len());
        assert_eq!(out.stats.pages, 1);
    }
}
