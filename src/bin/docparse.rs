//! CLI binary for edgequake-docparse.
//!
//! A thin shim over the library crate that maps CLI flags to `ParseConfig`
//! and prints the resulting chunks.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_docparse::{
    parse, DocumentSource, EnrichmentProgressCallback, OcrBackend, ParseConfig, ParseOutput,
    ProgressCallback, StorageConfig, VlmConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar over the document's images plus one
/// log line per image. Images finish out of order, so start times are kept
/// per image id.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<String, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Parsing");
        bar.set_message("Reading document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, image_id: &str) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(image_id))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl EnrichmentProgressCallback for CliProgressCallback {
    fn on_enrichment_start(&self, total_images: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_length(total_images as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Enriching");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Enriching {total_images} images…"))
        ));
    }

    fn on_image_start(&self, image_id: &str, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(image_id.to_string(), Instant::now());
        }
        self.bar.set_message(format!("image {image_id}"));
    }

    fn on_image_complete(&self, image_id: &str, _total: usize) {
        let secs = self.elapsed_secs(image_id);
        self.bar.println(format!(
            "  {} Image {:<8}  {}",
            green("✓"),
            image_id,
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_image_error(&self, image_id: &str, _total: usize, error: &str) {
        let secs = self.elapsed_secs(image_id);
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Image {:<8}  {}  {}",
            red("✗"),
            image_id,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_enrichment_complete(&self, total_images: usize, attached: usize) {
        let failed = total_images.saturating_sub(attached);
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!("{} {} images attached", green("✔"), bold(&attached.to_string()));
        } else {
            eprintln!(
                "{} {}/{} images attached  ({} failed)",
                if failed == total_images { red("✘") } else { cyan("⚠") },
                bold(&attached.to_string()),
                total_images,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Chunk a Markdown file (text output on stdout)
  docparse notes.md

  # Smaller chunks with more overlap, as JSON
  docparse --chunk-size 300 --chunk-overlap 60 --json manual.pdf -o manual.json

  # Store images in MinIO, OCR with tesseract, caption with the default VLM
  docparse --multimodal --storage-endpoint http://localhost:9000 --bucket images \
           --ocr engine report.pdf

  # Store images in a local directory, OCR and caption with a vision model
  docparse --multimodal --storage-endpoint ./images --ocr vlm --model gpt-4.1-mini paper.pdf

  # Give up on unfinished images after 30 seconds
  docparse --multimodal --storage-endpoint ./images --deadline 30 big.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (default: system library path)
"#;

/// Split documents into retrieval-ready chunks with image OCR and captions.
#[derive(Parser, Debug)]
#[command(
    name = "docparse",
    version,
    about = "Split documents into retrieval-ready chunks with image OCR and captions",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file path (PDF, Markdown, text) or HTTP/HTTPS URL.
    input: String,

    /// Write output to this file instead of stdout.
    #[arg(short, long, env = "DOCPARSE_OUTPUT")]
    output: Option<PathBuf>,

    /// Document id used in image keys. Default: the input file stem.
    #[arg(long, env = "DOCPARSE_DOCUMENT_ID")]
    document_id: Option<String>,

    /// Maximum chunk size in characters.
    #[arg(long, env = "DOCPARSE_CHUNK_SIZE", default_value_t = 512)]
    chunk_size: usize,

    /// Characters repeated from the end of one chunk at the start of the next.
    #[arg(long, env = "DOCPARSE_CHUNK_OVERLAP", default_value_t = 50)]
    chunk_overlap: usize,

    /// Resolve, store, OCR, and caption images.
    #[arg(long, env = "DOCPARSE_MULTIMODAL")]
    multimodal: bool,

    /// Object store endpoint (http(s)://…) or local directory.
    #[arg(long, env = "DOCPARSE_STORAGE_ENDPOINT")]
    storage_endpoint: Option<String>,

    /// Bucket (HTTP store) or sub-directory (local store).
    #[arg(long, env = "DOCPARSE_BUCKET", default_value = "")]
    bucket: String,

    /// Bearer token for the object store.
    #[arg(long, env = "DOCPARSE_STORAGE_TOKEN", hide_env_values = true)]
    storage_token: Option<String>,

    /// Base of the returned image URLs. Default: endpoint/bucket.
    #[arg(long, env = "DOCPARSE_PUBLIC_URL")]
    public_url: Option<String>,

    /// Key prefix for stored images.
    #[arg(long, env = "DOCPARSE_PATH_PREFIX", default_value = "")]
    path_prefix: String,

    /// OCR backend.
    #[arg(long, env = "DOCPARSE_OCR", value_enum, default_value = "disabled")]
    ocr: OcrArg,

    /// Do not caption images.
    #[arg(long, env = "DOCPARSE_NO_CAPTION")]
    no_caption: bool,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// Vision model ID (e.g. gpt-4.1-nano, gpt-4.1-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Images processed at once.
    #[arg(short, long, env = "DOCPARSE_CONCURRENCY", default_value_t = 5)]
    concurrency: usize,

    /// Overall time budget in seconds.
    #[arg(long, env = "DOCPARSE_DEADLINE")]
    deadline: Option<u64>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "DOCPARSE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Directory that relative image paths are resolved against.
    #[arg(long, env = "DOCPARSE_IMAGE_BASE_DIR")]
    image_base_dir: Option<PathBuf>,

    /// Retries per VLM call.
    #[arg(long, env = "DOCPARSE_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-VLM-call timeout in seconds.
    #[arg(long, env = "DOCPARSE_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "DOCPARSE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Output structured JSON (ParseOutput) instead of text.
    #[arg(long, env = "DOCPARSE_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCPARSE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCPARSE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCPARSE_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OcrArg {
    Engine,
    Vlm,
    Disabled,
}

impl From<OcrArg> for OcrBackend {
    fn from(v: OcrArg) -> Self {
        match v {
            OcrArg::Engine => OcrBackend::Engine,
            OcrArg::Vlm => OcrBackend::VisionModel,
            OcrArg::Disabled => OcrBackend::Disabled,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; --verbose always wins.
    let show_progress = cli.multimodal && !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn EnrichmentProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Run parse ────────────────────────────────────────────────────────
    let document_id = cli
        .document_id
        .clone()
        .unwrap_or_else(|| default_document_id(&cli.input));
    let output = parse(document_id, DocumentSource::from_arg(&cli.input), &config)
        .await
        .context("Parse failed")?;

    let rendered = if cli.json {
        serde_json::to_string_pretty(&output).context("Failed to serialise output")?
    } else {
        render_text(&output)
    };

    if let Some(ref path) = cli.output {
        write_atomic(path, &rendered).await?;
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(rendered.as_bytes())
            .context("Failed to write to stdout")?;
        if !rendered.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet {
        let s = &output.stats;
        eprintln!(
            "{}  {} pages → {} chunks  {}/{} images  {}ms{}",
            if output.diagnostics.is_empty() { green("✔") } else { cyan("⚠") },
            s.pages,
            s.chunks,
            s.images_attached,
            s.images_found,
            s.total_duration_ms,
            cli.output
                .as_ref()
                .map(|p| format!("  →  {}", bold(&p.display().to_string())))
                .unwrap_or_default(),
        );
        for d in &output.diagnostics {
            eprintln!("   {} {}", dim(&format!("chunk {:>3}", d.chunk_seq)), d.error);
        }
    }

    Ok(())
}

/// Map CLI args to `ParseConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ParseConfig> {
    let mut builder = ParseConfig::builder()
        .chunk_size(cli.chunk_size)
        .chunk_overlap(cli.chunk_overlap)
        .enable_multimodal(cli.multimodal)
        .storage(StorageConfig {
            endpoint: cli.storage_endpoint.clone().unwrap_or_default(),
            bucket: cli.bucket.clone(),
            token: cli.storage_token.clone(),
            public_base_url: cli.public_url.clone(),
            path_prefix: cli.path_prefix.clone(),
        })
        .vlm(VlmConfig {
            provider: cli.provider.clone(),
            model: cli.model.clone(),
            caption: !cli.no_caption,
            ..Default::default()
        })
        .ocr_backend(cli.ocr.into())
        .concurrency(cli.concurrency)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(secs) = cli.deadline {
        builder = builder.deadline(Duration::from_secs(secs));
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(ref dir) = cli.image_base_dir {
        builder = builder.image_base_dir(dir.clone());
    } else if !edgequake_docparse::pipeline::input::is_url(&cli.input) {
        // relative image links in a local document point next to it
        if let Some(parent) = Path::new(&cli.input).parent() {
            builder = builder.image_base_dir(parent.to_path_buf());
        }
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn default_document_id(input: &str) -> String {
    let trimmed = input.trim_end_matches('/');
    let name = trimmed.rsplit('/').next().unwrap_or(trimmed);
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string())
}

/// One block per chunk: a header line, the content, then its images.
fn render_text(output: &ParseOutput) -> String {
    let mut out = String::new();
    for chunk in &output.chunks {
        out.push_str(&format!(
            "──── chunk {} [{}..{}] ────\n",
            chunk.seq, chunk.start_offset, chunk.end_offset
        ));
        out.push_str(&chunk.content);
        out.push('\n');
        for image in &chunk.images {
            out.push_str(&format!("  [image {}] {}\n", image.id, image.url));
            if !image.caption.is_empty() {
                out.push_str(&format!("    caption: {}\n", image.caption));
            }
            if !image.ocr_text.is_empty() {
                out.push_str(&format!("    ocr: {}\n", image.ocr_text.replace('\n', " ")));
            }
        }
        out.push('\n');
    }
    out
}

/// Write to a temp file next to `path`, then rename.
async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, contents)
        .await
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
