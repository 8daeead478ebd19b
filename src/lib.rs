//! # edgequake-docparse
//!
//! Turn documents into ordered, size-bounded, retrieval-ready chunks, with
//! embedded images stored and described by OCR and a vision model.
//!
//! ## Why this crate?
//!
//! Fixed-window splitters cut tables in half and separate figures from the
//! text that refers to them. This crate first finds the indivisible parts of
//! a document (tables and image placeholders) and then packs chunks around
//! them, so a chunk never contains half a table and every image reference
//! stays resolvable.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Document (PDF / Markdown / text)
//!  │
//!  ├─ 1. Input      path, URL, or bytes → document bytes
//!  ├─ 2. Read       per-format reader → pages of fragments (spawn_blocking)
//!  ├─ 3. Linearize  pages → one stream with page-break markers
//!  ├─ 4. Segment    stream → text / table / image units
//!  ├─ 5. Assemble   units → chunks with overlap, atomic units never split
//!  └─ 6. Enrich     per image: fetch → store → OCR + caption (bounded, concurrent)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_docparse::{parse, DocumentSource, ParseConfig, StorageConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ParseConfig::builder()
//!         .chunk_size(500)
//!         .chunk_overlap(50)
//!         .enable_multimodal(true)
//!         .storage(StorageConfig {
//!             endpoint: "http://localhost:9000".into(),
//!             bucket: "doc-images".into(),
//!             ..Default::default()
//!         })
//!         .build()?;
//!     let output = parse("manual-v2", DocumentSource::Path("manual.pdf".into()), &config).await?;
//!     for chunk in &output.chunks {
//!         println!("#{}: {} chars, {} images", chunk.seq, chunk.content.len(), chunk.images.len());
//!     }
//!     for d in &output.diagnostics {
//!         eprintln!("chunk {}: {}", d.chunk_seq, d.error);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docparse` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `pdf`   | on      | PDF reader through pdfium (bound at runtime) |
//!
//! Disable both when using only the Markdown / text pipeline:
//! ```toml
//! edgequake-docparse = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod model;
pub mod output;
pub mod parse;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod reader;
pub mod services;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{OcrBackend, ParseConfig, ParseConfigBuilder, StorageConfig, VlmConfig};
pub use error::{DocParseError, ImageDiagnostic, ImageError};
pub use model::{
    Chunk, ContentUnit, Document, Fragment, ImageInfo, ImagePlaceholder, ImageRef, ImageSource,
    Page,
};
pub use output::{ParseOutput, ParseStats};
pub use parse::{parse, parse_bytes, parse_sync, parse_with_deadline, parse_with_registry};
pub use pipeline::input::DocumentSource;
pub use pipeline::linearize::PAGE_BREAK;
pub use progress::{EnrichmentProgressCallback, NoopProgressCallback, ProgressCallback};
pub use reader::{DocumentReader, FileFormat, ReaderRegistry};
pub use services::{ImageBytes, ImageCaptioner, ObjectStorage, OcrEngine};
