//! Output types returned by the `parse*` entry points.

use crate::error::ImageDiagnostic;
use crate::model::Chunk;
use crate::reader::FileFormat;
use serde::{Deserialize, Serialize};

/// The result of parsing one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseOutput {
    /// Caller-supplied identifier, echoed back and used in upload keys.
    pub document_id: String,
    /// Format the document was read as.
    pub format: FileFormat,
    /// Chunks in document order; `chunks[i].seq == i`.
    pub chunks: Vec<Chunk>,
    /// Image-level failures absorbed during enrichment, in document order.
    pub diagnostics: Vec<ImageDiagnostic>,
    pub stats: ParseStats,
}

impl ParseOutput {
    /// Concatenated content of every chunk with the overlap copies removed:
    /// the linearized document as the chunker saw it.
    pub fn reconstruct(&self) -> String {
        self.chunks
            .iter()
            .flat_map(|c| c.units.iter().map(|u| u.raw()))
            .collect()
    }
}

/// Aggregate statistics for one parse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseStats {
    pub pages: usize,
    /// Content units produced by the segmenter.
    pub units: usize,
    pub chunks: usize,
    /// Image placeholders across all chunks.
    pub images_found: usize,
    /// Images stored and attached to their chunk.
    pub images_attached: usize,
    /// Images omitted from their chunk (fetch, upload, or timeout).
    pub images_failed: usize,
    pub total_duration_ms: u64,
    /// Time spent in the enrichment stage; 0 when it was skipped.
    pub enrich_duration_ms: u64,
}
