//! Data model shared by every pipeline stage.
//!
//! All values are created fresh for one parse call. Nothing here is mutated
//! after it is handed to the next stage, with one exception: a [`Chunk`]'s
//! `images` list, which the enrichment stage fills exactly once.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

// ── Reader output ────────────────────────────────────────────────────────

/// One independently-extracted piece of a page.
///
/// `order` is the reader's source-order hint. The linearizer sorts by it
/// within each fragment category, never across categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Text { text: String, order: usize },
    Table { markup: String, order: usize },
    Image { reference: String, alt: String, order: usize },
}

impl Fragment {
    pub fn text(text: impl Into<String>, order: usize) -> Self {
        Fragment::Text { text: text.into(), order }
    }

    pub fn table(markup: impl Into<String>, order: usize) -> Self {
        Fragment::Table { markup: markup.into(), order }
    }

    pub fn image(reference: impl Into<String>, alt: impl Into<String>, order: usize) -> Self {
        Fragment::Image {
            reference: reference.into(),
            alt: alt.into(),
            order,
        }
    }

    pub fn order(&self) -> usize {
        match self {
            Fragment::Text { order, .. }
            | Fragment::Table { order, .. }
            | Fragment::Image { order, .. } => *order,
        }
    }
}

/// A single page: 0-based index plus its raw fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub index: usize,
    pub fragments: Vec<Fragment>,
}

impl Page {
    pub fn new(index: usize, fragments: Vec<Fragment>) -> Self {
        Self { index, fragments }
    }
}

/// A parsed document: ordered pages plus binary images the reader pulled out
/// of the file, keyed by the reference its image fragments use.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub pages: Vec<Page>,
    pub embedded_images: HashMap<String, Vec<u8>>,
}

impl Document {
    pub fn from_pages(pages: Vec<Page>) -> Self {
        Self {
            pages,
            embedded_images: HashMap::new(),
        }
    }
}

// ── Segmenter output ─────────────────────────────────────────────────────

/// A Markdown image placeholder `![alt](reference)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePlaceholder {
    /// Exact source text of the placeholder.
    pub raw: String,
    pub alt: String,
    pub reference: String,
}

/// One unit of linearized content.
///
/// `Table` and `Image` are atomic: no stage after the segmenter ever splits
/// them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ContentUnit {
    Text(String),
    Table(String),
    Image(ImagePlaceholder),
}

impl ContentUnit {
    /// The exact source text of the unit.
    pub fn raw(&self) -> &str {
        match self {
            ContentUnit::Text(s) | ContentUnit::Table(s) => s,
            ContentUnit::Image(p) => &p.raw,
        }
    }

    pub fn is_atomic(&self) -> bool {
        !matches!(self, ContentUnit::Text(_))
    }

    /// Length in `char`s, the unit every size budget is measured in.
    pub fn char_len(&self) -> usize {
        self.raw().chars().count()
    }
}

// ── Assembler / enrichment output ────────────────────────────────────────

/// A bounded-size, ordered run of content units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Rank among all chunks of the document, starting at 0 with no gaps.
    pub seq: usize,
    /// Rendered text: the overlap copy followed by every unit in `units`.
    pub content: String,
    /// Byte offset of `content` in the linearized document.
    pub start_offset: usize,
    /// Byte offset one past the end of `content` in the linearized document.
    pub end_offset: usize,
    /// Number of leading `char`s of `content` copied from the previous chunk.
    pub overlap_len: usize,
    /// Units newly placed in this chunk, in document order.
    pub units: Vec<ContentUnit>,
    /// Images resolved by the enrichment stage, in placeholder order.
    pub images: Vec<ImageInfo>,
}

impl Chunk {
    /// Image placeholders of this chunk, in order of appearance.
    pub fn placeholders(&self) -> impl Iterator<Item = &ImagePlaceholder> {
        self.units.iter().filter_map(|u| match u {
            ContentUnit::Image(p) => Some(p),
            _ => None,
        })
    }
}

/// Where an image's original bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Bytes extracted by the reader into [`Document::embedded_images`].
    Embedded(String),
    /// `data:<mime>;base64,<payload>` inline URI.
    DataUri(String),
    /// A file on the local filesystem.
    LocalPath(PathBuf),
    /// An `http://` or `https://` URL.
    Remote(String),
}

/// An image placeholder resolved to its source, tagged with its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Stable id `"{seq}-{index}"`.
    pub id: String,
    /// Owning chunk's sequence number.
    pub seq: usize,
    /// Position among the owning chunk's placeholders.
    pub index: usize,
    pub reference: String,
    pub alt: String,
    pub source: ImageSource,
}

/// Persistent metadata for one resolved image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    /// The [`ImageRef::id`] this entry resolves.
    pub id: String,
    /// The placeholder reference as it appears in chunk text.
    pub original_ref: String,
    pub url: String,
    #[serde(default)]
    pub ocr_text: String,
    #[serde(default)]
    pub caption: String,
}
