//! Format readers: document bytes → [`Document`] of pages and fragments.
//!
//! A reader only extracts; ordering, segmentation, and chunking happen later
//! in the pipeline and are identical for every format. Readers are looked up
//! through a [`ReaderRegistry`] keyed by [`FileFormat`], so adding a format is
//! one `register` call.

#[cfg(feature = "pdf")]
pub mod pdf;
pub mod text;

#[cfg(feature = "pdf")]
pub use pdf::PdfReader;
pub use text::{MarkdownReader, PlainTextReader};

use crate::config::ParseConfig;
use crate::error::DocParseError;
use crate::model::Document;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Document formats the pipeline knows how to detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    Pdf,
    Markdown,
    PlainText,
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileFormat::Pdf => "pdf",
            FileFormat::Markdown => "markdown",
            FileFormat::PlainText => "plain_text",
        })
    }
}

/// Detect the format from magic bytes, then from the file extension.
pub fn detect_format(data: &[u8], file_name: Option<&str>) -> Result<FileFormat, DocParseError> {
    if data.starts_with(b"%PDF") {
        return Ok(FileFormat::Pdf);
    }
    let ext = file_name
        .and_then(|n| Path::new(n).extension())
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    match ext.as_deref() {
        Some("pdf") => Err(DocParseError::CorruptDocument {
            detail: "file has a .pdf extension but no %PDF header".into(),
        }),
        Some("md" | "markdown" | "mdown" | "mkd") => Ok(FileFormat::Markdown),
        Some("txt" | "text") => Ok(FileFormat::PlainText),
        Some(other) => Err(DocParseError::UnsupportedFormat {
            detail: format!("extension '{other}'"),
        }),
        None => Err(DocParseError::UnsupportedFormat {
            detail: "no recognisable header or file extension".into(),
        }),
    }
}

/// Extracts pages and fragments from one or more formats.
///
/// `read` is synchronous and may block; the pipeline calls it from
/// `spawn_blocking`.
pub trait DocumentReader: Send + Sync {
    /// Formats this reader handles.
    fn formats(&self) -> &[FileFormat];

    fn read(&self, data: &[u8], config: &ParseConfig) -> Result<Document, DocParseError>;
}

/// Maps each format to the reader responsible for it.
pub struct ReaderRegistry {
    readers: HashMap<FileFormat, Arc<dyn DocumentReader>>,
}

impl ReaderRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            readers: HashMap::new(),
        }
    }

    /// Markdown and plain text, plus PDF when the `pdf` feature is on.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(MarkdownReader);
        registry.register(PlainTextReader);
        #[cfg(feature = "pdf")]
        registry.register(PdfReader);
        registry
    }

    /// Register a reader for every format it declares, replacing any
    /// previous reader for those formats.
    pub fn register<R: DocumentReader + 'static>(&mut self, reader: R) {
        let reader: Arc<dyn DocumentReader> = Arc::new(reader);
        for format in reader.formats() {
            debug!("Registered reader for {}", format);
            self.readers.insert(*format, Arc::clone(&reader));
        }
    }

    #[must_use]
    pub fn get(&self, format: FileFormat) -> Option<Arc<dyn DocumentReader>> {
        self.readers.get(&format).cloned()
    }

    /// The reader for `format`, or `UnsupportedFormat`.
    pub fn require(&self, format: FileFormat) -> Result<Arc<dyn DocumentReader>, DocParseError> {
        self.get(format).ok_or_else(|| DocParseError::UnsupportedFormat {
            detail: format!("no reader registered for {format}"),
        })
    }
}

impl Default for ReaderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Fragment, Page};

    #[test]
    fn magic_bytes_win_over_extension() {
        assert_eq!(
            detect_format(b"%PDF-1.7 ...", Some("notes.md")).unwrap(),
            FileFormat::Pdf
        );
    }

    #[test]
    fn extension_fallback() {
        assert_eq!(detect_format(b"# T", Some("A.MD")).unwrap(), FileFormat::Markdown);
        assert_eq!(detect_format(b"x", Some("a.txt")).unwrap(), FileFormat::PlainText);
    }

    #[test]
    fn unknown_formats_are_fatal() {
        assert!(matches!(
            detect_format(b"PK\x03\x04", Some("sheet.xlsx")),
            Err(DocParseError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            detect_format(b"hello", None),
            Err(DocParseError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            detect_format(b"<html>", Some("fake.pdf")),
            Err(DocParseError::CorruptDocument { .. })
        ));
    }

    struct UpperReader;

    impl DocumentReader for UpperReader {
        fn formats(&self) -> &[FileFormat] {
            &[FileFormat::PlainText]
        }

        fn read(&self, data: &[u8], _config: &ParseConfig) -> Result<Document, DocParseError> {
            let text = String::from_utf8_lossy(data).to_uppercase();
            Ok(Document::from_pages(vec![Page::new(0, vec![Fragment::text(text, 0)])]))
        }
    }

    #[test]
    fn register_replaces_existing_reader() {
        let mut registry = ReaderRegistry::with_defaults();
        registry.register(UpperReader);
        let doc = registry
            .require(FileFormat::PlainText)
            .unwrap()
            .read(b"abc", &ParseConfig::default())
            .unwrap();
        assert_eq!(doc.pages[0].fragments[0], Fragment::text("ABC", 0));
        assert!(registry.get(FileFormat::Markdown).is_some());
    }

    #[test]
    fn empty_registry_requires_fail() {
        assert!(ReaderRegistry::new().require(FileFormat::Markdown).is_err());
    }
}
