//! Readers for Markdown and plain text.
//!
//! Neither looks for tables or images: Markdown markup passes through intact
//! and the segmenter finds it in the linearized stream.

use super::{DocumentReader, FileFormat};
use crate::config::ParseConfig;
use crate::error::DocParseError;
use crate::model::{Document, Fragment, Page};

fn decode(data: &[u8]) -> Result<String, DocParseError> {
    let text = std::str::from_utf8(data).map_err(|e| DocParseError::Unreadable {
        detail: format!("invalid UTF-8: {e}"),
    })?;
    let text = text.strip_prefix('\u{FEFF}').unwrap_or(text);
    Ok(text.replace("\r\n", "\n"))
}

/// A Markdown file is a single page holding a single text fragment.
pub struct MarkdownReader;

impl DocumentReader for MarkdownReader {
    fn formats(&self) -> &[FileFormat] {
        &[FileFormat::Markdown]
    }

    fn read(&self, data: &[u8], _config: &ParseConfig) -> Result<Document, DocParseError> {
        let text = decode(data)?;
        Ok(Document::from_pages(vec![Page::new(
            0,
            vec![Fragment::text(text, 0)],
        )]))
    }
}

/// Plain text, paginated on form feeds (`\x0c`), the convention of
/// `pdftotext` and line printers.
pub struct PlainTextReader;

impl DocumentReader for PlainTextReader {
    fn formats(&self) -> &[FileFormat] {
        &[FileFormat::PlainText]
    }

    fn read(&self, data: &[u8], _config: &ParseConfig) -> Result<Document, DocParseError> {
        let text = decode(data)?;
        let text = text.strip_suffix('\x0c').unwrap_or(&text);
        let pages = text
            .split('\x0c')
            .enumerate()
            .map(|(index, page)| Page::new(index, vec![Fragment::text(page, 0)]))
            .collect();
        Ok(Document::from_pages(pages))
    }
}
