//! PDF reader backed by pdfium.
//!
//! Per page: one text fragment with the page's extracted text, then one image
//! fragment per embedded image object. Image bitmaps are re-encoded as PNG
//! and stored in [`Document::embedded_images`] under a synthetic reference
//! (`pdf-image/{page}-{k}.png`) that the enrichment stage resolves first.
//!
//! pdfium holds thread-local state and blocks; the pipeline calls
//! [`DocumentReader::read`] from `spawn_blocking`. The shared library is
//! bound at runtime from `PDFIUM_LIB_PATH` when set, otherwise from the
//! system library path.

use super::{DocumentReader, FileFormat};
use crate::config::ParseConfig;
use crate::error::DocParseError;
use crate::model::{Document, Fragment, Page};
use crate::pipeline::encode::encode_png;
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, info, warn};

pub struct PdfReader;

fn bind_pdfium() -> Result<Pdfium, DocParseError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(&path),
        _ => Pdfium::bind_to_system_library(),
    };
    bindings
        .map(Pdfium::new)
        .map_err(|e| DocParseError::Unreadable {
            detail: format!("pdfium library unavailable: {e}"),
        })
}

/// Reference under which an embedded image is stored.
pub fn embedded_image_ref(page: usize, k: usize) -> String {
    format!("pdf-image/{page}-{k}.png")
}

/// Store `bitmap` as PNG and add its image fragment. An image that cannot be
/// re-encoded is skipped with a warning; it never fails the page.
fn embed_image(
    document: &mut Document,
    fragments: &mut Vec<Fragment>,
    page: usize,
    k: usize,
    bitmap: &DynamicImage,
) -> bool {
    let png = match encode_png(bitmap) {
        Ok(png) => png,
        Err(e) => {
            warn!("Page {}: image {} not re-encodable: {}", page + 1, k, e);
            return false;
        }
    };
    let reference = embedded_image_ref(page, k);
    fragments.push(Fragment::image(reference.clone(), "", k));
    document.embedded_images.insert(reference, png);
    true
}

impl DocumentReader for PdfReader {
    fn formats(&self) -> &[FileFormat] {
        &[FileFormat::Pdf]
    }

    fn read(&self, data: &[u8], config: &ParseConfig) -> Result<Document, DocParseError> {
        let pdfium = bind_pdfium()?;
        let password = config.password.as_deref();

        let pdf = pdfium
            .load_pdf_from_byte_slice(data, password)
            .map_err(|e| {
                let err_str = format!("{:?}", e);
                if err_str.contains("Password") || err_str.contains("password") {
                    DocParseError::PasswordRequired
                } else {
                    DocParseError::CorruptDocument { detail: err_str }
                }
            })?;

        let pages = pdf.pages();
        info!("PDF loaded: {} pages", pages.len());

        let mut document = Document::default();
        for (index, page) in pages.iter().enumerate() {
            let mut fragments = Vec::new();
            match page.text() {
                Ok(text) => fragments.push(Fragment::text(text.all(), 0)),
                Err(e) => warn!("Page {}: text extraction failed: {:?}", index + 1, e),
            }

            let mut k = 0;
            for object in page.objects().iter() {
                let Some(image_object) = object.as_image_object() else {
                    continue;
                };
                let bitmap = match image_object.get_raw_image() {
                    Ok(bitmap) => bitmap,
                    Err(e) => {
                        warn!("Page {}: image {} unreadable: {:?}", index + 1, k, e);
                        continue;
                    }
                };
                if embed_image(&mut document, &mut fragments, index, k, &bitmap) {
                    k += 1;
                }
            }

            debug!("Page {}: {} fragments ({} images)", index + 1, fragments.len(), k);
            document.pages.push(Page::new(index, fragments));
        }

        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_refs_match_placeholder_grammar() {
        let reference = embedded_image_ref(2, 0);
        assert_eq!(reference, "pdf-image/2-0.png");
        assert!(!reference.contains(char::is_whitespace));
        assert!(!reference.contains(')'));
    }

    #[test]
    fn embeds_encodable_image() {
        let mut doc = Document::default();
        let mut fragments = Vec::new();
        let img = DynamicImage::new_rgb8(2, 2);
        assert!(embed_image(&mut doc, &mut fragments, 0, 0, &img));
        assert_eq!(fragments, vec![Fragment::image("pdf-image/0-0.png", "", 0)]);
        assert!(doc.embedded_images.contains_key("pdf-image/0-0.png"));
    }

    #[test]
    fn unencodable_image_is_skipped_not_fatal() {
        let mut doc = Document::default();
        let mut fragments = vec![Fragment::text("page text", 0)];
        // PNG has no 32-bit float colour type
        let img = DynamicImage::new_rgb32f(2, 2);
        assert!(!embed_image(&mut doc, &mut fragments, 3, 0, &img));
        assert_eq!(fragments.len(), 1);
        assert!(doc.embedded_images.is_empty());
    }
}
