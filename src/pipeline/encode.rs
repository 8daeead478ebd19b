//! Image encoding for the VLM API and for embedded PDF images.
//!
//! VLM APIs accept images as base64 data embedded in the JSON request body.
//! Images pulled out of a PDF arrive as decoded bitmaps and are re-encoded as
//! PNG so every embedded image has a stable, sniffable format.

use crate::services::ImageBytes;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Wrap resolved image bytes as a base64 `ImageData` attachment.
///
/// `detail: "high"` lets GPT-4-class models use the full tile budget, which
/// small chart labels and table cells need.
pub fn to_image_data(image: &ImageBytes) -> ImageData {
    let b64 = STANDARD.encode(&image.data);
    debug!("Encoded {} → {} bytes base64", image.mime_type, b64.len());
    ImageData::new(b64, image.mime_type.clone()).with_detail("high")
}

/// Encode a bitmap as PNG bytes.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}
