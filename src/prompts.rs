//! Prompts for VLM-based image captioning and OCR.
//!
//! Callers can override both via [`crate::config::VlmConfig`]; these
//! constants are used only when no override is provided.

/// Default prompt for captioning a document image.
pub const DEFAULT_CAPTION_PROMPT: &str = r#"You are describing an image extracted from a document so that it can be found by text search.

Rules:
1. Describe what the image shows in one to three plain sentences.
2. Name the kind of image (photo, chart, diagram, table, screenshot, logo, formula).
3. For charts and diagrams, state the subject, axes or components, and the main trend or relationship.
4. Do not transcribe long passages of text; mention only titles and key labels.
5. Output ONLY the description. No preamble, no Markdown fences."#;

/// Default prompt for transcribing the text in a document image.
pub const DEFAULT_OCR_PROMPT: &str = r#"Transcribe all text visible in this image.

Rules:
1. Preserve reading order, line breaks, and the original language.
2. Render tables as GFM pipe tables.
3. Do not describe the image, translate, summarise, or add commentary.
4. If the image contains no text, output nothing.
5. Output ONLY the transcription. No Markdown fences."#;

/// The user-turn text sent alongside the image for a caption request.
pub fn caption_request(alt: &str) -> String {
    if alt.trim().is_empty() {
        "Describe this image.".to_string()
    } else {
        format!("Describe this image. The document labels it: \"{}\"", alt.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caption_request_includes_alt_text() {
        assert_eq!(caption_request("  "), "Describe this image.");
        assert!(caption_request("Figure 2").contains("\"Figure 2\""));
    }
}
