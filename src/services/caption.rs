//! Image captioning through the configured vision model.

use super::{ImageBytes, ImageCaptioner};
use crate::pipeline::llm::{describe_image, VisionSettings};
use crate::prompts::{caption_request, DEFAULT_CAPTION_PROMPT};
use async_trait::async_trait;
use edgequake_llm::LLMProvider;
use std::sync::Arc;

pub struct VlmCaptioner {
    provider: Arc<dyn LLMProvider>,
    prompt: String,
    settings: VisionSettings,
}

impl VlmCaptioner {
    /// `prompt` overrides [`DEFAULT_CAPTION_PROMPT`].
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        prompt: Option<String>,
        settings: VisionSettings,
    ) -> Self {
        Self {
            provider,
            prompt: prompt.unwrap_or_else(|| DEFAULT_CAPTION_PROMPT.to_string()),
            settings,
        }
    }
}

#[async_trait]
impl ImageCaptioner for VlmCaptioner {
    async fn caption(&self, image: &ImageBytes, alt: &str) -> Result<String, String> {
        describe_image(
            &self.provider,
            &self.prompt,
            &caption_request(alt),
            image,
            &self.settings,
        )
        .await
    }
}
