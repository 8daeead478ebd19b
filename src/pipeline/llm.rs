//! VLM interaction: one image plus a prompt in, cleaned text out.
//!
//! Both the vision-model OCR backend and the captioner go through
//! [`describe_image`]; prompt wording lives in [`crate::prompts`] so it can
//! change without touching retry or timeout handling here.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient and frequent under
//! concurrent load. Exponential backoff (`retry_backoff_ms * 2^attempt`)
//! spreads the retries out: with 500 ms base and 3 retries the wait sequence
//! is 500 ms → 1 s → 2 s. A call that exceeds `api_timeout_secs` counts as a
//! failed attempt.

use crate::config::ParseConfig;
use crate::pipeline::encode::to_image_data;
use crate::pipeline::postprocess::clean_vision_text;
use crate::services::ImageBytes;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Call settings shared by every VLM request of one parse.
#[derive(Debug, Clone)]
pub struct VisionSettings {
    pub temperature: f32,
    pub max_tokens: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub api_timeout: Duration,
}

impl VisionSettings {
    pub fn from_config(config: &ParseConfig) -> Self {
        Self {
            temperature: config.vlm.temperature,
            max_tokens: config.vlm.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            api_timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }
}

/// Send `image` to the VLM with `system_prompt` and `user_text`.
///
/// Retries transient failures, then returns the last error message.
pub async fn describe_image(
    provider: &Arc<dyn LLMProvider>,
    system_prompt: &str,
    user_text: &str,
    image: &ImageBytes,
    settings: &VisionSettings,
) -> Result<String, String> {
    let start = Instant::now();
    let messages = vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user_with_images(user_text, vec![to_image_data(image)]),
    ];
    let options = build_options(settings);

    let mut last_err: Option<String> = None;

    for attempt in 0..=settings.max_retries {
        if attempt > 0 {
            let backoff = settings.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "VLM retry {}/{} after {}ms",
                attempt, settings.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match timeout(settings.api_timeout, provider.chat(&messages, Some(&options))).await {
            Ok(Ok(response)) => {
                debug!(
                    "VLM: {} input tokens, {} output tokens, {:?}",
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );
                return Ok(clean_vision_text(&response.content));
            }
            Ok(Err(e)) => {
                let err_msg = e.to_string();
                warn!("VLM attempt {} failed: {}", attempt + 1, err_msg);
                last_err = Some(err_msg);
            }
            Err(_) => {
                let err_msg = format!("timed out after {}s", settings.api_timeout.as_secs());
                warn!("VLM attempt {} {}", attempt + 1, err_msg);
                last_err = Some(err_msg);
            }
        }
    }

    Err(format!(
        "failed after {} retries: {}",
        settings.max_retries,
        last_err.unwrap_or_else(|| "unknown error".to_string())
    ))
}

/// Build `CompletionOptions` from the call settings.
fn build_options(settings: &VisionSettings) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(settings.temperature),
        max_tokens: Some(settings.max_tokens),
        ..Default::default()
    }
}
