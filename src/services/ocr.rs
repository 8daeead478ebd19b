//! OCR backends: a local engine CLI and the configured vision model.

use super::{ImageBytes, OcrEngine};
use crate::pipeline::llm::{describe_image, VisionSettings};
use crate::prompts::DEFAULT_OCR_PROMPT;
use async_trait::async_trait;
use edgequake_llm::LLMProvider;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

// ── Engine CLI ───────────────────────────────────────────────────────────

/// Runs an OCR command that reads the image on stdin and prints text on
/// stdout. Defaults to `tesseract stdin stdout`.
#[derive(Debug, Clone)]
pub struct CommandOcr {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl Default for CommandOcr {
    fn default() -> Self {
        Self {
            program: "tesseract".into(),
            args: vec!["stdin".into(), "stdout".into()],
            timeout: Duration::from_secs(60),
        }
    }
}

impl CommandOcr {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            ..Default::default()
        }
    }

    /// Restrict tesseract to the given language pack(s), e.g. `"eng+deu"`.
    pub fn with_language(mut self, lang: impl Into<String>) -> Self {
        self.args.push("-l".into());
        self.args.push(lang.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl OcrEngine for CommandOcr {
    async fn recognize(&self, image: &ImageBytes) -> Result<String, String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("spawn {}: {e}", self.program))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| format!("{}: stdin unavailable", self.program))?;
        let data = image.data.clone();
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(&data).await;
            drop(stdin);
            result
        });

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| format!("{} timed out after {:?}", self.program, self.timeout))?
            .map_err(|e| format!("{}: {e}", self.program))?;
        // A broken pipe here just means the engine exited early; its status says why.
        let _ = writer.await;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            ));
        }
        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!("{} recognised {} chars", self.program, text.chars().count());
        Ok(text)
    }
}

// ── Vision model ─────────────────────────────────────────────────────────

/// Asks the vision model to transcribe the image.
pub struct VlmOcr {
    provider: Arc<dyn LLMProvider>,
    prompt: String,
    settings: VisionSettings,
}

impl VlmOcr {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        prompt: Option<String>,
        settings: VisionSettings,
    ) -> Self {
        Self {
            provider,
            prompt: prompt.unwrap_or_else(|| DEFAULT_OCR_PROMPT.to_string()),
            settings,
        }
    }
}

#[async_trait]
impl OcrEngine for VlmOcr {
    async fn recognize(&self, image: &ImageBytes) -> Result<String, String> {
        describe_image(
            &self.provider,
            &self.prompt,
            "Transcribe the text in this image.",
            image,
            &self.settings,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> ImageBytes {
        ImageBytes {
            data: b"hello from stdin".to_vec(),
            mime_type: "image/png".into(),
        }
    }

    #[test]
    fn language_is_appended() {
        let ocr = CommandOcr::default().with_language("eng");
        assert_eq!(ocr.args, vec!["stdin", "stdout", "-l", "eng"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_reads_stdin_and_returns_stdout() {
        // `cat` echoes the bytes back, standing in for an OCR engine
        let ocr = CommandOcr::new("cat", vec![]);
        assert_eq!(ocr.recognize(&image()).await.unwrap(), "hello from stdin");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_command_is_an_error() {
        let ocr = CommandOcr::new("false", vec![]);
        assert!(ocr.recognize(&image()).await.is_err());
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let ocr = CommandOcr::new("docparse-no-such-ocr-binary", vec![]);
        let err = ocr.recognize(&image()).await.unwrap_err();
        assert!(err.contains("spawn"));
    }
}
