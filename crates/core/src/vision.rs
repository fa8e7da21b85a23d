//! Image-to-Text Transcription
//!
//! Reads a rendered page image with a vision-capable chat model and returns
//! the page as markdown.

use crate::transcription::PageTranscriber;
use anyhow::{Context, Result};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequestArgs, ImageUrlArgs,
    },
};
use async_trait::async_trait;
use std::sync::Arc;

pub const DEFAULT_VISION_MODEL: &str = "gpt-4.1-mini";

const SYSTEM_PROMPT: &str = "You are a highly accurate image transcription assistant. \
Transcribe the content of the given image into well-formatted markdown, preserving the \
structure and layout as much as possible.";

pub const DEFAULT_PROMPT: &str =
    "Please transcribe this image as accurately as possible into a markdown document.";

/// Prompt used when the image is a page of a larger document.
pub fn page_prompt(page: u32) -> String {
    format!(
        "This is page {} of a PDF document. Please transcribe all text accurately, \
         preserving paragraphs, headings, and formatting. Include any relevant text from \
         diagrams, tables, or figures.",
        page
    )
}

/// Removes a `data:image/...;base64,` prefix, leaving the bare base64 payload.
pub fn strip_data_url(image: &str) -> &str {
    if image.contains("data:image/") {
        image.split_once(',').map(|(_, data)| data).unwrap_or("")
    } else {
        image
    }
}

/// Anything that can turn a PNG into text.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VisionClient: Send + Sync {
    /// Transcribes a base64-encoded PNG, optionally guided by `prompt`.
    async fn transcribe_image(&self, image_base64: &str, prompt: Option<String>)
    -> Result<String>;
}

/// A `VisionClient` backed by any OpenAI-compatible chat completions API.
pub struct OpenAIVisionClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAIVisionClient {
    /// Creates a new client.
    ///
    /// # Arguments
    ///
    /// * `config` - API key and base URL for the chat completions service.
    /// * `model` - Vision-capable model identifier (e.g., "gpt-4.1-mini").
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }
}

#[async_trait]
impl VisionClient for OpenAIVisionClient {
    async fn transcribe_image(
        &self,
        image_base64: &str,
        prompt: Option<String>,
    ) -> Result<String> {
        let image_url = format!("data:image/png;base64,{}", strip_data_url(image_base64));
        let prompt = prompt
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_PROMPT.to_string());

        let text_part = ChatCompletionRequestMessageContentPartTextArgs::default()
            .text(prompt)
            .build()?;
        let image_part = ChatCompletionRequestMessageContentPartImageArgs::default()
            .image_url(ImageUrlArgs::default().url(image_url).build()?)
            .build()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(SYSTEM_PROMPT)
                    .build()?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(vec![
                        ChatCompletionRequestUserMessageContentPart::from(text_part),
                        ChatCompletionRequestUserMessageContentPart::from(image_part),
                    ])
                    .build()?
                    .into(),
            ])
            .build()?;

        let response = self.client.chat().create(request).await?;
        let content = response
            .choices
            .first()
            .context("No response choice from the vision model")?
            .message
            .content
            .clone()
            .context("No content in the vision model response")?;
        Ok(content)
    }
}

/// Supplies rendered page images. Rendering itself lives with the document viewer.
#[async_trait]
pub trait PageImageSource: Send + Sync {
    /// Returns the 1-based `page` as a base64 PNG (a data URL is accepted too).
    async fn page_png(&self, page: u32) -> Result<String>;
}

/// Transcribes pages by rendering them and sending the images to a `VisionClient`.
pub struct VisionPageTranscriber<S> {
    images: S,
    client: Arc<dyn VisionClient>,
}

impl<S: PageImageSource> VisionPageTranscriber<S> {
    pub fn new(images: S, client: Arc<dyn VisionClient>) -> Self {
        Self { images, client }
    }
}

#[async_trait]
impl<S: PageImageSource> PageTranscriber for VisionPageTranscriber<S> {
    async fn transcribe_page(&self, page: u32) -> Result<String> {
        let image = self
            .images
            .page_png(page)
            .await
            .with_context(|| format!("Could not render page {}", page))?;
        self.client
            .transcribe_image(&image, Some(page_prompt(page)))
            .await
    }
}
