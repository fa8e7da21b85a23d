//! Document Transcription
//!
//! Turns every page of a document into text, either by extracting the text
//! layer directly or by asking a vision model to read a rendered image of the
//! page. Pages are processed in small fixed-size batches; each page writes
//! only its own entry, so a batch needs no coordination beyond awaiting it.

use anyhow::{Result, bail};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

/// Produces the text of a single page.
#[async_trait]
pub trait PageTranscriber: Send + Sync {
    /// Transcribes the 1-based page `page`.
    async fn transcribe_page(&self, page: u32) -> Result<String>;
}

/// The two ways a document can be turned into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TranscriptionMethod {
    /// Read the PDF's own text layer.
    #[default]
    Direct,
    /// Send a rendered image of each page to a vision model.
    Vision,
}

impl TranscriptionMethod {
    /// How many pages are in flight at once for this method.
    pub fn batch_size(&self) -> usize {
        match self {
            TranscriptionMethod::Direct => 10,
            TranscriptionMethod::Vision => 5,
        }
    }

    fn error_label(&self) -> (&'static str, &'static str) {
        match self {
            TranscriptionMethod::Direct => (
                "Error extracting text from this page",
                "Error extracting text",
            ),
            TranscriptionMethod::Vision => {
                ("Error transcribing this page", "Error transcribing page")
            }
        }
    }
}

/// One page's outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageEntry {
    /// Plain content, or an error description when the page failed.
    pub content: String,
    /// Markdown section for the page, headed `## Page N`.
    #[serde(skip)]
    pub markdown: String,
    #[serde(skip)]
    pub failed: bool,
}

impl PageEntry {
    fn success(page: u32, content: String) -> Self {
        Self {
            markdown: format!("## Page {}\n\n{}", page, content),
            content,
            failed: false,
        }
    }

    fn failure(page: u32, method: TranscriptionMethod, error: &anyhow::Error) -> Self {
        let (heading, plain) = method.error_label();
        Self {
            markdown: format!("## Page {}\n\n*{}: {}*", page, heading, error),
            content: format!("{}: {}", plain, error),
            failed: true,
        }
    }
}

/// Supported download formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Txt,
    Md,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Txt => "txt",
            ExportFormat::Md => "md",
            ExportFormat::Json => "json",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Txt => "text/plain",
            ExportFormat::Md => "text/markdown",
            ExportFormat::Json => "application/json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "txt" => Ok(ExportFormat::Txt),
            "md" => Ok(ExportFormat::Md),
            "json" => Ok(ExportFormat::Json),
            other => bail!("Unsupported export format: {}", other),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Per-page transcription results, keyed by 1-based page number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcription {
    pages: BTreeMap<u32, PageEntry>,
}

impl Transcription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, page: u32, content: impl Into<String>) {
        self.pages
            .insert(page, PageEntry::success(page, content.into()));
    }

    pub fn get(&self, page: u32) -> Option<&PageEntry> {
        self.pages.get(&page)
    }

    /// The page's content, or an empty string when it has not been transcribed.
    pub fn content(&self, page: u32) -> &str {
        self.pages.get(&page).map(|e| e.content.as_str()).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn failed_pages(&self) -> Vec<u32> {
        self.pages
            .iter()
            .filter(|(_, e)| e.failed)
            .map(|(p, _)| *p)
            .collect()
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }

    /// All markdown sections in page order, separated by rules.
    pub fn to_markdown(&self) -> String {
        self.pages
            .values()
            .map(|e| e.markdown.as_str())
            .collect::<Vec<_>>()
            .join("\n\n---\n\n")
    }

    /// Renders the transcription for download.
    pub fn export(&self, format: ExportFormat) -> Result<String> {
        if self.pages.is_empty() {
            bail!("No transcription data available to download.");
        }
        let out = match format {
            ExportFormat::Json => serde_json::to_string_pretty(&self.pages)?,
            ExportFormat::Md => self.to_markdown(),
            ExportFormat::Txt => self
                .pages
                .iter()
                .map(|(page, e)| format!("--- Page {} ---\n\n{}", page, e.content))
                .collect::<Vec<_>>()
                .join("\n\n"),
        };
        Ok(out)
    }
}

/// Download file name for `document_name` in `format`, dropping a `.pdf` suffix.
pub fn export_file_name(document_name: Option<&str>, format: ExportFormat) -> String {
    let stem = document_name
        .map(|n| n.replacen(".pdf", "", 1))
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "transcription".to_string());
    format!("{}.{}", stem, format.extension())
}

/// Transcribes pages `1..=total_pages` in batches of `method.batch_size()`.
///
/// `on_progress(done, total)` is called after each batch completes. A page
/// that fails is recorded as an error entry and does not stop the run.
pub async fn transcribe_document<T, F>(
    transcriber: &T,
    total_pages: u32,
    method: TranscriptionMethod,
    mut on_progress: F,
) -> Transcription
where
    T: PageTranscriber + ?Sized,
    F: FnMut(u32, u32),
{
    let mut transcription = Transcription::new();
    if total_pages == 0 {
        return transcription;
    }

    let batch_size = method.batch_size() as u32;
    let mut start = 1;
    loop {
        let end = batch_end(start, batch_size, total_pages);
        let results = join_all((start..=end).map(|page| async move {
            (page, transcriber.transcribe_page(page).await)
        }))
        .await;

        for (page, result) in results {
            let entry = match result {
                Ok(text) => PageEntry::success(page, text),
                Err(e) => {
                    warn!(page, error = %e, "Page transcription failed");
                    PageEntry::failure(page, method, &e)
                }
            };
            transcription.pages.insert(page, entry);
        }

        on_progress(end, total_pages);
        info!(done = end, total = total_pages, "Transcription batch complete");
        if end == total_pages {
            break;
        }
        start = end + 1;
    }

    transcription
}

/// Last page of the batch starting at `start`, clamped to `total_pages`.
fn batch_end(start: u32, batch_size: u32, total_pages: u32) -> u32 {
    start
        .saturating_add(batch_size.saturating_sub(1))
        .min(total_pages)
}

/// Progress as a percentage, for display.
pub fn progress_percent(done: u32, total: u32) -> f32 {
    if total == 0 {
        return 0.0;
    }
    done as f32 / total as f32 * 100.0
}
