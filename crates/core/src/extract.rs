//! Direct text extraction from a PDF's text layer.

use crate::transcription::PageTranscriber;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;

/// Extracts page text from an in-memory PDF.
///
/// The whole document is decoded once on construction; transcribing a page
/// then only looks up and normalises that page's text.
pub struct PdfTextExtractor {
    pages: Vec<String>,
}

impl PdfTextExtractor {
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let pages = pdf_extract::extract_text_from_mem_by_pages(data)
            .map_err(|e| anyhow!("PDF extraction failed: {}", e))?;
        Ok(Self { pages })
    }

    /// Builds an extractor over pages that were already split.
    pub fn from_pages(pages: Vec<String>) -> Self {
        Self { pages }
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }
}

#[async_trait]
impl PageTranscriber for PdfTextExtractor {
    async fn transcribe_page(&self, page: u32) -> Result<String> {
        let raw = page
            .checked_sub(1)
            .and_then(|i| self.pages.get(i as usize))
            .with_context(|| format!("Page {} is out of range", page))?;
        Ok(collapse_whitespace(raw))
    }
}

/// Collapses every whitespace run to a single space and trims the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\n b\t c  "), "a b c");
        assert_eq!(collapse_whitespace("\n\t "), "");
    }

    #[tokio::test]
    async fn test_transcribe_page_normalises_text() {
        let extractor =
            PdfTextExtractor::from_pages(vec!["Title\n\n  intro".into(), "second  page".into()]);
        assert_eq!(extractor.page_count(), 2);
        assert_eq!(extractor.transcribe_page(1).await.unwrap(), "Title intro");
        assert_eq!(extractor.transcribe_page(2).await.unwrap(), "second page");
    }

    #[tokio::test]
    async fn test_out_of_range_pages_fail() {
        let extractor = PdfTextExtractor::from_pages(vec!["only".into()]);
        assert!(extractor.transcribe_page(0).await.is_err());
        assert!(extractor.transcribe_page(2).await.is_err());
    }
}
