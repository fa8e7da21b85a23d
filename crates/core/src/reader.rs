//! Reader State
//!
//! Client-local state for the open document: which page is showing, what each
//! page says once transcribed, and the reader's notes. Nothing here is
//! persisted; opening another document discards it.

use crate::context::PageContext;
use crate::transcription::Transcription;

/// Default number of pages on each side of the current page sent as context.
pub const DEFAULT_CONTEXT_RADIUS: u32 = 1;

#[derive(Debug, Clone)]
pub struct ReaderState {
    document_name: Option<String>,
    total_pages: u32,
    current_page: u32,
    context_radius: u32,
    transcription: Transcription,
    notes: String,
}

impl Default for ReaderState {
    fn default() -> Self {
        Self {
            document_name: None,
            total_pages: 0,
            current_page: 1,
            context_radius: DEFAULT_CONTEXT_RADIUS,
            transcription: Transcription::new(),
            notes: String::new(),
        }
    }
}

impl ReaderState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a new document, returning to its first page and dropping any
    /// transcription of the previous one.
    pub fn open(&mut self, document_name: impl Into<String>, total_pages: u32) {
        self.document_name = Some(document_name.into());
        self.total_pages = total_pages;
        self.current_page = 1;
        self.transcription.clear();
    }

    pub fn document_name(&self) -> Option<&str> {
        self.document_name.as_deref()
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    /// Moves to `page`. Returns `false` and leaves the page unchanged when
    /// `page` is outside the document.
    pub fn go_to(&mut self, page: u32) -> bool {
        if page == 0 || page > self.total_pages || page == self.current_page {
            return false;
        }
        self.current_page = page;
        true
    }

    pub fn next_page(&mut self) -> bool {
        match self.current_page.checked_add(1) {
            Some(page) => self.go_to(page),
            None => false,
        }
    }

    pub fn previous_page(&mut self) -> bool {
        match self.current_page.checked_sub(1) {
            Some(page) => self.go_to(page),
            None => false,
        }
    }

    pub fn first_page(&mut self) -> bool {
        self.go_to(1)
    }

    pub fn last_page(&mut self) -> bool {
        self.go_to(self.total_pages)
    }

    pub fn context_radius(&self) -> u32 {
        self.context_radius
    }

    pub fn set_context_radius(&mut self, radius: u32) {
        self.context_radius = radius;
    }

    pub fn transcription(&self) -> &Transcription {
        &self.transcription
    }

    pub fn set_transcription(&mut self, transcription: Transcription) {
        self.transcription = transcription;
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn set_notes(&mut self, notes: impl Into<String>) {
        self.notes = notes.into();
    }

    /// The context handed to the voice model for the current page.
    pub fn page_context(&self) -> PageContext {
        let page = self.current_page;
        let mut ctx = PageContext::new(page, self.total_pages, self.transcription.content(page));

        let first = page.saturating_sub(self.context_radius).max(1);
        let last = page.saturating_add(self.context_radius).min(self.total_pages);
        for neighbour in (first..=last).filter(|p| *p != page) {
            ctx = ctx.with_surrounding(neighbour, self.transcription.content(neighbour));
        }
        ctx
    }
}
