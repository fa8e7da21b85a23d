//! Page Context for the Voice Model
//!
//! Builds the system instructions that tell the realtime model which page the
//! reader is on and what it says, and the `session.update` event that carries
//! them over the data channel.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;

/// The reader's position in the document plus the text around it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContext {
    pub current_page: u32,
    pub total_pages: u32,
    pub page_content: String,
    /// Neighbouring pages' text keyed by page number.
    #[serde(default)]
    pub surrounding_pages: BTreeMap<u32, String>,
}

impl PageContext {
    pub fn new(current_page: u32, total_pages: u32, page_content: impl Into<String>) -> Self {
        Self {
            current_page,
            total_pages,
            page_content: page_content.into(),
            surrounding_pages: BTreeMap::new(),
        }
    }

    pub fn with_surrounding(mut self, page: u32, content: impl Into<String>) -> Self {
        self.surrounding_pages.insert(page, content.into());
        self
    }

    /// Instructions sent once the voice session's data channel opens.
    pub fn initial_instructions(&self) -> String {
        self.render()
    }

    /// Instructions re-sent whenever the visible page changes.
    ///
    /// Carries the neighbouring pages as well, so a page change never leaves
    /// the model with less context than it started with.
    pub fn update_instructions(&self) -> String {
        self.render()
    }

    fn render(&self) -> String {
        let mut text = String::from("You are an AI assistant helping with a PDF document.\n");
        let _ = write!(
            text,
            "The user is currently on page {} of {}.\n\n",
            self.current_page, self.total_pages
        );
        let _ = write!(text, "Current page content:\n{}\n\n", self.page_content);

        let neighbours: Vec<_> = self
            .surrounding_pages
            .iter()
            .filter(|(_, content)| !content.is_empty())
            .collect();
        if !neighbours.is_empty() {
            text.push_str("Context from surrounding pages:\n");
            for (page, content) in neighbours {
                let _ = write!(text, "\nPage {}:\n{}\n", page, content);
            }
        }
        text
    }
}

/// The `session.update` client event understood by both providers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename = "session.update")]
pub struct SessionUpdate {
    pub session: SessionInstructions,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionInstructions {
    pub instructions: String,
}

impl SessionUpdate {
    pub fn instructions(instructions: impl Into<String>) -> Self {
        Self {
            session: SessionInstructions {
                instructions: instructions.into(),
            },
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instructions_without_neighbours() {
        let ctx = PageContext::new(3, 10, "Chapter one.");
        assert_eq!(
            ctx.initial_instructions(),
            "You are an AI assistant helping with a PDF document.\n\
             The user is currently on page 3 of 10.\n\n\
             Current page content:\nChapter one.\n\n"
        );
    }

    #[test]
    fn test_instructions_list_neighbours_in_page_order() {
        let ctx = PageContext::new(5, 9, "middle")
            .with_surrounding(6, "after")
            .with_surrounding(4, "before");
        let text = ctx.initial_instructions();

        assert!(text.contains("Context from surrounding pages:\n"));
        let before = text.find("\nPage 4:\nbefore\n").unwrap();
        let after = text.find("\nPage 6:\nafter\n").unwrap();
        assert!(before < after);
    }

    #[test]
    fn test_empty_neighbours_are_skipped() {
        let ctx = PageContext::new(1, 2, "first").with_surrounding(2, "");
        let text = ctx.initial_instructions();
        assert!(!text.contains("surrounding pages"));
        assert!(!text.contains("Page 2:"));
    }

    #[test]
    fn test_update_instructions_carry_new_page_text() {
        let ctx = PageContext::new(7, 12, "the seventh page").with_surrounding(8, "eighth");
        let text = ctx.update_instructions();
        assert!(text.contains("page 7 of 12"));
        assert!(text.contains("the seventh page"));
        assert!(text.contains("Page 8:\neighth"));
    }

    #[test]
    fn test_session_update_wire_shape() {
        let event = SessionUpdate::instructions("hello");
        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "session.update",
                "session": { "instructions": "hello" }
            })
        );
    }
}
