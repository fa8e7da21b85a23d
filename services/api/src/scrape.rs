//! Text extraction and HTML sanitising for scraped pages.
//!
//! Uses `scraper` for parsing. The sanitised HTML is re-serialised from the
//! parsed tree so that scripts never reach the output.

use scraper::{ElementRef, Html, Node, Selector};
use std::fmt::Write;
use talkbook_core::extract::collapse_whitespace;

/// Elements whose contents are never part of the visible text.
const HIDDEN: &[&str] = &["script", "style", "meta", "link", "noscript"];

const VOID: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

const RAW_TEXT: &[&str] = &["style", "script", "noscript"];

pub struct ScrapedDocument {
    pub title: String,
    pub content: String,
    pub html: String,
}

pub fn scrape_html(html: &str) -> ScrapedDocument {
    let document = Html::parse_document(html);
    ScrapedDocument {
        title: extract_title(&document),
        content: extract_text(&document),
        html: sanitize(&document),
    }
}

fn extract_title(doc: &Html) -> String {
    Selector::parse("title")
        .ok()
        .and_then(|s| doc.select(&s).next())
        .map(|t| t.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

fn extract_text(doc: &Html) -> String {
    let Some(body) = Selector::parse("body")
        .ok()
        .and_then(|s| doc.select(&s).next())
    else {
        return String::new();
    };
    let mut text = String::new();
    collect_text(body, &mut text);
    collapse_whitespace(&text)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(child) = ElementRef::wrap(child) {
            if !HIDDEN.contains(&child.value().name()) {
                collect_text(child, out);
            }
        } else if let Node::Text(text) = child.value() {
            out.push_str(text);
        }
    }
}

fn sanitize(doc: &Html) -> String {
    let mut out = String::from("<!DOCTYPE html>");
    write_element(doc.root_element(), &mut out);
    out
}

fn write_element(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    let is_link = name == "a";

    let _ = write!(out, "<{}", name);
    for (attr, value) in element.value().attrs() {
        if is_link && (attr == "target" || attr == "rel") {
            continue;
        }
        let _ = write!(out, " {}=\"{}\"", attr, escape(value, true));
    }
    if is_link {
        out.push_str(r#" target="_blank" rel="noopener noreferrer""#);
    }
    out.push('>');
    if VOID.contains(&name) {
        return;
    }

    for child in element.children() {
        if let Some(child) = ElementRef::wrap(child) {
            if child.value().name() != "script" {
                write_element(child, out);
            }
            continue;
        }
        match child.value() {
            Node::Text(text) if RAW_TEXT.contains(&name) => out.push_str(text),
            Node::Text(text) => out.push_str(&escape(text, false)),
            Node::Comment(comment) => {
                let _ = write!(out, "<!--{}-->", &**comment);
            }
            _ => {}
        }
    }
    let _ = write!(out, "</{}>", name);
}

fn escape(text: &str, attribute: bool) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' if !attribute => escaped.push_str("&lt;"),
            '>' if !attribute => escaped.push_str("&gt;"),
            '"' if attribute => escaped.push_str("&quot;"),
            '\u{a0}' => escaped.push_str("&nbsp;"),
            c => escaped.push(c),
        }
    }
    escaped
}
