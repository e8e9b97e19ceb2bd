//! Text and link extraction from fetched pages.

use crate::error::ParseError;
use crate::fetch::FetchedPage;
use crate::frontier::normalize;
use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

lazy_static! {
    static ref TITLE: Selector = Selector::parse("title").expect("valid selector");
    static ref BODY: Selector = Selector::parse("body").expect("valid selector");
    static ref LINK: Selector = Selector::parse("a[href]").expect("valid selector");
}

const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub title: String,
    pub text: String,
    /// Absolute http(s) links, fragments removed, in document order, deduplicated.
    pub links: Vec<Url>,
}

pub fn extract(page: &FetchedPage) -> Result<ExtractedPage, ParseError> {
    let content_type = page.content_type.as_deref().unwrap_or("text/html").to_ascii_lowercase();
    let extracted = if content_type.starts_with("text/html") || content_type.starts_with("application/xhtml") {
        let doc = Html::parse_document(&page.body);
        let (title, text) = document_text(&doc);
        ExtractedPage { title, text, links: links(&doc, &page.url) }
    } else if content_type.starts_with("text/plain") {
        let text = page.body.split_whitespace().collect::<Vec<_>>().join(" ");
        ExtractedPage { title: String::new(), text, links: Vec::new() }
    } else {
        return Err(ParseError::UnsupportedContentType(content_type));
    };
    if extracted.text.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(extracted)
}

/// Title and visible text of an HTML document, whitespace collapsed.
pub fn html_to_text(html: &str) -> (String, String) {
    document_text(&Html::parse_document(html))
}

fn document_text(doc: &Html) -> (String, String) {
    let title = doc
        .select(&TITLE)
        .next()
        .map(|n| n.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" "))
        .unwrap_or_default();
    let root = doc.select(&BODY).next().unwrap_or_else(|| doc.root_element());
    (title, visible_text(root))
}

fn visible_text(root: ElementRef<'_>) -> String {
    let mut words = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else { continue };
        let hidden = node
            .ancestors()
            .any(|a| a.value().as_element().is_some_and(|e| HIDDEN_ELEMENTS.contains(&e.name())));
        if !hidden {
            words.extend(text.split_whitespace());
        }
    }
    words.join(" ")
}

fn links(doc: &Html, base: &Url) -> Vec<Url> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for a in doc.select(&LINK) {
        let Some(href) = a.value().attr("href") else { continue };
        let Ok(u) = base.join(href.trim()) else { continue };
        if !matches!(u.scheme(), "http" | "https") {
            continue;
        }
        let u = normalize(&u);
        if seen.insert(u.to_string()) {
            out.push(u);
        }
    }
    out
}
