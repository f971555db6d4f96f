use chrono::{SecondsFormat, Utc};
use scraper::{Html, Selector};
use url::Url;

use crate::normalize::collapse_ws;

pub mod futuretools;
pub mod gadgetflow;
pub mod techbriefs;

/// One extraction from a product page, before normalization. Empty
/// strings mean the field was not found on the page.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub url: String,
    pub title: String,
    pub description: String,
    pub price_text: String,
    pub specs: String,
    pub category: String,
    pub scraped_at: String,
}

/// Ordered CSS selector candidates per field. The first candidate that
/// matches at least one element supplies the value; later entries are
/// fallbacks for when a site reshuffles its markup.
pub struct SelectorSet {
    pub title: &'static [&'static str],
    pub description: &'static [&'static str],
    pub price: &'static [&'static str],
    pub specs: &'static [&'static str],
    /// Anchors to follow on a listing page. Empty for detail sources.
    pub item_links: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Fixed product urls straight from the config.
    Detail,
    /// A listing page whose item links are harvested first.
    Listing,
}

pub trait SourceAdapter {
    fn name(&self) -> &'static str;
    fn category(&self) -> &'static str;
    fn kind(&self) -> SourceKind;
    fn selectors(&self) -> &SelectorSet;

    /// Pull one record out of a product page. None when no title
    /// candidate matches; such pages are skipped upstream.
    fn extract(&self, url: &str, doc: &Html) -> Option<RawRecord> {
        extract_with(self.selectors(), self.category(), url, doc)
    }
}

/// All known source adapters.
pub fn all() -> Vec<Box<dyn SourceAdapter>> {
    vec![
        Box::new(futuretools::FutureTools),
        Box::new(gadgetflow::GadgetFlow),
        Box::new(techbriefs::TechBriefs),
    ]
}

pub fn by_name(name: &str) -> Option<Box<dyn SourceAdapter>> {
    all().into_iter().find(|a| a.name() == name)
}

/// Selector-table extraction shared by every adapter.
pub fn extract_with(sel: &SelectorSet, category: &str, url: &str, doc: &Html) -> Option<RawRecord> {
    let title = first_text(doc, sel.title)?;
    Some(RawRecord {
        url: url.to_string(),
        title,
        description: first_text(doc, sel.description).unwrap_or_default(),
        price_text: first_text(doc, sel.price).unwrap_or_default(),
        specs: first_text(doc, sel.specs).unwrap_or_default(),
        category: category.to_string(),
        scraped_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    })
}

/// Try candidates in order; the first one that selects an element wins,
/// even if that element's text is empty.
pub fn first_text(doc: &Html, candidates: &[&str]) -> Option<String> {
    for css in candidates {
        let sel = Selector::parse(css).unwrap();
        if let Some(el) = doc.select(&sel).next() {
            let text: String = el.text().collect::<Vec<_>>().join(" ");
            return Some(collapse_ws(&text));
        }
    }
    None
}

/// Item links from a listing page: first matching candidate only, in
/// document order, resolved against the listing url, capped at `max`.
pub fn harvest_links(doc: &Html, candidates: &[&str], base: &Url, max: usize) -> Vec<String> {
    for css in candidates {
        let sel = Selector::parse(css).unwrap();
        let mut out: Vec<String> = Vec::new();
        for el in doc.select(&sel) {
            // Checked before the push so a zero cap harvests nothing.
            if out.len() >= max {
                break;
            }
            let Some(href) = el.value().attr("href") else {
                continue;
            };
            let Ok(abs) = base.join(href) else {
                continue;
            };
            let abs = abs.to_string();
            if !out.contains(&abs) {
                out.push(abs);
            }
        }
        if !out.is_empty() {
            return out;
        }
    }
    Vec::new()
}

// ── Tests ──
