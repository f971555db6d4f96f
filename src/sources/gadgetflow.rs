use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;

use super::{extract_with, RawRecord, SelectorSet, SourceAdapter, SourceKind};

/// Gadget Flow trending listings. Items are harvested from the listing
/// grid, then each product page is scraped like a detail source.
pub struct GadgetFlow;

static SELECTORS: SelectorSet = SelectorSet {
    title: &["h1.product-title", "h1"],
    description: &[".product-description", ".description-block", "article p"],
    price: &[".price-wrap", ".product-price", "span.price"],
    specs: &[".specs-list", ".product-specs"],
    item_links: &[
        "a.product-card",
        ".product-grid a.card-link",
        ".products a[href*='/products/']",
    ],
};

static PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\s*\d[\d,]*(?:\.\d{1,2})?").unwrap());

impl SourceAdapter for GadgetFlow {
    fn name(&self) -> &'static str {
        "gadgetflow"
    }

    fn category(&self) -> &'static str {
        "Gadget"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Listing
    }

    fn selectors(&self) -> &SelectorSet {
        &SELECTORS
    }

    /// Price blocks on this site mix sale labels, struck-through old
    /// prices and currency codes ("Save 20% $39.99 $49.99 USD"). Keep
    /// only the first dollar amount.
    fn extract(&self, url: &str, doc: &Html) -> Option<RawRecord> {
        let mut rec = extract_with(self.selectors(), self.category(), url, doc)?;
        if let Some(m) = PRICE_RE.find(&rec.price_text) {
            rec.price_text = m.as_str().replace(' ', "");
        }
        Some(rec)
    }
}

// ── Tests ──
