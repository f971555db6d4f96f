use super::{SelectorSet, SourceAdapter, SourceKind};

/// futuretools.io tool pages. Webflow markup, so class names are the
/// stable hook; the bare h1 survived their last two redesigns.
pub struct FutureTools;

static SELECTORS: SelectorSet = SelectorSet {
    title: &["h1", ".tool-title", "header h2"],
    description: &[".rich-text-block", ".tool-description", "article p"],
    price: &[".pricing-category", ".price-tag"],
    specs: &[".tags-container", ".tool-tags"],
    item_links: &[],
};

impl SourceAdapter for FutureTools {
    fn name(&self) -> &'static str {
        "futuretools"
    }

    fn category(&self) -> &'static str {
        "AI Tool"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Detail
    }

    fn selectors(&self) -> &SelectorSet {
        &SELECTORS
    }
}

// ── Tests ──
