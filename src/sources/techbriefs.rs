use super::{SelectorSet, SourceAdapter, SourceKind};

/// Tech news briefs, WordPress-flavored markup. No price on articles;
/// the specs slot carries the post tags instead.
pub struct TechBriefs;

static SELECTORS: SelectorSet = SelectorSet {
    title: &["h1.entry-title", "h1", "header h2"],
    description: &[".entry-content p", ".article-body p", "article p"],
    price: &[],
    specs: &[".article-tags", ".post-tags"],
    item_links: &[
        "h2.entry-title a",
        ".post-list article a",
        "a[rel='bookmark']",
    ],
};

impl SourceAdapter for TechBriefs {
    fn name(&self) -> &'static str {
        "techbriefs"
    }

    fn category(&self) -> &'static str {
        "Tech News"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Listing
    }

    fn selectors(&self) -> &SelectorSet {
        &SELECTORS
    }
}

// ── Tests ──
