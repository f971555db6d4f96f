use std::collections::HashSet;

use tracing::debug;

use crate::db::{CleanRecord, DEFAULT_CATEGORY};
use crate::sources::RawRecord;

/// What one normalizer pass did, for the run summary.
#[derive(Debug, Default, PartialEq)]
pub struct CleanCounts {
    pub kept: usize,
    pub dropped_untitled: usize,
    pub deduped: usize,
}

/// Turn raw extractions into catalog rows: drop records whose title is
/// empty, collapse whitespace in every field, default the category, and
/// keep only the last occurrence of each url.
pub fn clean(raw: Vec<RawRecord>) -> (Vec<CleanRecord>, CleanCounts) {
    let mut counts = CleanCounts::default();

    // Walk backwards so the last occurrence of a url claims it, the way
    // a re-scrape later in the same run supersedes the earlier one.
    let mut seen: HashSet<String> = HashSet::new();
    let mut out: Vec<CleanRecord> = Vec::new();
    for r in raw.into_iter().rev() {
        let title = collapse_ws(&r.title);
        if title.is_empty() {
            debug!("dropping untitled record from {}", r.url);
            counts.dropped_untitled += 1;
            continue;
        }
        if !seen.insert(r.url.clone()) {
            counts.deduped += 1;
            continue;
        }
        let category = collapse_ws(&r.category);
        out.push(CleanRecord {
            url: r.url,
            title,
            description: collapse_ws(&r.description),
            specs: collapse_ws(&r.specs),
            price: collapse_ws(&r.price_text),
            category: if category.is_empty() {
                DEFAULT_CATEGORY.to_string()
            } else {
                category
            },
            scraped_at: r.scraped_at,
        });
    }
    out.reverse();
    counts.kept = out.len();
    (out, counts)
}

/// Collapse runs of whitespace (newlines included) to single spaces and trim.
pub fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(url: &str, title: &str) -> RawRecord {
        RawRecord {
            url: url.into(),
            title: title.into(),
            description: "desc".into(),
            price_text: "$10".into(),
            specs: "specs".into(),
            category: "Gadget".into(),
            scraped_at: "2024-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(collapse_ws("  a \n\t b  c "), "a b c");
        assert_eq!(collapse_ws(""), "");
        assert_eq!(collapse_ws(" \n "), "");
    }

    #[test]
    fn drops_untitled_records() {
        let (rows, counts) = clean(vec![raw("u1", "Kept"), raw("u2", ""), raw("u3", "  \n ")]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "Kept");
        assert_eq!(counts.dropped_untitled, 2);
        assert_eq!(counts.kept, 1);
    }

    #[test]
    fn dedup_keeps_last_occurrence() {
        let (rows, counts) = clean(vec![
            raw("dup", "Old name"),
            raw("other", "Other"),
            raw("dup", "New name"),
        ]);
        let titles: Vec<&str> = rows.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Other", "New name"]);
        assert_eq!(counts.deduped, 1);
    }

    #[test]
    fn untitled_duplicate_does_not_shadow_titled_one() {
        let (rows, counts) = clean(vec![raw("u1", "Titled"), raw("u1", "")]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "Titled");
        assert_eq!(counts.dropped_untitled, 1);
        assert_eq!(counts.deduped, 0);
    }

    #[test]
    fn defaults_empty_category() {
        let mut r = raw("u1", "Thing");
        r.category = "  ".into();
        let (rows, _) = clean(vec![r]);
        assert_eq!(rows[0].category, DEFAULT_CATEGORY);
    }

    #[test]
    fn cleans_every_field() {
        let mut r = raw("u1", " Spaced \n Title ");
        r.description = "line\none   line\ttwo".into();
        r.price_text = " $9.99 ".into();
        r.specs = "a\n\nb".into();
        let (rows, _) = clean(vec![r]);
        assert_eq!(rows[0].title, "Spaced Title");
        assert_eq!(rows[0].description, "line one line two");
        assert_eq!(rows[0].price, "$9.99");
        assert_eq!(rows[0].specs, "a b");
    }

    #[test]
    fn same_input_same_output() {
        let input = vec![raw("u1", "A"), raw("u2", "B"), raw("u1", "A2"), raw("u3", "")];
        let (a, ca) = clean(input.clone());
        let (b, cb) = clean(input);
        assert_eq!(a, b);
        assert_eq!(ca, cb);
    }
}
