use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::db::{self, PendingRow};
use crate::llm::{GenerateOutcome, TextApi};
use crate::rate_limit::Pacer;

pub const KEYWORD_CATEGORY: &str = "Tech News";

const ARTICLE_PROMPT: &str = "\
You are a professional tech writer for a product discovery site.
Write an engaging review article in Markdown for the product below.

Product name: {title}
Category: {category}
Description: {description}
Key specs: {specs}
Price: {price}

Requirements:
- Start with a '## Overview' section saying what it is and who it is for.
- Add a '## Standout Features' section drawing on the specs.
- Add a '## Pricing' section; if the price is Unknown, discuss typical pricing for the category.
- Close with a '## Verdict' section with a clear recommendation.
- 400-600 words, plain Markdown, no HTML.";

const KEYWORD_PROMPT: &str = "\
You are a professional tech writer for a product discovery site.
Write a beginner-friendly explainer article in Markdown about: {keyword}

Requirements:
- Start with a '## What is {keyword}?' section.
- Cover practical use cases and common pitfalls.
- Close with a '## Getting Started' section.
- 400-600 words, plain Markdown, no HTML.";

fn or_unknown(s: &str) -> &str {
    if s.trim().is_empty() {
        "Unknown"
    } else {
        s
    }
}

/// Fill the article prompt from a catalog row. Sparse fields become
/// "Unknown" so the model never sees raw empties.
pub fn build_prompt(row: &PendingRow) -> String {
    ARTICLE_PROMPT
        .replace("{title}", or_unknown(&row.title))
        .replace("{category}", or_unknown(&row.category))
        .replace("{description}", or_unknown(&row.description))
        .replace("{specs}", or_unknown(&row.specs))
        .replace("{price}", or_unknown(&row.price))
}

/// Stable synthetic url for keyword articles: same keyword, same row.
pub fn keyword_url(base: &str, keyword: &str) -> String {
    let digest = Sha256::digest(keyword.trim().as_bytes());
    format!(
        "{}/keyword/{}.html",
        base.trim_end_matches('/'),
        hex::encode(&digest[..16])
    )
}

#[derive(Debug, Default, PartialEq)]
pub struct GenerateSummary {
    pub generated: usize,
    pub empty: usize,
    pub rate_limited: usize,
    pub failed: usize,
}

impl GenerateSummary {
    pub fn print(&self) {
        println!(
            "Articles: {} generated, {} empty, {} rate limited, {} failed.",
            self.generated, self.empty, self.rate_limited, self.failed
        );
    }
}

/// Generate article bodies for pending rows, one API call per row, no
/// retries within a run. Rows that do not come back with text stay
/// pending and are picked up again next run.
pub async fn run(
    conn: &Connection,
    api: &dyn TextApi,
    pacer: &mut Pacer,
    batch_size: usize,
    priority_category: Option<&str>,
) -> Result<GenerateSummary> {
    let rows = db::fetch_pending(conn, batch_size, priority_category)?;
    if rows.is_empty() {
        info!("no pending products");
        return Ok(GenerateSummary::default());
    }
    info!("generating articles for {} products", rows.len());

    let pb = ProgressBar::new(rows.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} (eta {eta})")?
            .progress_chars("=> "),
    );

    let mut summary = GenerateSummary::default();
    for row in &rows {
        let prompt = build_prompt(row);
        generate_into(conn, api, pacer, &row.url, &prompt, &mut summary).await?;
        pb.inc(1);
    }
    pb.finish_and_clear();
    Ok(summary)
}

/// One article straight from a keyword, bypassing the scrape pipeline.
/// The row is keyed by a synthetic url so rerunning the same keyword
/// overwrites instead of piling up near-duplicates, and it is created
/// only when the call comes back with text. A keyword row never sits in
/// the pending queue, where the product prompt would pick it up.
pub async fn run_keyword(
    conn: &Connection,
    api: &dyn TextApi,
    pacer: &mut Pacer,
    site_base_url: &str,
    keyword: &str,
) -> Result<GenerateSummary> {
    let keyword = keyword.trim();
    let url = keyword_url(site_base_url, keyword);
    let prompt = KEYWORD_PROMPT.replace("{keyword}", keyword);

    let mut summary = GenerateSummary::default();
    pacer.await_slot().await;
    match api.generate(&prompt).await {
        GenerateOutcome::Text(body) => {
            let title = format!("{}: a practical introduction", keyword);
            let scraped_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
            db::upsert_stub(conn, &url, &title, KEYWORD_CATEGORY, &scraped_at)?;
            db::write_body(conn, &url, &body)?;
            info!("wrote keyword article for {} ({} chars)", url, body.len());
            summary.generated += 1;
        }
        GenerateOutcome::Empty => {
            warn!("empty completion for '{}'; nothing stored", keyword);
            summary.empty += 1;
        }
        GenerateOutcome::RateLimited => {
            summary.rate_limited += 1;
            pacer.start_cooldown();
        }
        GenerateOutcome::Failed(e) => {
            warn!("keyword generation failed for '{}': {}", keyword, e);
            summary.failed += 1;
        }
    }
    Ok(summary)
}

async fn generate_into(
    conn: &Connection,
    api: &dyn TextApi,
    pacer: &mut Pacer,
    url: &str,
    prompt: &str,
    summary: &mut GenerateSummary,
) -> Result<()> {
    pacer.await_slot().await;
    match api.generate(prompt).await {
        GenerateOutcome::Text(body) => {
            db::write_body(conn, url, &body)?;
            info!("wrote article for {} ({} chars)", url, body.len());
            summary.generated += 1;
        }
        GenerateOutcome::Empty => {
            warn!("empty completion for {}; row stays pending", url);
            summary.empty += 1;
        }
        GenerateOutcome::RateLimited => {
            summary.rate_limited += 1;
            pacer.start_cooldown();
        }
        GenerateOutcome::Failed(e) => {
            warn!("generation failed for {}: {}", url, e);
            summary.failed += 1;
        }
    }
    Ok(())
}

// ── Tests ──
