use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use reqwest::Client;
use scraper::Html;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{ScrapeConfig, SourceConfig};
use crate::sources::{self, RawRecord, SourceKind};

// Rotated per session so repeated runs do not present one fingerprint.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
];

#[derive(Debug, thiserror::Error)]
enum FetchError {
    #[error("http {0}")]
    Status(u16),
    #[error("unexpected content-type {0}")]
    NotHtml(String),
    #[error(transparent)]
    Request(#[from] reqwest::Error),
}

impl FetchError {
    fn kind(&self) -> &'static str {
        match self {
            FetchError::Status(_) => "http error",
            FetchError::NotHtml(_) => "bad response",
            FetchError::Request(_) => "request failed",
        }
    }
}

pub struct ScrapeFailure {
    pub url: String,
    pub kind: &'static str,
    pub detail: String,
}

pub struct ScrapeOutcome {
    pub records: Vec<RawRecord>,
    pub failures: Vec<ScrapeFailure>,
}

impl ScrapeOutcome {
    /// Failure counts keyed by kind, for the run summary.
    pub fn failures_by_kind(&self) -> BTreeMap<&'static str, usize> {
        let mut m = BTreeMap::new();
        for f in &self.failures {
            *m.entry(f.kind).or_insert(0) += 1;
        }
        m
    }
}

/// One shared browser-ish session for a whole run: one client, one
/// user agent, cookies kept, and a randomized pause before every fetch.
pub struct Session {
    client: Client,
    delay_min: f64,
    delay_max: f64,
}

impl Session {
    pub fn new(cfg: &ScrapeConfig) -> Result<Self> {
        let ua = USER_AGENTS[rand::rng().random_range(0..USER_AGENTS.len())];
        let client = Client::builder()
            .user_agent(ua)
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(8))
            .cookie_store(true)
            .gzip(true)
            .build()
            .context("building http client")?;
        Ok(Session {
            client,
            delay_min: cfg.delay_min_secs,
            delay_max: cfg.delay_max_secs,
        })
    }

    async fn pause(&self) {
        let secs = if self.delay_max > self.delay_min {
            rand::rng().random_range(self.delay_min..self.delay_max)
        } else {
            self.delay_min
        };
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }

    async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let ct = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !ct.is_empty() && !ct.contains("text/html") {
            return Err(FetchError::NotHtml(ct));
        }
        Ok(resp.text().await?)
    }
}

/// Scrape every configured source: resolve listing pages to item urls,
/// then fetch and extract each product page. One bad page never kills
/// the run; it lands in `failures` and the loop moves on.
pub async fn run(
    session: &Session,
    sources_cfg: &[SourceConfig],
    limit: Option<usize>,
) -> Result<ScrapeOutcome> {
    let adapters = sources::all();
    let mut targets: Vec<(usize, String)> = Vec::new();
    let mut failures: Vec<ScrapeFailure> = Vec::new();

    for sc in sources_cfg {
        let idx = adapters
            .iter()
            .position(|a| a.name() == sc.name)
            .with_context(|| format!("unknown source '{}'", sc.name))?;

        match adapters[idx].kind() {
            SourceKind::Detail => {
                for url in &sc.targets {
                    targets.push((idx, url.clone()));
                }
            }
            SourceKind::Listing => {
                let listing_url = sc
                    .listing_url
                    .as_deref()
                    .with_context(|| format!("source '{}' has no listing_url", sc.name))?;
                session.pause().await;
                match session.fetch_html(listing_url).await {
                    Ok(body) => {
                        let base = Url::parse(listing_url)
                            .with_context(|| format!("bad listing url {}", listing_url))?;
                        let links = {
                            let doc = Html::parse_document(&body);
                            sources::harvest_links(
                                &doc,
                                adapters[idx].selectors().item_links,
                                &base,
                                sc.max_items,
                            )
                        };
                        if links.is_empty() {
                            warn!("{}: no item links on {}", sc.name, listing_url);
                        } else {
                            info!("{}: harvested {} item links", sc.name, links.len());
                        }
                        for url in links {
                            targets.push((idx, url));
                        }
                    }
                    Err(e) => {
                        let f = ScrapeFailure {
                            url: listing_url.to_string(),
                            kind: "listing failed",
                            detail: e.to_string(),
                        };
                        warn!("{}: listing fetch failed for {}: {}", sc.name, f.url, f.detail);
                        failures.push(f);
                    }
                }
            }
        }
    }

    if let Some(n) = limit {
        targets.truncate(n);
    }
    if targets.is_empty() {
        info!("nothing to scrape");
        return Ok(ScrapeOutcome {
            records: Vec::new(),
            failures,
        });
    }

    let pb = ProgressBar::new(targets.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let mut records = Vec::new();
    for (idx, url) in targets {
        let adapter = adapters[idx].as_ref();
        session.pause().await;
        match session.fetch_html(&url).await {
            Ok(body) => {
                let rec = {
                    let doc = Html::parse_document(&body);
                    adapter.extract(&url, &doc)
                };
                match rec {
                    Some(r) => {
                        debug!("{}: extracted '{}'", adapter.name(), r.title);
                        records.push(r);
                    }
                    None => {
                        warn!("{}: no title found at {}", adapter.name(), url);
                        failures.push(ScrapeFailure {
                            url,
                            kind: "no title",
                            detail: String::new(),
                        });
                    }
                }
            }
            Err(e) => {
                let f = ScrapeFailure {
                    url,
                    kind: e.kind(),
                    detail: e.to_string(),
                };
                warn!("{}: fetch failed for {}: {}", adapter.name(), f.url, f.detail);
                failures.push(f);
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    info!(
        "scrape finished: {} records, {} failures",
        records.len(),
        failures.len()
    );
    Ok(ScrapeOutcome { records, failures })
}

// ── Tests ──
