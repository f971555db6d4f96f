mod config;
mod db;
mod generate;
mod llm;
mod normalize;
mod rate_limit;
mod scrape;
mod sources;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};

use config::Config;
use llm::GeminiClient;
use rate_limit::Pacer;

#[derive(Parser)]
#[command(
    name = "tooldex",
    about = "Product catalog pipeline: scrape sources, generate article bodies"
)]
struct Cli {
    /// Config file (default: ./tooldex.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape configured sources into the catalog
    Scrape {
        /// Only this source (default: all configured)
        #[arg(short, long)]
        source: Option<String>,
        /// Max product pages to fetch
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Generate article bodies for pending products
    Generate {
        /// Max articles this run (default: generate.batch_size)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Serve this category before everything else
        #[arg(long)]
        category: Option<String>,
        /// Write one article from a keyword instead of the catalog
        #[arg(short, long)]
        keyword: Option<String>,
    },
    /// Scrape then generate in one pass
    Run {
        /// Max product pages to fetch
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Catalog statistics
    Stats,
    /// Print a generated article (default: most recently updated)
    Article {
        /// Product url to print
        url: Option<String>,
    },
    /// Pop the next enriched product off the promotion queue
    Promote,
    /// List models the API key can use for generation
    Models,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let cfg = Config::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Scrape { source, limit } => cmd_scrape(&cfg, source.as_deref(), limit).await,
        Commands::Generate {
            limit,
            category,
            keyword,
        } => cmd_generate(&cfg, limit, category.as_deref(), keyword.as_deref()).await,
        Commands::Run { limit } => {
            // Catch a missing key before any scraping happens.
            cfg.require_api_key()?;
            cmd_scrape(&cfg, None, limit).await?;
            cmd_generate(&cfg, None, None, None).await
        }
        Commands::Stats => cmd_stats(&cfg),
        Commands::Article { url } => cmd_article(&cfg, url.as_deref()),
        Commands::Promote => cmd_promote(&cfg),
        Commands::Models => cmd_models(&cfg).await,
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn cmd_scrape(cfg: &Config, source: Option<&str>, limit: Option<usize>) -> anyhow::Result<()> {
    let selected: Vec<config::SourceConfig> = match source {
        Some(name) => {
            let found: Vec<_> = cfg
                .scrape
                .sources
                .iter()
                .filter(|s| s.name == name)
                .cloned()
                .collect();
            if found.is_empty() {
                anyhow::bail!("source '{}' is not configured", name);
            }
            found
        }
        None => cfg.scrape.sources.clone(),
    };

    let conn = db::connect(&cfg.db_path)?;
    db::init_schema(&conn)?;

    println!("Scraping {} source(s)...", selected.len());
    let session = scrape::Session::new(&cfg.scrape)?;
    let outcome = scrape::run(&session, &selected, limit).await?;
    let skipped = outcome.failures_by_kind();

    let (records, counts) = normalize::clean(outcome.records);
    let upserted = db::upsert(&conn, &records)?;

    println!(
        "Extracted {} records: {} kept, {} untitled, {} duplicates; {} upserted.",
        counts.kept + counts.dropped_untitled + counts.deduped,
        counts.kept,
        counts.dropped_untitled,
        counts.deduped,
        upserted
    );
    if !skipped.is_empty() {
        println!("Skipped {} page(s):", skipped.values().sum::<usize>());
        for (kind, n) in &skipped {
            println!("  {:<16} {}", kind, n);
        }
    }
    Ok(())
}

async fn cmd_generate(
    cfg: &Config,
    limit: Option<usize>,
    category: Option<&str>,
    keyword: Option<&str>,
) -> anyhow::Result<()> {
    let api_key = cfg.require_api_key()?;
    let client = GeminiClient::new(&cfg.generate.endpoint, &cfg.generate.model, api_key)?;
    let mut pacer = Pacer::new(cfg.generate.interval(), cfg.generate.cooldown());

    let conn = db::connect(&cfg.db_path)?;
    db::init_schema(&conn)?;

    let summary = match keyword {
        Some(kw) => {
            println!("Generating keyword article for '{}'...", kw);
            generate::run_keyword(&conn, &client, &mut pacer, &cfg.site_base_url, kw).await?
        }
        None => {
            let batch = limit.unwrap_or(cfg.generate.batch_size);
            let priority = category.or(cfg.generate.priority_category.as_deref());
            generate::run(&conn, &client, &mut pacer, batch, priority).await?
        }
    };
    summary.print();
    Ok(())
}

fn cmd_stats(cfg: &Config) -> anyhow::Result<()> {
    let conn = db::connect(&cfg.db_path)?;
    db::init_schema(&conn)?;
    let s = db::get_stats(&conn)?;

    println!("Products:  {}", s.total);
    println!("Pending:   {}", s.pending);
    println!("Enriched:  {}", s.enriched);
    println!("Promoted:  {}", s.promoted);
    if !s.by_category.is_empty() {
        println!("\n--- Categories ---");
        for (cat, n) in &s.by_category {
            println!("  {:<24} {}", truncate(cat, 24), n);
        }
    }
    Ok(())
}

fn cmd_article(cfg: &Config, url: Option<&str>) -> anyhow::Result<()> {
    let conn = db::connect(&cfg.db_path)?;
    db::init_schema(&conn)?;
    match db::fetch_article(&conn, url)? {
        Some(a) => {
            println!("{} [{}]", a.title, a.category);
            println!("{} (updated {})", a.url, a.updated_at);
            println!("{}", "-".repeat(60));
            println!("{}", a.body);
        }
        None => println!("No generated articles yet. Run 'generate' first."),
    }
    Ok(())
}

/// Hand the oldest enriched, un-promoted product to the external
/// posting step and take it out of the queue.
fn cmd_promote(cfg: &Config) -> anyhow::Result<()> {
    let conn = db::connect(&cfg.db_path)?;
    db::init_schema(&conn)?;
    match db::fetch_candidate(&conn)? {
        Some(c) => {
            db::mark_promoted(&conn, &c.url)?;
            println!("Promoting: {} [{}]", c.title, c.category);
            println!("{}", c.url);
        }
        None => println!("No enriched, un-promoted products. Run 'generate' first."),
    }
    Ok(())
}

async fn cmd_models(cfg: &Config) -> anyhow::Result<()> {
    let api_key = cfg.require_api_key()?;
    let client = GeminiClient::new(&cfg.generate.endpoint, &cfg.generate.model, api_key)?;
    let models = client.list_models().await?;
    if models.is_empty() {
        println!("No generation-capable models visible to this key.");
        return Ok(());
    }
    for m in &models {
        println!("{}", m);
    }
    println!("\n{} models support generateContent", models.len());
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
