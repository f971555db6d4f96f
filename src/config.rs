use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::sources::{self, SourceKind};

pub const DEFAULT_CONFIG_PATH: &str = "tooldex.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("unknown source '{0}'")]
    UnknownSource(String),
    #[error("source '{0}' has nothing to fetch (needs targets or listing_url)")]
    NoTargets(String),
    #[error("source '{0}': bad url {1}")]
    BadUrl(String, String),
    #[error("invalid scrape delay range (need 0 <= min <= max)")]
    DelayRange,
    #[error("generate pacing must be non-negative")]
    InvalidPacing,
    #[error("GEMINI_API_KEY is not set; export it or put it in .env")]
    MissingApiKey,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_path: PathBuf,
    /// Base url of the published site; keyword articles are keyed under it.
    pub site_base_url: String,
    pub scrape: ScrapeConfig,
    pub generate: GenerateConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub delay_min_secs: f64,
    pub delay_max_secs: f64,
    pub timeout_secs: u64,
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    /// Product pages to fetch directly (detail sources).
    #[serde(default)]
    pub targets: Vec<String>,
    /// Listing page to harvest item links from (listing sources).
    #[serde(default)]
    pub listing_url: Option<String>,
    /// Cap on harvested items per listing.
    #[serde(default = "default_max_items")]
    pub max_items: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerateConfig {
    pub model: String,
    pub endpoint: String,
    /// Seconds between successive generation calls.
    pub interval_secs: f64,
    /// Seconds to back off after a quota rejection.
    pub cooldown_secs: f64,
    /// Pending rows served per run.
    pub batch_size: usize,
    pub priority_category: Option<String>,
    /// Env only, never read from the config file.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: PathBuf::from("data/tooldex.sqlite"),
            site_base_url: "https://tooldex.example.com".into(),
            scrape: ScrapeConfig::default(),
            generate: GenerateConfig::default(),
        }
    }
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        ScrapeConfig {
            delay_min_secs: 1.0,
            delay_max_secs: 3.0,
            timeout_secs: 30,
            sources: default_sources(),
        }
    }
}

impl Default for GenerateConfig {
    fn default() -> Self {
        GenerateConfig {
            model: "gemini-1.5-flash".into(),
            endpoint: "https://generativelanguage.googleapis.com".into(),
            interval_secs: 6.0,
            cooldown_secs: 60.0,
            batch_size: 5,
            priority_category: None,
            api_key: None,
        }
    }
}

fn default_max_items() -> usize {
    10
}

fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig {
            name: "futuretools".into(),
            targets: vec![
                "https://www.futuretools.io/tools/chatgpt".into(),
                "https://www.futuretools.io/tools/midjourney".into(),
                "https://www.futuretools.io/tools/notion-ai".into(),
            ],
            listing_url: None,
            max_items: default_max_items(),
        },
        SourceConfig {
            name: "gadgetflow".into(),
            targets: Vec::new(),
            listing_url: Some("https://thegadgetflow.com/trending/".into()),
            max_items: default_max_items(),
        },
        SourceConfig {
            name: "techbriefs".into(),
            targets: Vec::new(),
            listing_url: Some("https://news.example.com/latest/".into()),
            max_items: default_max_items(),
        },
    ]
}

impl Config {
    /// Load from an explicit path, from ./tooldex.toml when present, or
    /// fall back to built-in defaults. Env vars win over file values,
    /// and a bad config is fatal before any network or db work starts.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let mut cfg = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let p = Path::new(DEFAULT_CONFIG_PATH);
                if p.exists() {
                    Self::from_file(p)?
                } else {
                    Config::default()
                }
            }
        };
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let cfg = toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
        debug!("loaded config from {}", path.display());
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("TOOLDEX_DB") {
            self.db_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SITE_BASE_URL") {
            self.site_base_url = v;
        }
        if let Ok(v) = std::env::var("GEMINI_API_KEY") {
            if !v.is_empty() {
                self.generate.api_key = Some(v);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.scrape;
        if s.delay_min_secs < 0.0 || s.delay_min_secs > s.delay_max_secs {
            return Err(ConfigError::DelayRange);
        }
        if self.generate.interval_secs < 0.0 || self.generate.cooldown_secs < 0.0 {
            return Err(ConfigError::InvalidPacing);
        }

        for sc in &s.sources {
            let adapter = sources::by_name(&sc.name)
                .ok_or_else(|| ConfigError::UnknownSource(sc.name.clone()))?;
            let urls: Vec<&String> = match adapter.kind() {
                SourceKind::Detail => {
                    if sc.targets.is_empty() {
                        return Err(ConfigError::NoTargets(sc.name.clone()));
                    }
                    sc.targets.iter().collect()
                }
                SourceKind::Listing => match &sc.listing_url {
                    Some(u) => vec![u],
                    None => return Err(ConfigError::NoTargets(sc.name.clone())),
                },
            };
            for u in urls {
                url::Url::parse(u)
                    .map_err(|e| ConfigError::BadUrl(sc.name.clone(), format!("{}: {}", u, e)))?;
            }
        }
        Ok(())
    }

    /// Generation commands need the key up front; scraping never does.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.generate
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }
}

impl GenerateConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.interval_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.cooldown_secs)
    }
}

// ── Tests ──
