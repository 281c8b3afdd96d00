use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

use crate::query::expression::{BatchKind, ChainLimits};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub exploration: ExplorationConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
}

/// Remote academic search service
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub referer: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Ceiling on in-flight requests, shared by every caller of one client.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Entities per page. Fixed for the lifetime of a client.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_max_expression_length")]
    pub max_expression_length: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key_env: default_service_api_key_env(),
            user_agent: default_user_agent(),
            referer: None,
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            max_concurrency: default_max_concurrency(),
            page_size: default_page_size(),
            max_expression_length: default_max_expression_length(),
        }
    }
}

fn default_endpoint() -> String {
    "https://api.labs.cognitive.microsoft.com/academic/v1.0/".to_string()
}

fn default_service_api_key_env() -> String {
    "ACADEMIC_API_KEY".to_string()
}

fn default_user_agent() -> String {
    format!("pathfinder/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_retries() -> usize {
    3
}

fn default_max_concurrency() -> usize {
    16
}

fn default_page_size() -> usize {
    1000
}

fn default_max_expression_length() -> usize {
    2048
}

/// Maximum number of OR-chained ids per batch query
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Paper ids checked against one cited paper
    #[serde(default = "default_paper_chain")]
    pub paper_chain: usize,
    /// Paper ids checked against one author
    #[serde(default = "default_composite_chain")]
    pub author_chain: usize,
    /// Affiliation ids checked against one author
    #[serde(default = "default_composite_chain")]
    pub affiliation_chain: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            paper_chain: default_paper_chain(),
            author_chain: default_composite_chain(),
            affiliation_chain: default_composite_chain(),
        }
    }
}

fn default_paper_chain() -> usize {
    64
}

fn default_composite_chain() -> usize {
    55
}

/// Bounds on how much of the remote graph one exploration may pull in
#[derive(Debug, Clone, Deserialize)]
pub struct ExplorationConfig {
    /// Upper bound handed to the paginator when listing an author's papers.
    #[serde(default = "default_author_paper_bound")]
    pub author_paper_bound: usize,
    /// Upper bound on citing papers when no citation count is known.
    #[serde(default = "default_citation_bound")]
    pub citation_bound: usize,
    #[serde(default = "default_citation_cache_capacity")]
    pub citation_cache_capacity: usize,
    #[serde(default = "default_estimate_precision")]
    pub estimate_precision: f64,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            author_paper_bound: default_author_paper_bound(),
            citation_bound: default_citation_bound(),
            citation_cache_capacity: default_citation_cache_capacity(),
            estimate_precision: default_estimate_precision(),
        }
    }
}

fn default_author_paper_bound() -> usize {
    10_000
}

fn default_citation_bound() -> usize {
    50_000
}

fn default_citation_cache_capacity() -> usize {
    10_000
}

fn default_estimate_precision() -> f64 {
    0.01
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default = "default_http_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_authless")]
    pub authless: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
            api_key_env: default_http_api_key_env(),
            allowed_origins: default_allowed_origins(),
            authless: default_authless(),
            log_level: default_log_level(),
        }
    }
}

fn default_authless() -> bool {
    false
}

fn default_http_port() -> u16 {
    8080
}

fn default_http_api_key_env() -> String {
    "PATHFINDER_API_KEY".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec![]
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in PATHFINDER_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // Optional; missing .env is fine
        let _ = dotenv::dotenv();

        let config_path = std::env::var("PATHFINDER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::from_toml(&config_str)?;

        std::env::var(&config.service.api_key_env).with_context(|| {
            format!(
                "Environment variable {} not set. Set it in your .env file or as an environment variable with your search service subscription key.",
                config.service.api_key_env
            )
        })?;

        Ok(config)
    }

    /// Parse and validate a TOML document without touching the environment
    pub fn from_toml(config_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(config_str).context("Failed to parse config.toml")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        url::Url::parse(&self.service.endpoint)
            .with_context(|| format!("service.endpoint is not a valid URL: {}", self.service.endpoint))?;

        if self.service.page_size == 0 {
            anyhow::bail!("service.page_size must be greater than 0");
        }

        if self.service.max_concurrency == 0 {
            anyhow::bail!("service.max_concurrency must be greater than 0");
        }

        if self.service.timeout_ms == 0 {
            anyhow::bail!("service.timeout_ms must be greater than 0");
        }

        let limits = ChainLimits::from(&self.limits);
        for kind in BatchKind::ALL {
            let cap = limits.cap(kind);
            if cap == 0 {
                anyhow::bail!("limits: {:?} chain cap must be greater than 0", kind);
            }
            let worst = ChainLimits::worst_case_length(kind, cap);
            if worst > self.service.max_expression_length {
                anyhow::bail!(
                    "limits: {:?} chain of {} ids can reach {} characters, over service.max_expression_length ({})",
                    kind,
                    cap,
                    worst,
                    self.service.max_expression_length
                );
            }
        }

        if !(self.exploration.estimate_precision > 0.0 && self.exploration.estimate_precision < 1.0) {
            anyhow::bail!("exploration.estimate_precision must be between 0.0 and 1.0 (exclusive)");
        }

        if self.exploration.author_paper_bound == 0 || self.exploration.citation_bound == 0 {
            anyhow::bail!("exploration bounds must be greater than 0");
        }

        Ok(())
    }
}
