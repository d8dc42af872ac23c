//! Application configuration.
//!
//! Filter rules and polling targets come from a JSON file; secrets, proxies
//! and the feed host come from the environment (optionally via `.env`).

use deals_alerts::DeliveryError;
use deals_core::{DeliveryMode, FilterConfig, FilterRule, ProxyEndpoint, ProxyParseError};
use deals_engine::PersistenceError;
use deals_feeds::{FeedError, DEFAULT_FEED_URL};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Errors that abort startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config files must have a .json extension: {0}")]
    Extension(PathBuf),
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Config is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Required key '{0}' not found in config")]
    MissingKey(&'static str),
    #[error("You have a corrupt configuration: {0}")]
    Invalid(String),
    #[error("Environment variable {0} is not set")]
    MissingEnv(&'static str),
    #[error(transparent)]
    Proxy(#[from] ProxyParseError),
    #[error("Failed to load seen-set: {0}")]
    SeenSet(#[from] PersistenceError),
    #[error("Failed to build feed client: {0}")]
    Feed(#[from] FeedError),
    #[error("Failed to build Telegram client: {0}")]
    Telegram(#[from] DeliveryError),
}

/// Check that a config or data path has a `.json` extension.
pub fn ensure_json_path(path: &Path) -> Result<(), ConfigError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(()),
        _ => Err(ConfigError::Extension(path.to_path_buf())),
    }
}

/// Read, parse and validate the filter configuration file.
pub fn load_filter_config(path: &Path) -> Result<FilterConfig, ConfigError> {
    ensure_json_path(path)?;
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_filter_config(&raw)?;
    info!(
        path = %path.display(),
        filters = config.filters.len(),
        priority_categories = config.priority_category.len(),
        regular_categories = config.regular_category.len(),
        "Config validated"
    );
    Ok(config)
}

/// Parse and validate a filter configuration document.
pub fn parse_filter_config(raw: &str) -> Result<FilterConfig, ConfigError> {
    let document: serde_json::Value = serde_json::from_str(raw)?;
    let object = document
        .as_object()
        .ok_or_else(|| ConfigError::Invalid("top level must be an object".to_string()))?;

    for key in FilterConfig::REQUIRED_KEYS {
        if !object.contains_key(key) {
            return Err(ConfigError::MissingKey(key));
        }
    }

    let config: FilterConfig = serde_json::from_value(document)?;
    validate(&config)?;
    Ok(config)
}

/// Semantic checks serde cannot express.
pub fn validate(config: &FilterConfig) -> Result<(), ConfigError> {
    if config.price_off.is_empty() {
        return Err(ConfigError::Invalid("price_off must not be empty".to_string()));
    }
    if let Some(bad) = config.price_off.iter().find(|&&p| p == 0 || p > 100) {
        return Err(ConfigError::Invalid(format!(
            "price_off values must be within 1..=100, got {}",
            bad
        )));
    }
    if config.priority_category.is_empty() && config.regular_category.is_empty() {
        return Err(ConfigError::Invalid(
            "at least one priority or regular category is required".to_string(),
        ));
    }

    for (index, rule) in config.filters.iter().enumerate() {
        validate_rule(index, rule)?;
    }

    if let Some(pattern) = &config.destination_pattern {
        if let Some(bad) = config.destinations().find(|d| !d.starts_with(pattern.as_str())) {
            return Err(ConfigError::Invalid(format!(
                "destination '{}' does not match pattern '{}'",
                bad, pattern
            )));
        }
    }

    if config.delivery == DeliveryMode::Filtered && config.destinations().next().is_none() {
        return Err(ConfigError::Invalid(
            "filtered delivery needs at least one destination".to_string(),
        ));
    }

    Ok(())
}

fn validate_rule(index: usize, rule: &FilterRule) -> Result<(), ConfigError> {
    let invalid = |msg: String| ConfigError::Invalid(format!("filter #{}: {}", index, msg));

    if rule.role.trim().is_empty() {
        return Err(invalid("role must not be empty".to_string()));
    }

    let criteria = &rule.criteria;
    let bounds = [
        ("average_price", criteria.average_price_min, criteria.average_price_max),
        ("percent_off", criteria.percent_off_min, criteria.percent_off_max),
    ];
    for (name, min, max) in bounds {
        if min.is_some_and(|v| v < 0.0) || max.is_some_and(|v| v < 0.0) {
            return Err(invalid(format!("{} bounds must not be negative", name)));
        }
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                return Err(invalid(format!("{}_min {} exceeds {}_max {}", name, min, name, max)));
            }
        }
    }

    Ok(())
}

/// Parse a comma-separated proxy list. Blank entries are ignored.
pub fn parse_proxies(raw: &str) -> Result<Vec<ProxyEndpoint>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<ProxyEndpoint>().map_err(ConfigError::from))
        .collect()
}

/// Settings read from the environment.
#[derive(Debug, Clone)]
pub struct EnvSettings {
    /// `TELEGRAM_BOT_TOKEN`
    pub bot_token: Option<String>,
    /// `TELEGRAM_CHAT_ID`
    pub chat_id: Option<String>,
    /// `DEAL_PROXIES`
    pub proxies: Vec<ProxyEndpoint>,
    /// `FEED_BASE_URL`
    pub feed_url: String,
}

impl EnvSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let proxies = match get("DEAL_PROXIES") {
            Some(raw) => parse_proxies(&raw)?,
            None => Vec::new(),
        };

        Ok(Self {
            bot_token: get("TELEGRAM_BOT_TOKEN"),
            chat_id: get("TELEGRAM_CHAT_ID"),
            proxies,
            feed_url: get("FEED_BASE_URL").unwrap_or_else(|| DEFAULT_FEED_URL.to_string()),
        })
    }

    /// Bot token, required unless running dry.
    pub fn require_bot_token(&self) -> Result<&str, ConfigError> {
        self.bot_token
            .as_deref()
            .ok_or(ConfigError::MissingEnv("TELEGRAM_BOT_TOKEN"))
    }

    /// Default chat id, required unless running dry.
    pub fn require_chat_id(&self) -> Result<&str, ConfigError> {
        self.chat_id
            .as_deref()
            .ok_or(ConfigError::MissingEnv("TELEGRAM_CHAT_ID"))
    }
}
