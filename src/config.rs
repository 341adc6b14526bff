use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::client::{ClientConfig, DEFAULT_BASE_URL};
use crate::feed::{AppDetails, LocationFeed};
use crate::layout::Density;
use crate::scroll::PAGE_SIZE;

const DEFAULT_ENV_PREFIX: &str = "NOSCROLL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Raw `Cookie` header value for the session.
    #[serde(default)]
    pub cookie: Option<String>,
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub reddit_users: Vec<String>,
    #[serde(default)]
    pub feeds: Vec<LocationFeed>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            timeout: default_timeout(),
            cookie: None,
            authenticated: false,
            reddit_users: Vec::new(),
            feeds: Vec::new(),
        }
    }
}

impl ServiceConfig {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            user_agent: self.user_agent.clone(),
            base_url: Some(self.base_url.clone()),
            timeout: Some(self.timeout),
            cookie: self.cookie.clone(),
            http_client: None,
        }
    }

    pub fn app_details(&self) -> AppDetails {
        AppDetails {
            is_authenticated: self.authenticated,
            reddit_users: self.reddit_users.clone(),
            feeds: self.feeds.clone(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    format!("noscroll/{}", crate::VERSION)
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    #[serde(default = "default_flush_interval", with = "humantime_serde")]
    pub flush_interval: Duration,
    #[serde(default = "default_resize_poll_interval", with = "humantime_serde")]
    pub resize_poll_interval: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            flush_interval: default_flush_interval(),
            resize_poll_interval: default_resize_poll_interval(),
        }
    }
}

fn default_flush_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_resize_poll_interval() -> Duration {
    Duration::from_secs(1)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayoutConfig {
    #[serde(default)]
    pub density: Density,
    #[serde(default)]
    pub show_nsfw: bool,
    #[serde(default = "default_overflow_fraction")]
    pub overflow_fraction: f64,
    #[serde(default = "default_min_item_width")]
    pub min_item_width: f64,
    #[serde(default = "default_max_expansion")]
    pub max_expansion: f64,
    #[serde(default = "default_no_embed_slot_width")]
    pub no_embed_slot_width: f64,
    #[serde(default = "default_max_columns")]
    pub max_columns: usize,
    #[serde(default = "default_lookahead")]
    pub lookahead: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            density: Density::default(),
            show_nsfw: false,
            overflow_fraction: default_overflow_fraction(),
            min_item_width: default_min_item_width(),
            max_expansion: default_max_expansion(),
            no_embed_slot_width: default_no_embed_slot_width(),
            max_columns: default_max_columns(),
            lookahead: default_lookahead(),
        }
    }
}

fn default_overflow_fraction() -> f64 {
    0.95
}

fn default_min_item_width() -> f64 {
    120.0
}

fn default_max_expansion() -> f64 {
    2.5
}

fn default_no_embed_slot_width() -> f64 {
    400.0
}

fn default_max_columns() -> usize {
    4
}

fn default_lookahead() -> usize {
    PAGE_SIZE / 2
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    let path = options.config_file.or_else(default_config_path);
    if let Some(path) = path.as_ref() {
        if path.exists() {
            cfg = read_config_file(path)?;
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix)?;

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn apply_env(cfg: &mut Config, prefix: &str) -> Result<()> {
    let upper_prefix = format!("{}_", prefix.to_uppercase());
    let mut vars: Vec<(String, String)> = env::vars()
        .filter_map(|(key, value)| {
            key.strip_prefix(&upper_prefix)
                .map(|stripped| (stripped.to_ascii_lowercase().replace("__", "."), value))
        })
        .collect();
    vars.sort();

    for (key, value) in vars {
        apply_env_value(cfg, &key, value)
            .with_context(|| format!("invalid value for {upper_prefix}{}", key.to_uppercase().replace('.', "__")))?;
    }
    Ok(())
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) -> Result<()> {
    match key {
        "service.base_url" => cfg.service.base_url = value,
        "service.user_agent" => cfg.service.user_agent = value,
        "service.timeout" => cfg.service.timeout = humantime::parse_duration(&value)?,
        "service.cookie" => cfg.service.cookie = Some(value),
        "service.authenticated" => cfg.service.authenticated = parse_bool(&value),
        "service.reddit_users" => cfg.service.reddit_users = split_list(&value),
        "feed.flush_interval" => cfg.feed.flush_interval = humantime::parse_duration(&value)?,
        "feed.resize_poll_interval" => {
            cfg.feed.resize_poll_interval = humantime::parse_duration(&value)?
        }
        "layout.density" => {
            cfg.layout.density = Density::from_name(&value.to_ascii_lowercase())
                .with_context(|| format!("unknown density {value}"))?
        }
        "layout.show_nsfw" => cfg.layout.show_nsfw = parse_bool(&value),
        "layout.overflow_fraction" => cfg.layout.overflow_fraction = value.parse()?,
        "layout.min_item_width" => cfg.layout.min_item_width = value.parse()?,
        "layout.max_expansion" => cfg.layout.max_expansion = value.parse()?,
        "layout.no_embed_slot_width" => cfg.layout.no_embed_slot_width = value.parse()?,
        "layout.max_columns" => cfg.layout.max_columns = value.parse()?,
        "layout.lookahead" => cfg.layout.lookahead = value.parse()?,
        "logging.level" => cfg.logging.level = value,
        _ => {}
    }
    Ok(())
}

fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "True" | "yes")
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("noscroll").join("config.yaml"))
}
