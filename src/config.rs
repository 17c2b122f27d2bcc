use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::reddit::SortOption;

const DEFAULT_ENV_PREFIX: &str = "RTV";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub reddit: RedditConfig,
    #[serde(default)]
    pub ui: UIConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RedditConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_login_timeout", with = "humantime_serde")]
    pub login_timeout: Duration,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            user_agent: default_user_agent(),
            scopes: default_scopes(),
            redirect_uri: default_redirect_uri(),
            login_timeout: default_login_timeout(),
        }
    }
}

fn default_user_agent() -> String {
    format!("desktop:rtv:{} (terminal reddit viewer)", env!("CARGO_PKG_VERSION"))
}

fn default_scopes() -> Vec<String> {
    [
        "edit",
        "history",
        "identity",
        "mysubreddits",
        "privatemessages",
        "read",
        "report",
        "save",
        "submit",
        "subscribe",
        "vote",
    ]
    .iter()
    .map(|scope| scope.to_string())
    .collect()
}

fn default_redirect_uri() -> String {
    "http://127.0.0.1:65000/".into()
}

fn default_login_timeout() -> Duration {
    Duration::from_secs(120)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UIConfig {
    #[serde(default)]
    pub ascii: bool,
    #[serde(default = "default_loader_delay", with = "humantime_serde")]
    pub loader_delay: Duration,
    #[serde(default = "default_loader_interval", with = "humantime_serde")]
    pub loader_interval: Duration,
    #[serde(default)]
    pub editor: Option<String>,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            ascii: false,
            loader_delay: default_loader_delay(),
            loader_interval: default_loader_interval(),
            editor: None,
        }
    }
}

fn default_loader_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_loader_interval() -> Duration {
    Duration::from_millis(400)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryConfig {
    #[serde(default = "default_history_size")]
    pub size: usize,
    #[serde(default = "default_true")]
    pub persistent: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            size: default_history_size(),
            persistent: true,
        }
    }
}

fn default_history_size() -> usize {
    200
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DefaultsConfig {
    #[serde(default = "default_subreddit")]
    pub subreddit: String,
    #[serde(default)]
    pub sort: SortOption,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            subreddit: default_subreddit(),
            sort: SortOption::default(),
        }
    }
}

fn default_subreddit() -> String {
    "front".into()
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        anyhow::ensure!(
            path.exists(),
            "config: file {} does not exist",
            path.display()
        );
        cfg = merge_config(cfg, read_config_file(path)?);
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            cfg = merge_config(cfg, read_config_file(&default_path)?);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("config: failed to read {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("config: failed to parse {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.reddit.client_id.is_empty() {
        base.reddit.client_id = other.reddit.client_id;
    }
    if !other.reddit.client_secret.is_empty() {
        base.reddit.client_secret = other.reddit.client_secret;
    }
    if !other.reddit.user_agent.is_empty() {
        base.reddit.user_agent = other.reddit.user_agent;
    }
    if !other.reddit.scopes.is_empty() {
        base.reddit.scopes = other.reddit.scopes;
    }
    if !other.reddit.redirect_uri.is_empty() {
        base.reddit.redirect_uri = other.reddit.redirect_uri;
    }
    if !other.reddit.login_timeout.is_zero() {
        base.reddit.login_timeout = other.reddit.login_timeout;
    }

    base.ui.ascii = other.ui.ascii;
    base.ui.loader_delay = other.ui.loader_delay;
    if !other.ui.loader_interval.is_zero() {
        base.ui.loader_interval = other.ui.loader_interval;
    }
    if other.ui.editor.is_some() {
        base.ui.editor = other.ui.editor;
    }

    base.history.size = other.history.size;
    base.history.persistent = other.history.persistent;

    if !other.defaults.subreddit.is_empty() {
        base.defaults.subreddit = other.defaults.subreddit;
    }
    base.defaults.sort = other.defaults.sort;

    base
}

/// Applies `PREFIX_SECTION__KEY=value` variables on top of `cfg`. Values
/// that fail to parse are ignored.
fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "reddit.client_id" => cfg.reddit.client_id = value,
        "reddit.client_secret" => cfg.reddit.client_secret = value,
        "reddit.user_agent" => cfg.reddit.user_agent = value,
        "reddit.redirect_uri" => cfg.reddit.redirect_uri = value,
        "reddit.scopes" => {
            cfg.reddit.scopes = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        "reddit.login_timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.reddit.login_timeout = duration;
            }
        }
        "ui.ascii" => cfg.ui.ascii = parse_bool(&value),
        "ui.loader_delay" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.ui.loader_delay = duration;
            }
        }
        "ui.loader_interval" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.ui.loader_interval = duration;
            }
        }
        "ui.editor" => cfg.ui.editor = Some(value).filter(|v| !v.trim().is_empty()),
        "history.size" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.history.size = parsed;
            }
        }
        "history.persistent" => cfg.history.persistent = parse_bool(&value),
        "defaults.subreddit" => cfg.defaults.subreddit = value,
        "defaults.sort" => {
            if let Some(sort) = SortOption::parse(&value) {
                cfg.defaults.sort = sort;
            }
        }
        _ => {}
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("rtv").join("config.yaml"))
}
