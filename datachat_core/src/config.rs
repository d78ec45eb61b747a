//! Runtime configuration.
//!
//! Values come from built-in defaults, then a `.env` file if present, then
//! the process environment. The CLI layers its own flags on top.

use crate::error::{DataChatError, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_MAX_TOKENS: u32 = 500;
pub const DEFAULT_TEMPERATURE: f32 = 0.1;
pub const DEFAULT_FAVORITES_PATH: &str = "data/favorites.json";
pub const DEFAULT_PROMPT_PATH: &str = "system_prompt.txt";
pub const DEFAULT_SAMPLE_PATH: &str = "data/sample_accruals.csv";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub favorites_path: PathBuf,
    pub prompt_path: PathBuf,
    pub sample_path: PathBuf,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            favorites_path: PathBuf::from(DEFAULT_FAVORITES_PATH),
            prompt_path: PathBuf::from(DEFAULT_PROMPT_PATH),
            sample_path: PathBuf::from(DEFAULT_SAMPLE_PATH),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl Config {
    /// Load `.env` (if any) and read configuration from the environment.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. `from_env` passes the
    /// process environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        config.api_key = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty());
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup("DATACHAT_MODEL") {
            config.model = model;
        }
        if let Some(v) = lookup("DATACHAT_MAX_TOKENS") {
            config.max_tokens = parse_var("DATACHAT_MAX_TOKENS", &v)?;
        }
        if let Some(v) = lookup("DATACHAT_TEMPERATURE") {
            config.temperature = parse_var("DATACHAT_TEMPERATURE", &v)?;
        }
        if let Some(v) = lookup("DATACHAT_FAVORITES") {
            config.favorites_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("DATACHAT_PROMPT") {
            config.prompt_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("DATACHAT_SAMPLE") {
            config.sample_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("DATACHAT_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(parse_var("DATACHAT_TIMEOUT_SECS", &v)?);
        }

        Ok(config)
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| DataChatError::Config(format!("invalid value for {}: {:?}", key, value)))
}
