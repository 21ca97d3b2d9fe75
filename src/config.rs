use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "TagCare";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3";
pub const DEFAULT_MAX_CONCURRENT_GENERATIONS: usize = 4;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "tagcare_lib=info,tagcare=info"
}

/// Get the application data directory
/// ~/TagCare/ on all platforms, falling back to the working directory when
/// no home directory can be determined.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

pub fn default_database_path() -> PathBuf {
    app_data_dir().join("tagcare.db")
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime settings, resolved once at startup and passed down explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub ollama_url: String,
    pub model: String,
    pub max_concurrent_generations: usize,
    /// Character cap on the rendered patient context. Unset keeps full history.
    pub context_max_chars: Option<usize>,
    /// Connect phase only; completions are never cut off.
    pub connect_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_concurrent_generations: DEFAULT_MAX_CONCURRENT_GENERATIONS,
            context_max_chars: None,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset or blank keys keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(path) = get("TAGCARE_DB_PATH") {
            config.database_path = PathBuf::from(path);
        }
        if let Some(url) = get("OLLAMA_URL") {
            config.ollama_url = url;
        }
        if let Some(model) = get("TAGCARE_MODEL") {
            config.model = model;
        }
        if let Some(raw) = get("TAGCARE_MAX_CONCURRENT_GENERATIONS") {
            config.max_concurrent_generations =
                parse_positive("TAGCARE_MAX_CONCURRENT_GENERATIONS", &raw)?;
        }
        if let Some(raw) = get("TAGCARE_CONTEXT_MAX_CHARS") {
            config.context_max_chars = Some(parse_positive("TAGCARE_CONTEXT_MAX_CHARS", &raw)?);
        }
        if let Some(raw) = get("OLLAMA_CONNECT_TIMEOUT_SECS") {
            let secs = parse_positive("OLLAMA_CONNECT_TIMEOUT_SECS", &raw)?;
            config.connect_timeout = Duration::from_secs(secs as u64);
        }

        Ok(config)
    }
}

fn parse_positive(key: &'static str, raw: &str) -> Result<usize, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
        reason,
    };
    let value: usize = raw
        .parse()
        .map_err(|e: std::num::ParseIntError| invalid(e.to_string()))?;
    if value == 0 {
        return Err(invalid("must be greater than zero".into()));
    }
    Ok(value)
}
