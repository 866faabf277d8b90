use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::startup::RetryPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "agentsmart.toml";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_AIRTABLE_API_URL: &str = "https://api.airtable.com/v0";
pub const DEFAULT_STATIC_DIR: &str = "documentation";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{0} is required (set it in the environment or the config file)")]
    MissingCredential(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Optional on-disk settings. Every field may be overridden by the
/// environment.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct FileConfig {
    pub port: Option<u16>,
    pub static_dir: Option<PathBuf>,
    #[serde(default)]
    pub airtable: AirtableFileConfig,
    #[serde(default)]
    pub startup: StartupFileConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AirtableFileConfig {
    pub api_key: Option<String>,
    pub base_id: Option<String>,
    pub table_name: Option<String>,
    pub api_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StartupFileConfig {
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

impl FileConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str(&content)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

/// Resolved, immutable configuration. Built once at startup and shared
/// read-only with every component.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub static_dir: PathBuf,
    pub airtable: AirtableConfig,
    pub startup: RetryPolicy,
}

#[derive(Debug, Clone)]
pub struct AirtableConfig {
    pub api_key: String,
    pub base_id: String,
    /// Table used when a request does not name one.
    pub default_table: Option<String>,
    pub api_url: String,
}

impl Config {
    /// Load `AGENTSMART_CONFIG` (or `agentsmart.toml` when present) and
    /// apply the process environment on top.
    pub fn from_environment() -> Result<Self, ConfigError> {
        let file = match std::env::var("AGENTSMART_CONFIG") {
            Ok(path) if !path.is_empty() => FileConfig::load(path)?,
            _ if Path::new(DEFAULT_CONFIG_PATH).exists() => FileConfig::load(DEFAULT_CONFIG_PATH)?,
            _ => FileConfig::default(),
        };

        Self::resolve(file, |key| std::env::var(key).ok())
    }

    /// Merge file settings with an environment lookup. Environment values
    /// win; empty values count as unset.
    pub fn resolve<F>(file: FileConfig, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).filter(|v| !v.is_empty());

        let port = parse_override(&lookup, "PORT")?
            .or(file.port)
            .unwrap_or(DEFAULT_PORT);

        let static_dir = lookup("STATIC_DIR")
            .map(PathBuf::from)
            .or(file.static_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR));

        let api_key = lookup("AIRTABLE_API_KEY")
            .or(file.airtable.api_key)
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingCredential("AIRTABLE_API_KEY"))?;
        let base_id = lookup("AIRTABLE_BASE_ID")
            .or(file.airtable.base_id)
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingCredential("AIRTABLE_BASE_ID"))?;
        let default_table = lookup("AIRTABLE_TABLE_NAME")
            .or(file.airtable.table_name)
            .filter(|v| !v.is_empty());
        let api_url = lookup("AIRTABLE_API_URL")
            .or(file.airtable.api_url)
            .unwrap_or_else(|| DEFAULT_AIRTABLE_API_URL.to_string());

        let defaults = RetryPolicy::default();
        let max_attempts = parse_override(&lookup, "STARTUP_MAX_RETRIES")?
            .or(file.startup.max_retries)
            .unwrap_or(defaults.max_attempts);
        let retry_delay = parse_override(&lookup, "STARTUP_RETRY_DELAY_MS")?
            .or(file.startup.retry_delay_ms)
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry_delay);

        Ok(Self {
            port,
            static_dir,
            airtable: AirtableConfig {
                api_key,
                base_id,
                default_table,
                api_url,
            },
            startup: RetryPolicy {
                max_attempts,
                retry_delay,
            },
        })
    }
}

fn parse_override<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        None => Ok(None),
    }
}
