use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
const ENV_PREFIX: &str = "CATALOG_SYNC_";
/// One year; tokio's interval deadlines overflow far beyond this.
const MAX_SCHEDULE_INTERVAL_SECS: u64 = 366 * 24 * 60 * 60;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub catalog: CatalogConfig,
    pub import: ImportConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub base_url: String,
    pub index_file: String,
    pub tmp_dir: PathBuf,
    pub timeout_seconds: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://challenges.coode.sh/food/data/json/".to_string(),
            index_file: "index.txt".to_string(),
            tmp_dir: PathBuf::from("tmp"),
            timeout_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub per_shard_cap: usize,
    pub cooldown_hours: i64,
    pub schedule_interval_secs: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            per_shard_cap: 100,
            cooldown_hours: 24,
            schedule_interval_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/catalog.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub listen_addr: Option<SocketAddr>,
}

impl Config {
    /// Loads `path` (or `config.toml`), then `.env`, then `CATALOG_SYNC_*`
    /// environment overrides. A missing file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Applies overrides from `lookup`, keyed by full environment variable
    /// name.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = var("BASE_URL") {
            self.catalog.base_url = v;
        }
        if let Some(v) = var("INDEX_FILE") {
            self.catalog.index_file = v;
        }
        if let Some(v) = var("TMP_DIR") {
            self.catalog.tmp_dir = PathBuf::from(v);
        }
        if let Some(v) = var("TIMEOUT_SECONDS") {
            self.catalog.timeout_seconds = parse_value("catalog.timeout_seconds", &v)?;
        }
        if let Some(v) = var("PER_SHARD_CAP") {
            self.import.per_shard_cap = parse_value("import.per_shard_cap", &v)?;
        }
        if let Some(v) = var("COOLDOWN_HOURS") {
            self.import.cooldown_hours = parse_value("import.cooldown_hours", &v)?;
        }
        if let Some(v) = var("SCHEDULE_INTERVAL_SECS") {
            self.import.schedule_interval_secs = parse_value("import.schedule_interval_secs", &v)?;
        }
        if let Some(v) = var("DATABASE_PATH") {
            self.storage.database_path = PathBuf::from(v);
        }
        if let Some(v) = var("LOG_DIR") {
            self.logging.log_dir = PathBuf::from(v);
        }
        if let Some(v) = var("METRICS_ADDR") {
            self.metrics.listen_addr = Some(parse_value("metrics.listen_addr", &v)?);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.import.schedule_interval_secs == 0 {
            return Err(invalid("import.schedule_interval_secs", "must be greater than zero"));
        }
        if self.import.schedule_interval_secs > MAX_SCHEDULE_INTERVAL_SECS {
            return Err(invalid(
                "import.schedule_interval_secs",
                &format!("must be at most {MAX_SCHEDULE_INTERVAL_SECS}"),
            ));
        }
        if self.import.cooldown_hours < 0 {
            return Err(invalid("import.cooldown_hours", "must not be negative"));
        }
        if chrono::Duration::try_hours(self.import.cooldown_hours).is_none() {
            return Err(invalid("import.cooldown_hours", "is too large"));
        }
        if self.catalog.base_url.trim().is_empty() {
            return Err(invalid("catalog.base_url", "must not be empty"));
        }
        if self.catalog.index_file.trim().is_empty() {
            return Err(invalid("catalog.index_file", "must not be empty"));
        }
        Ok(())
    }

    /// Saturates instead of panicking on values `validate` would reject.
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::try_hours(self.import.cooldown_hours).unwrap_or(chrono::Duration::MAX)
    }

    pub fn http_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.catalog.timeout_seconds)
    }

    pub fn schedule_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.import.schedule_interval_secs)
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| invalid(key, &format!("`{raw}`: {e}")))
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        message: message.to_string(),
    }
}
