use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub cache: CacheConfig,

    pub history: HistoryConfig,

    pub alerts: AlertsConfig,

    pub monitor: MonitorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            cache: CacheConfig::default(),
            history: HistoryConfig::default(),
            alerts: AlertsConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    /// Cache lives in its own database so it can be wiped or deleted
    /// without touching alerts or fare history.
    pub cache_database_path: String,

    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .map_or_else(|| PathBuf::from("data"), |home| home.join(".milewatch"));

        Self {
            database_path: format!("sqlite:{}", data_dir.join("milewatch.db").display()),
            cache_database_path: format!("sqlite:{}", data_dir.join("cache.db").display()),
            log_level: "info".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long a cached search result stays servable (default: 4)
    pub ttl_hours: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_hours: 4 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Window for trend queries and new-low comparisons (default: 30)
    pub lookback_days: i64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { lookback_days: 30 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// Suppress re-fires of the same match within this window (default: 24)
    pub dedup_hours: i64,

    /// How many days of departures each sweep searches (default: 7)
    pub lookahead_days: i64,

    /// Webhook request timeout in seconds (default: 10)
    pub webhook_timeout_seconds: u64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            dedup_hours: 24,
            lookahead_days: 7,
            webhook_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled: bool,

    pub check_interval_minutes: u32,

    pub cron_expression: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_minutes: 60,
            cron_expression: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::default_config_path();
        self.save_to_path(&path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("milewatch").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".milewatch").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.ttl_hours <= 0 {
            anyhow::bail!("Cache TTL must be > 0 hours");
        }

        if self.alerts.lookahead_days <= 0 {
            anyhow::bail!("Alert look-ahead must be > 0 days");
        }

        if self.alerts.dedup_hours < 0 {
            anyhow::bail!("Alert dedup window cannot be negative");
        }

        if self.monitor.enabled
            && self.monitor.check_interval_minutes == 0
            && self.monitor.cron_expression.is_none()
        {
            anyhow::bail!("Monitor interval must be > 0 or cron expression must be set");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.cache.ttl_hours, 4);
        assert_eq!(config.history.lookback_days, 30);
        assert_eq!(config.alerts.dedup_hours, 24);
        assert_eq!(config.alerts.lookahead_days, 7);
        assert!(config.monitor.enabled);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[cache]"));
        assert!(toml_str.contains("[alerts]"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.cache.ttl_hours = 12;
        config.alerts.lookahead_days = 14;

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.cache.ttl_hours, 12);
        assert_eq!(parsed.alerts.lookahead_days, 14);
    }

    #[test]
    fn test_validation_rejects_zero_ttl() {
        let mut config = Config::default();
        config.cache.ttl_hours = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config = toml::from_str("[cache]\nttl_hours = 2\n").unwrap();
        assert_eq!(config.cache.ttl_hours, 2);
        assert_eq!(config.history.lookback_days, 30);
    }
}
