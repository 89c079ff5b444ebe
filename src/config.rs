//! Configuration management
//!
//! Loaded once at startup, validated as a whole, then handed out as immutable
//! per-source [`IngestionSettings`] values.

use crate::error::{FabricError, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub defaults: EngineDefaults,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Deployment environment ("development", "production")
    pub environment: String,
    /// Fallback log filter when RUST_LOG is unset
    pub log_level: String,
    /// Optional log file, written in addition to stdout
    pub log_file: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// SQLite database path
    pub path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertConfig {
    pub telegram: Option<TelegramConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

/// Engine knobs applied to every source unless overridden
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineDefaults {
    pub max_requests_per_window: u32,
    pub rate_limit_window_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub max_errors_before_alert: u32,
    /// Cadence between ingestion cycles
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Source name, stamped on every stored document
    pub name: String,
    /// Target collection in the document store
    pub collection: String,
    /// Endpoint polled by the HTTP source
    pub url: String,
    /// Environment variable holding the API key, if the endpoint needs one
    pub api_key_env: Option<String>,
    /// Header the API key is sent in
    pub api_key_header: Option<String>,
    /// JSON pointer selecting the record inside the response
    pub pointer: Option<String>,
    /// Field whose value becomes the document id (upsert instead of append)
    pub id_field: Option<String>,
    /// Opt into retrying fetch/normalize failures
    #[serde(default)]
    pub retry_fetch: bool,

    pub max_requests_per_window: Option<u32>,
    pub rate_limit_window_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    pub max_errors_before_alert: Option<u32>,
    pub interval_secs: Option<u64>,
}

/// Resolved, immutable settings for one ingester
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionSettings {
    pub source_name: String,
    pub collection: String,
    pub max_requests_per_window: u32,
    pub rate_limit_window: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub max_errors_before_alert: u32,
    pub interval: Duration,
}

impl Config {
    /// Load configuration from file, with `DATA_FABRIC__*` environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix("DATA_FABRIC").separator("__"))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        Ok(config)
    }

    /// Load from default locations
    pub fn load_default() -> anyhow::Result<Self> {
        Self::load_first(&["config.toml", "config.yaml", "~/.config/data-fabric/config.toml"])
    }

    /// Load the first candidate path that exists
    pub(crate) fn load_first(paths: &[&str]) -> anyhow::Result<Self> {
        for path in paths {
            let expanded = shellexpand::tilde(path).into_owned();
            if Path::new(&expanded).exists() {
                return Self::load(&expanded);
            }
        }

        anyhow::bail!("No configuration file found")
    }

    pub fn is_production(&self) -> bool {
        self.system.environment.eq_ignore_ascii_case("production")
    }

    /// Validate against the process environment
    pub fn validate(&self) -> Result<()> {
        self.validate_with(|key| std::env::var(key).ok())
    }

    /// Validate everything and report all problems at once
    pub fn validate_with<F>(&self, env: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut problems = Vec::new();

        check_knobs("defaults", &self.defaults.as_overrides(), &mut problems);

        if self.storage.backend == StorageBackend::Sqlite {
            let expanded = shellexpand::tilde(&self.storage.path).into_owned();
            if expanded.trim().is_empty() {
                problems.push("storage.path is empty".to_string());
            } else if let Some(parent) = Path::new(&expanded).parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    problems.push(format!(
                        "storage.path directory does not exist: {}",
                        parent.display()
                    ));
                }
            }
        }

        if let Some(telegram) = &self.alerts.telegram {
            if telegram.bot_token.is_empty() || telegram.chat_id.is_empty() {
                problems.push("alerts.telegram requires bot_token and chat_id".to_string());
            }
        } else if self.is_production() {
            problems.push("alerts.telegram is required in production".to_string());
        }

        if self.sources.is_empty() {
            problems.push("no sources configured".to_string());
        }

        let mut seen = HashSet::new();
        for (i, source) in self.sources.iter().enumerate() {
            let label = format!("sources[{}]", i);
            if source.name.trim().is_empty() {
                problems.push(format!("{}.name is empty", label));
            } else if !seen.insert(source.name.as_str()) {
                problems.push(format!("{}.name '{}' is duplicated", label, source.name));
            }
            if source.collection.trim().is_empty() {
                problems.push(format!("{}.collection is empty", label));
            }
            if source.url.trim().is_empty() {
                problems.push(format!("{}.url is empty", label));
            }
            if let Some(var) = &source.api_key_env {
                if self.is_production() && env(var).map_or(true, |v| v.is_empty()) {
                    problems.push(format!("{}: environment variable {} is not set", label, var));
                }
            }
            check_knobs(&label, &source.overrides(), &mut problems);
        }

        if problems.is_empty() {
            Ok(())
        } else {
            tracing::error!("Configuration validation failed:\n{}", problems.join("\n"));
            Err(FabricError::Configuration { problems })
        }
    }

    /// Resolve the effective settings for a source
    pub fn settings_for(&self, source: &SourceConfig) -> IngestionSettings {
        let d = &self.defaults;
        IngestionSettings {
            source_name: source.name.clone(),
            collection: source.collection.clone(),
            max_requests_per_window: source
                .max_requests_per_window
                .unwrap_or(d.max_requests_per_window),
            rate_limit_window: Duration::from_secs(
                source.rate_limit_window_secs.unwrap_or(d.rate_limit_window_secs),
            ),
            max_retries: source.max_retries.unwrap_or(d.max_retries),
            retry_base_delay: Duration::from_millis(
                source.retry_base_delay_ms.unwrap_or(d.retry_base_delay_ms),
            ),
            max_errors_before_alert: source
                .max_errors_before_alert
                .unwrap_or(d.max_errors_before_alert),
            interval: Duration::from_secs(source.interval_secs.unwrap_or(d.interval_secs)),
        }
    }
}

/// The knobs that must be non-zero, as optional values
struct Knobs {
    max_requests_per_window: Option<u32>,
    rate_limit_window_secs: Option<u64>,
    max_retries: Option<u32>,
    max_errors_before_alert: Option<u32>,
    interval_secs: Option<u64>,
}

fn check_knobs(label: &str, knobs: &Knobs, problems: &mut Vec<String>) {
    let zero = [
        ("max_requests_per_window", knobs.max_requests_per_window == Some(0)),
        ("rate_limit_window_secs", knobs.rate_limit_window_secs == Some(0)),
        ("max_retries", knobs.max_retries == Some(0)),
        ("max_errors_before_alert", knobs.max_errors_before_alert == Some(0)),
        ("interval_secs", knobs.interval_secs == Some(0)),
    ];
    for (name, is_zero) in zero {
        if is_zero {
            problems.push(format!("{}.{} must be greater than 0", label, name));
        }
    }
}

impl EngineDefaults {
    fn as_overrides(&self) -> Knobs {
        Knobs {
            max_requests_per_window: Some(self.max_requests_per_window),
            rate_limit_window_secs: Some(self.rate_limit_window_secs),
            max_retries: Some(self.max_retries),
            max_errors_before_alert: Some(self.max_errors_before_alert),
            interval_secs: Some(self.interval_secs),
        }
    }
}

impl SourceConfig {
    fn overrides(&self) -> Knobs {
        Knobs {
            max_requests_per_window: self.max_requests_per_window,
            rate_limit_window_secs: self.rate_limit_window_secs,
            max_retries: self.max_retries,
            max_errors_before_alert: self.max_errors_before_alert,
            interval_secs: self.interval_secs,
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            path: "data_fabric.db".to_string(),
        }
    }
}

impl Default for EngineDefaults {
    fn default() -> Self {
        Self {
            max_requests_per_window: 10,
            rate_limit_window_secs: 60,
            max_retries: 3,
            retry_base_delay_ms: 5_000,
            max_errors_before_alert: 10,
            interval_secs: 60,
        }
    }
}
