use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for the job queue and status channel
    pub redis_url: String,

    /// Default log filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Storage providers in read priority order (e.g. `AWS,MINIO`)
    #[serde(default)]
    pub s3_providers: Vec<String>,

    /// Parser service endpoint
    #[serde(default = "default_parser_url")]
    pub parser_url: String,

    /// Pub/sub channel for job status notifications
    #[serde(default = "default_status_channel")]
    pub status_channel: String,

    /// Redis list holding inbound job requests
    #[serde(default = "default_input_queue")]
    pub input_queue: String,

    /// Stable identity of this worker; names its in-flight processing list.
    /// Every concurrently running worker needs a distinct id.
    #[serde(default = "default_worker_id")]
    pub worker_id: String,

    /// Redis list receiving parsed records
    #[serde(default = "default_output_queue")]
    pub output_queue: String,

    #[serde(default = "default_parser_timeout_secs")]
    pub parser_timeout_secs: u64,

    #[serde(default = "default_storage_timeout_secs")]
    pub storage_timeout_secs: u64,

    /// Prometheus scrape address for the worker. Metrics are not exported when unset.
    #[serde(default)]
    pub metrics_addr: Option<String>,

    /// Per-provider settings, resolved from `<NAME>_*` variables.
    #[serde(skip)]
    pub providers: Vec<ProviderConfig>,
}

/// Bucket and credentials of one object-storage provider.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ProviderSettings {
    pub bucket_name: String,

    /// Custom endpoint for self-hosted S3-compatible mirrors
    #[serde(default)]
    pub s3_url: Option<String>,

    #[serde(default)]
    pub access_key_id: Option<String>,

    #[serde(default)]
    pub secret_access_key: Option<String>,

    #[serde(default = "default_region")]
    pub default_region: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub name: String,
    pub settings: ProviderSettings,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_parser_url() -> String {
    "http://parser:8080/parse".to_string()
}

fn default_status_channel() -> String {
    "parser_statuses".to_string()
}

fn default_input_queue() -> String {
    "parser:jobs".to_string()
}

fn default_worker_id() -> String {
    "worker-0".to_string()
}

fn default_output_queue() -> String {
    "parser:output".to_string()
}

fn default_parser_timeout_secs() -> u64 {
    60
}

fn default_storage_timeout_secs() -> u64 {
    30
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars().collect())
    }

    /// Build the configuration from an explicit set of variables.
    pub fn from_vars(vars: Vec<(String, String)>) -> Result<Self, ConfigError> {
        let mut config: AppConfig = envy::from_iter(vars.clone())?;
        if config.parser_timeout_secs == 0 || config.storage_timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be at least one second".into()));
        }
        config.worker_id = config.worker_id.trim().to_string();
        if config.worker_id.is_empty() {
            return Err(ConfigError::Invalid("WORKER_ID must not be empty".into()));
        }

        let mut providers: Vec<ProviderConfig> = Vec::with_capacity(config.s3_providers.len());
        for name in &config.s3_providers {
            let name = name.trim().to_uppercase();
            if name.is_empty() {
                continue;
            }
            if providers.iter().any(|p| p.name == name) {
                tracing::warn!(provider = %name, "Provider listed twice, keeping first position");
                continue;
            }
            let settings: ProviderSettings =
                envy::prefixed(format!("{}_", name)).from_iter(vars.clone())?;
            providers.push(ProviderConfig { name, settings });
        }
        config.providers = providers;

        Ok(config)
    }

    pub fn parser_timeout(&self) -> Duration {
        Duration::from_secs(self.parser_timeout_secs)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage_timeout_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
