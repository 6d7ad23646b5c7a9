use ::config::{Config, Environment, File};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use super::storage_config::StorageConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config/pipeline.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub gcp: GcpConfig,
    pub barb: BarbConfig,
    pub warehouse: WarehouseConfig,
    pub orchestration: OrchestrationConfig,
    pub storage: StorageConfig,
    pub secrets: SecretsConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GcpConfig {
    pub project_id: String,
    pub location: String,
    pub service_account: String,
    pub stage: String,
    /// Overrides the metadata server; useful outside GCP.
    pub static_token_env: String,
    pub metadata_url: String,
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            location: "europe-west2".to_string(),
            service_account: String::new(),
            stage: "dev".to_string(),
            static_token_env: "GOOGLE_OAUTH_ACCESS_TOKEN".to_string(),
            metadata_url: "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BarbConfig {
    pub api_root: String,
    pub events_next_header: String,
    pub bulk_next_header: String,
    pub request_timeout_secs: u64,
    pub job_poll_interval_secs: u64,
    pub job_timeout_secs: u64,
    pub max_pages: usize,
    pub buyer_name: String,
    /// Secret names holding the API credentials.
    pub email_secret: String,
    pub password_secret: String,
    /// Literal credentials for local runs; take precedence over the secret store.
    pub email: Option<String>,
    pub password: Option<String>,
}

impl BarbConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn job_poll_interval(&self) -> Duration {
        Duration::from_secs(self.job_poll_interval_secs)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    /// API root with exactly one trailing slash, so endpoint paths join beneath it.
    pub fn normalized_root(&self) -> String {
        format!("{}/", self.api_root.trim_end_matches('/'))
    }
}

impl Default for BarbConfig {
    fn default() -> Self {
        Self {
            api_root: "https://barb-api.co.uk/api/v1/".to_string(),
            events_next_header: "X-Next".to_string(),
            bulk_next_header: "X-Next".to_string(),
            request_timeout_secs: 300,
            job_poll_interval_secs: 60,
            job_timeout_secs: 3600,
            max_pages: 1000,
            buyer_name: "phd_media_limited".to_string(),
            email_secret: "barb_email".to_string(),
            password_secret: "barb_password".to_string(),
            email: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarehouseBackend {
    Bigquery,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    pub backend: WarehouseBackend,
    pub dataset: String,
    pub base_url: String,
    pub upload_url: String,
    pub job_poll_interval_secs: u64,
    pub job_timeout_secs: u64,
}

impl WarehouseConfig {
    pub fn job_poll_interval(&self) -> Duration {
        Duration::from_secs(self.job_poll_interval_secs)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            backend: WarehouseBackend::Bigquery,
            dataset: "Barb_Data".to_string(),
            base_url: "https://bigquery.googleapis.com/bigquery/v2/".to_string(),
            upload_url: "https://bigquery.googleapis.com/upload/bigquery/v2/".to_string(),
            job_poll_interval_secs: 2,
            job_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Every hand-off runs in-process.
    Direct,
    /// Every hand-off becomes a Cloud Tasks task.
    Queued,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    pub mode: ExecutionMode,
    pub window_days: i64,
    /// Days between today and the default end date.
    pub lag_days: i64,
    /// Days between the default start and end dates.
    pub lookback_days: i64,
    pub query_list: Vec<String>,
    pub station_filter: Option<String>,
    pub panel_filter: Option<String>,
    pub request_queue: String,
    pub warehouse_queue: String,
    pub callback_base_url: String,
    pub tasks_base_url: String,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Queued,
            window_days: 6,
            lag_days: 10,
            lookback_days: 17,
            query_list: crate::models::ReportType::DEFAULT_QUERY_LIST
                .iter()
                .map(|r| r.as_str().to_string())
                .collect(),
            station_filter: None,
            panel_filter: None,
            request_queue: "Barb-queue".to_string(),
            warehouse_queue: "Barb-bq-queue".to_string(),
            callback_base_url: "http://localhost:8080".to_string(),
            tasks_base_url: "https://cloudtasks.googleapis.com/v2/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretsBackend {
    Gcp,
    /// Secret names are read as environment variables.
    Env,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    pub backend: SecretsBackend,
    pub base_url: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            backend: SecretsBackend::Gcp,
            base_url: "https://secretmanager.googleapis.com/v1/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Used when RUST_LOG is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            level: "info".to_string(),
        }
    }
}

/// Deployment variables kept from the function-based deployment, mapped onto config keys.
const LEGACY_ENV: [(&str, &str); 6] = [
    ("PROJECT_ID", "gcp.project_id"),
    ("SERVICE_ACCOUNT", "gcp.service_account"),
    ("STAGE", "gcp.stage"),
    ("BUCKET", "storage.bucket_name"),
    ("EMAIL", "barb.email"),
    ("PASSWORD", "barb.password"),
];

impl PipelineConfig {
    /// Loads `path` (optional), then `BARB__SECTION__KEY` variables, then legacy variables.
    pub fn load(path: &str) -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("BARB")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("orchestration.query_list"),
            );

        for (var, key) in LEGACY_ENV {
            builder = builder
                .set_override_option(key, env::var(var).ok())
                .with_context(|| format!("Failed to apply {}", var))?;
        }

        // ENV marks a local run: hand-offs execute in-process
        if env::var("ENV").is_ok() {
            builder = builder
                .set_override("orchestration.mode", "direct")
                .context("Failed to apply ENV")?;
        }

        let mut config: PipelineConfig = builder
            .build()
            .with_context(|| format!("Failed to read pipeline config: {}", path))?
            .try_deserialize()
            .with_context(|| format!("Failed to parse pipeline config: {}", path))?;

        config.barb.api_root = config.barb.normalized_root();
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.warehouse.backend == WarehouseBackend::Bigquery && self.gcp.project_id.is_empty() {
            return Err(anyhow::anyhow!("gcp.project_id is required for BigQuery"));
        }

        if self.orchestration.mode == ExecutionMode::Queued && self.gcp.service_account.is_empty() {
            return Err(anyhow::anyhow!(
                "gcp.service_account is required for queued execution"
            ));
        }

        if self.orchestration.window_days < 0 {
            return Err(anyhow::anyhow!("orchestration.window_days cannot be negative"));
        }

        self.storage.validate()
    }
}
