//! Wires configured backends into a runnable pipeline.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::{
    ExecutionMode, LogFormat, LoggingConfig, PipelineConfig, SecretsBackend, StorageBackend,
    WarehouseBackend,
};
use crate::fetcher::http::build_client;
use crate::fetcher::{BarbClient, Credentials};
use crate::gcp::{token_provider, CloudTasksClient, EnvSecretStore, GcpSecretManager, SecretStore, TokenProvider};
use crate::pipeline::{DirectDispatcher, Dispatcher, Pipeline, PipelineServices, QueuedDispatcher};
use crate::storage::{BlobStore, MemoryBlobStore, ObjectStorage};
use crate::warehouse::{BigQueryGateway, InMemoryWarehouse, WarehouseGateway};

/// Installs the global tracing subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

pub fn secret_store(
    config: &PipelineConfig,
    tokens: Arc<dyn TokenProvider>,
) -> Result<Arc<dyn SecretStore>> {
    let store: Arc<dyn SecretStore> = match config.secrets.backend {
        SecretsBackend::Gcp => Arc::new(GcpSecretManager::new(
            build_client(config.barb.request_timeout())?,
            config.secrets.base_url.clone(),
            config.gcp.project_id.clone(),
            tokens,
        )),
        SecretsBackend::Env => Arc::new(EnvSecretStore),
    };
    Ok(store)
}

/// Authenticated Barb client with credentials from config or the secret store.
pub async fn barb_client(config: &PipelineConfig, secrets: &dyn SecretStore) -> Result<BarbClient> {
    let credentials = Credentials::resolve(&config.barb, secrets)
        .await
        .context("Failed to resolve Barb API credentials")?;
    Ok(BarbClient::new(config.barb.clone(), credentials)?)
}

pub async fn build_pipeline(mut config: PipelineConfig) -> Result<Pipeline> {
    if config.storage.backend == StorageBackend::S3 {
        config
            .storage
            .load_credentials()
            .context("Failed to load object storage credentials")?;
    }
    config.validate().context("Invalid pipeline configuration")?;
    let tokens = token_provider(&config.gcp)?;
    let secrets = secret_store(&config, tokens.clone())?;
    let barb = Arc::new(barb_client(&config, secrets.as_ref()).await?);

    let warehouse: Arc<dyn WarehouseGateway> = match config.warehouse.backend {
        WarehouseBackend::Bigquery => Arc::new(BigQueryGateway::new(
            build_client(config.barb.request_timeout())?,
            &config.warehouse,
            config.gcp.project_id.clone(),
            tokens.clone(),
        )),
        WarehouseBackend::Memory => Arc::new(InMemoryWarehouse::new()),
    };

    let blobs: Arc<dyn BlobStore> = match config.storage.backend {
        StorageBackend::S3 => Arc::new(
            ObjectStorage::from_config(&config.storage)
                .context("Failed to initialize object storage")?,
        ),
        StorageBackend::Memory => Arc::new(MemoryBlobStore::new()),
    };

    let dispatcher: Arc<dyn Dispatcher> = match config.orchestration.mode {
        ExecutionMode::Direct => Arc::new(DirectDispatcher::new()),
        ExecutionMode::Queued => Arc::new(QueuedDispatcher::new(
            CloudTasksClient::new(
                build_client(config.barb.request_timeout())?,
                config.orchestration.tasks_base_url.clone(),
                config.gcp.project_id.clone(),
                config.gcp.location.clone(),
                config.gcp.service_account.clone(),
                tokens,
            ),
            config.orchestration.clone(),
        )),
    };

    info!(
        "Pipeline ready: mode={:?}, warehouse={:?}, storage={:?}",
        config.orchestration.mode, config.warehouse.backend, config.storage.backend
    );

    Ok(Pipeline::new(
        Arc::new(config),
        PipelineServices {
            barb,
            warehouse,
            blobs,
            dispatcher,
        },
    ))
}
