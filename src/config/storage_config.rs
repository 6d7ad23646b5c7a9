use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// S3-compatible bucket (GCS interoperability, MinIO).
    S3,
    Memory,
}

/// Object storage for offloaded bulk files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub endpoint: String,
    pub bucket_name: String,
    pub region: Option<String>,
    pub path_style: Option<bool>,
    pub ssl: Option<bool>,
    // Names of the environment variables holding the HMAC credentials
    pub env_access_key: Option<String>,
    pub env_secret_key: Option<String>,
    #[serde(skip)]
    pub access_key: Option<String>,
    #[serde(skip)]
    pub secret_key: Option<String>,
}

impl StorageConfig {
    pub fn load_credentials(&mut self) -> Result<()> {
        let access_key_var = self
            .env_access_key
            .as_deref()
            .unwrap_or("STORAGE_ACCESS_KEY");
        let secret_key_var = self
            .env_secret_key
            .as_deref()
            .unwrap_or("STORAGE_SECRET_KEY");

        self.access_key = env::var(access_key_var)
            .with_context(|| format!("Missing environment variable: {}", access_key_var))?
            .into();

        self.secret_key = env::var(secret_key_var)
            .with_context(|| format!("Missing environment variable: {}", secret_key_var))?
            .into();

        Ok(())
    }

    pub fn get_access_key(&self) -> Result<&str> {
        self.access_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Access key not loaded"))
    }

    pub fn get_secret_key(&self) -> Result<&str> {
        self.secret_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Secret key not loaded"))
    }

    pub fn is_ssl(&self) -> bool {
        self.ssl
            .unwrap_or_else(|| self.endpoint.starts_with("https://"))
    }

    pub fn is_path_style(&self) -> bool {
        self.path_style.unwrap_or(true)
    }

    pub fn get_region(&self) -> &str {
        self.region.as_deref().unwrap_or("auto")
    }

    pub fn validate(&self) -> Result<()> {
        if self.backend == StorageBackend::Memory {
            return Ok(());
        }

        if self.endpoint.is_empty() {
            return Err(anyhow::anyhow!("Storage endpoint cannot be empty"));
        }

        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(anyhow::anyhow!(
                "Storage endpoint must start with http:// or https://"
            ));
        }

        if self.bucket_name.is_empty() {
            return Err(anyhow::anyhow!("Bucket name cannot be empty"));
        }

        if self.access_key.is_none() {
            return Err(anyhow::anyhow!("Storage access key not loaded"));
        }

        if self.secret_key.is_none() {
            return Err(anyhow::anyhow!("Storage secret key not loaded"));
        }

        Ok(())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::S3,
            endpoint: "https://storage.googleapis.com".to_string(),
            bucket_name: String::new(),
            region: Some("auto".to_string()),
            path_style: Some(true),
            ssl: None,
            env_access_key: None,
            env_secret_key: None,
            access_key: None,
            secret_key: None,
        }
    }
}
