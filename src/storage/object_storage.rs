use async_trait::async_trait;
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::region::Region;
use tracing::info;

use super::BlobStore;
use crate::config::StorageConfig;
use crate::error::{PipelineError, PipelineResult};

/// S3-compatible bucket: GCS through its interoperability endpoint, or MinIO locally.
pub struct ObjectStorage {
    bucket: Bucket,
}

impl ObjectStorage {
    pub fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket_name: &str,
        path_style: bool,
    ) -> PipelineResult<Self> {
        let region = Region::Custom {
            region: region.to_owned(),
            endpoint: endpoint.to_owned(),
        };

        let credentials = Credentials::new(
            Some(access_key),
            Some(secret_key),
            None, // security_token
            None, // session_token
            None, // expiration
        )
        .map_err(|e| PipelineError::Storage(format!("invalid credentials: {}", e)))?;

        let bucket = Bucket::new(bucket_name, region, credentials)?;
        let bucket = if path_style {
            *bucket.with_path_style()
        } else {
            *bucket
        };

        Ok(ObjectStorage { bucket })
    }

    pub fn from_config(config: &StorageConfig) -> PipelineResult<Self> {
        config
            .validate()
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        let access_key = config
            .get_access_key()
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        let secret_key = config
            .get_secret_key()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        Self::new(
            &config.endpoint,
            config.get_region(),
            access_key,
            secret_key,
            &config.bucket_name,
            config.is_path_style(),
        )
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket.name
    }
}

#[async_trait]
impl BlobStore for ObjectStorage {
    async fn put(&self, key: &str, data: &[u8]) -> PipelineResult<()> {
        let response = self.bucket.put_object(key, data).await?;

        if response.status_code() == 200 {
            info!("Stored object: {}", key);
            Ok(())
        } else {
            Err(PipelineError::Storage(format!(
                "Failed to store {}: HTTP {}",
                key,
                response.status_code()
            )))
        }
    }

    async fn get(&self, key: &str) -> PipelineResult<Vec<u8>> {
        let response = self.bucket.get_object(key).await?;

        if response.status_code() == 200 {
            Ok(response.bytes().to_vec())
        } else {
            Err(PipelineError::Storage(format!(
                "Failed to get {}: HTTP {}",
                key,
                response.status_code()
            )))
        }
    }

    async fn list(&self, prefix: &str) -> PipelineResult<Vec<String>> {
        let pages = self.bucket.list(prefix.to_string(), None).await?;

        let mut keys = Vec::new();
        for page in pages {
            for object in page.contents {
                keys.push(object.key);
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageBackend;

    #[test]
    fn test_client_creation() {
        let storage = ObjectStorage::new(
            "https://storage.googleapis.com",
            "auto",
            "GOOG1EXAMPLE",
            "secret",
            "barb-bulk",
            true,
        )
        .unwrap();
        assert_eq!(storage.bucket_name(), "barb-bulk");
    }

    #[test]
    fn test_from_config_requires_credentials() {
        let config = StorageConfig {
            backend: StorageBackend::S3,
            bucket_name: "barb-bulk".to_string(),
            ..StorageConfig::default()
        };
        assert!(matches!(
            ObjectStorage::from_config(&config),
            Err(PipelineError::Config(_))
        ));

        let config = StorageConfig {
            access_key: Some("key".to_string()),
            secret_key: Some("secret".to_string()),
            ..config
        };
        assert!(ObjectStorage::from_config(&config).is_ok());
    }
}
