use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::json;
use std::env;
use std::sync::Arc;
use tracing::info;
use wreq::Client;

use super::auth::TokenProvider;
use crate::error::{PipelineError, PipelineResult};
use crate::fetcher::http::{check_status, read_json};

/// Key/value secret lookup.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, name: &str) -> PipelineResult<String>;
    async fn create_secret(&self, name: &str, payload: &str) -> PipelineResult<()>;
    async fn update_secret(&self, name: &str, payload: &str) -> PipelineResult<()>;
}

#[derive(Debug, Deserialize)]
struct AccessResponse {
    payload: SecretPayload,
}

#[derive(Debug, Deserialize)]
struct SecretPayload {
    data: String,
}

/// Secret Manager over its REST API.
pub struct GcpSecretManager {
    client: Client,
    base_url: String,
    project_id: String,
    tokens: Arc<dyn TokenProvider>,
}

impl GcpSecretManager {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        project_id: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        GcpSecretManager {
            client,
            base_url: base_url.into(),
            project_id: project_id.into(),
            tokens,
        }
    }

    fn secret_url(&self, name: &str) -> String {
        format!("{}projects/{}/secrets/{}", self.base_url, self.project_id, name)
    }

    async fn add_version(&self, name: &str, payload: &str) -> PipelineResult<()> {
        let url = format!("{}:addVersion", self.secret_url(name));
        let body = json!({"payload": {"data": STANDARD.encode(payload.as_bytes())}});
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.tokens.access_token().await?))
            .json(&body)
            .send()
            .await?;
        check_status(response, "secret manager addVersion").await?;
        Ok(())
    }
}

#[async_trait]
impl SecretStore for GcpSecretManager {
    async fn get_secret(&self, name: &str) -> PipelineResult<String> {
        let url = format!("{}/versions/latest:access", self.secret_url(name));
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.tokens.access_token().await?))
            .send()
            .await?;

        if response.status().as_u16() == 404 {
            return Err(PipelineError::NotFound {
                kind: "secret",
                name: name.to_string(),
                matches: 0,
            });
        }

        let response = check_status(response, "secret manager access").await?;
        let access: AccessResponse = read_json(response, "secret manager access").await?;
        let bytes = STANDARD
            .decode(access.payload.data)
            .map_err(|e| PipelineError::decode("secret payload", e))?;
        String::from_utf8(bytes).map_err(|e| PipelineError::decode("secret payload", e))
    }

    async fn create_secret(&self, name: &str, payload: &str) -> PipelineResult<()> {
        let url = format!(
            "{}projects/{}/secrets?secretId={}",
            self.base_url, self.project_id, name
        );
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.tokens.access_token().await?))
            .json(&json!({"replication": {"automatic": {}}}))
            .send()
            .await?;
        check_status(response, "secret manager create").await?;
        self.add_version(name, payload).await?;
        info!("Created secret {}", name);
        Ok(())
    }

    async fn update_secret(&self, name: &str, payload: &str) -> PipelineResult<()> {
        self.add_version(name, payload).await?;
        info!("Added new version of secret {}", name);
        Ok(())
    }
}

/// Reads secrets from environment variables named after the upper-cased secret name.
pub struct EnvSecretStore;

impl EnvSecretStore {
    fn var_name(name: &str) -> String {
        name.to_uppercase().replace('-', "_")
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get_secret(&self, name: &str) -> PipelineResult<String> {
        env::var(Self::var_name(name)).map_err(|_| PipelineError::NotFound {
            kind: "secret",
            name: name.to_string(),
            matches: 0,
        })
    }

    async fn create_secret(&self, name: &str, _payload: &str) -> PipelineResult<()> {
        Err(PipelineError::Config(format!(
            "environment secret store is read-only, set {} instead",
            Self::var_name(name)
        )))
    }

    async fn update_secret(&self, name: &str, payload: &str) -> PipelineResult<()> {
        self.create_secret(name, payload).await
    }
}
