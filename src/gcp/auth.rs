use async_trait::async_trait;
use serde::Deserialize;
use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};
use wreq::Client;

use crate::config::GcpConfig;
use crate::error::PipelineResult;
use crate::fetcher::http::{build_client, check_status, read_json};

/// Source of OAuth access tokens for Google REST APIs.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> PipelineResult<String>;
}

pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        StaticToken(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> PipelineResult<String> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

/// Fetches tokens for the attached service account from the metadata server.
pub struct MetadataTokenProvider {
    client: Client,
    url: String,
    cached: Mutex<Option<(String, Instant)>>,
}

const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

impl MetadataTokenProvider {
    pub fn new(url: impl Into<String>) -> PipelineResult<Self> {
        Ok(MetadataTokenProvider {
            client: build_client(Duration::from_secs(10))?,
            url: url.into(),
            cached: Mutex::new(None),
        })
    }
}

#[async_trait]
impl TokenProvider for MetadataTokenProvider {
    async fn access_token(&self) -> PipelineResult<String> {
        let mut cached = self.cached.lock().await;
        if let Some((token, expires_at)) = cached.as_ref() {
            if Instant::now() + EXPIRY_MARGIN < *expires_at {
                return Ok(token.clone());
            }
        }

        debug!("Requesting access token from metadata server");
        let response = self
            .client
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;
        let response = check_status(response, "metadata token").await?;
        let token: MetadataToken = read_json(response, "metadata token").await?;

        let expires_at = Instant::now() + Duration::from_secs(token.expires_in);
        *cached = Some((token.access_token.clone(), expires_at));
        Ok(token.access_token)
    }
}

/// Static token from the configured environment variable when present, metadata server otherwise.
pub fn token_provider(config: &GcpConfig) -> PipelineResult<Arc<dyn TokenProvider>> {
    if let Ok(token) = env::var(&config.static_token_env) {
        info!("Using access token from {}", config.static_token_env);
        return Ok(Arc::new(StaticToken::new(token)));
    }
    Ok(Arc::new(MetadataTokenProvider::new(config.metadata_url.clone())?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_metadata_token_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .and(header("Metadata-Flavor", "Google"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.token",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = MetadataTokenProvider::new(format!("{}/token", server.uri())).unwrap();
        assert_eq!(provider.access_token().await.unwrap(), "ya29.token");
        assert_eq!(provider.access_token().await.unwrap(), "ya29.token");
    }
}
