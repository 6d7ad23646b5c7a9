use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use wreq::Client;

use super::auth::TokenProvider;
use crate::error::PipelineResult;
use crate::fetcher::http::check_status;

const MAX_TASK_ID_LEN: usize = 500;

/// Timestamp-prefixed task id restricted to `[A-Za-z0-9_-]`.
pub fn task_id(name: &str) -> String {
    let raw = format!("{}_{}", Utc::now().format("%Y-%m-%d %H:%M:%S%.6f"), name);
    let mut id = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            ':' => id.push('-'),
            '.' => id.push('_'),
            ' ' => id.push_str("__"),
            c if c.is_ascii_alphanumeric() || c == '_' || c == '-' => id.push(c),
            _ => id.push('_'),
        }
    }
    id.truncate(MAX_TASK_ID_LEN);
    id
}

/// Creates HTTP-target tasks through the Cloud Tasks REST API.
pub struct CloudTasksClient {
    client: Client,
    base_url: String,
    project_id: String,
    location: String,
    service_account: String,
    tokens: Arc<dyn TokenProvider>,
}

impl CloudTasksClient {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        project_id: impl Into<String>,
        location: impl Into<String>,
        service_account: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        CloudTasksClient {
            client,
            base_url: base_url.into(),
            project_id: project_id.into(),
            location: location.into(),
            service_account: service_account.into(),
            tokens,
        }
    }

    fn queue_path(&self, queue: &str) -> String {
        format!(
            "projects/{}/locations/{}/queues/{}",
            self.project_id, self.location, queue
        )
    }

    /// Enqueues a POST of `body` to `target_url`, authenticated with an OIDC token for the service account.
    pub async fn create_task(
        &self,
        queue: &str,
        name: &str,
        target_url: &str,
        body: &[u8],
    ) -> PipelineResult<String> {
        let queue_path = self.queue_path(queue);
        let task_name = format!("{}/tasks/{}", queue_path, task_id(name));
        let payload = json!({
            "task": {
                "name": task_name,
                "httpRequest": {
                    "url": target_url,
                    "httpMethod": "POST",
                    "headers": {"Content-Type": "application/json"},
                    "body": STANDARD.encode(body),
                    "oidcToken": {
                        "serviceAccountEmail": self.service_account,
                        "audience": target_url
                    }
                }
            }
        });

        let response = self
            .client
            .post(format!("{}{}/tasks", self.base_url, queue_path))
            .header("Authorization", format!("Bearer {}", self.tokens.access_token().await?))
            .json(&payload)
            .send()
            .await?;
        check_status(response, "cloud tasks create").await?;

        info!("Queued task {} on {}", task_name, queue);
        Ok(task_name)
    }
}
