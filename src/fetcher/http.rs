use serde::de::DeserializeOwned;
use std::time::Duration;
use wreq::{Client, Response};
use wreq_util::Emulation;

use crate::error::{PipelineError, PipelineResult};

/// Shared HTTP client used for the Barb API and Google REST endpoints.
pub fn build_client(timeout: Duration) -> PipelineResult<Client> {
    Client::builder()
        .emulation(Emulation::Firefox136)
        .timeout(timeout)
        .build()
        .map_err(PipelineError::from)
}

/// Turns a non-2xx response into a transport error carrying the body text.
pub async fn check_status(response: Response, context: &str) -> PipelineResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(PipelineError::transport(
        context,
        Some(status.as_u16()),
        format!("HTTP {}: {}", status, truncate(&body, 512)),
    ))
}

/// Reads the body as JSON. Bodies that do not parse are decode errors.
pub async fn read_json<T: DeserializeOwned>(response: Response, context: &str) -> PipelineResult<T> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| PipelineError::decode(context, e))
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
