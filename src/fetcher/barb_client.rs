use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;
use wreq::{Client, RequestBuilder, Response};

use super::http::{build_client, check_status, read_json};
use crate::config::BarbConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::gcp::SecretStore;
use crate::models::{Job, JobStatus};

/// Query string pairs in the order they are sent.
pub type Params = Vec<(&'static str, String)>;

#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    /// Literal config values win; otherwise both come from the secret store.
    pub async fn resolve(config: &BarbConfig, secrets: &dyn SecretStore) -> PipelineResult<Self> {
        if let (Some(email), Some(password)) = (&config.email, &config.password) {
            return Ok(Credentials {
                email: email.clone(),
                password: password.clone(),
            });
        }
        Ok(Credentials {
            email: secrets.get_secret(&config.email_secret).await?,
            password: secrets.get_secret(&config.password_secret).await?,
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Authenticated client for the Barb API.
pub struct BarbClient {
    client: Client,
    config: BarbConfig,
    credentials: Credentials,
    token: Mutex<Option<String>>,
}

impl BarbClient {
    pub fn new(config: BarbConfig, credentials: Credentials) -> PipelineResult<Self> {
        let client = build_client(config.request_timeout())?;
        Ok(BarbClient {
            client,
            config,
            credentials,
            token: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &BarbConfig {
        &self.config
    }

    /// Exchanges the credentials for a bearer token.
    pub async fn authenticate(&self) -> PipelineResult<String> {
        let url = format!("{}auth/token/", self.config.normalized_root());
        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("email", &self.credentials.email)
            .append_pair("password", &self.credentials.password)
            .finish();

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(form)
            .send()
            .await?;
        let response = check_status(response, "barb auth").await?;
        let body: Value = read_json(response, "barb auth").await?;

        let access = body
            .get("access")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PipelineError::decode("barb auth", "response has no access token"))?;
        info!("Authenticated against Barb API");
        Ok(format!("Bearer {}", access))
    }

    async fn bearer(&self) -> PipelineResult<String> {
        let mut token = self.token.lock().await;
        if let Some(existing) = token.as_ref() {
            return Ok(existing.clone());
        }
        let fresh = self.authenticate().await?;
        *token = Some(fresh.clone());
        Ok(fresh)
    }

    /// Forgets `stale` unless another request already replaced it.
    async fn invalidate(&self, stale: &str) {
        let mut token = self.token.lock().await;
        if token.as_deref() == Some(stale) {
            *token = None;
        }
    }

    /// Sends an authorized request, re-authenticating once if Barb rejects the cached token.
    async fn send_authorized(
        &self,
        context: &str,
        build: impl Fn(String) -> RequestBuilder,
    ) -> PipelineResult<Response> {
        let bearer = self.bearer().await?;
        let response = build(bearer.clone()).send().await?;
        let status = response.status().as_u16();
        if status != 401 && status != 403 {
            return check_status(response, context).await;
        }

        warn!("Barb rejected the cached token at {} ({}), re-authenticating", context, status);
        self.invalidate(&bearer).await;
        let fresh = self.bearer().await?;
        let retry = build(fresh).send().await?;
        check_status(retry, context).await
    }

    fn endpoint_url(&self, endpoint: &str, params: &[(&'static str, String)]) -> PipelineResult<Url> {
        let root = Url::parse(&self.config.normalized_root())
            .map_err(|e| PipelineError::Config(format!("invalid barb.api_root: {}", e)))?;
        let mut url = root
            .join(endpoint)
            .map_err(|e| PipelineError::Config(format!("invalid endpoint {}: {}", endpoint, e)))?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn get(&self, url: &str) -> PipelineResult<Response> {
        debug!("GET {}", url);
        self.send_authorized(url, |bearer| {
            self.client
                .get(url)
                .header("Authorization", bearer)
                .header("Content-Type", "application/json")
        })
        .await
    }

    /// Walks pages starting at `first`, following `next_header` until it is absent.
    async fn follow_pages(
        &self,
        first: Url,
        next_header: &str,
        mut on_page: impl FnMut(Value, &str) -> PipelineResult<()>,
    ) -> PipelineResult<usize> {
        let mut next = Some(first.to_string());
        let mut pages = 0;

        while let Some(url) = next.take() {
            if pages >= self.config.max_pages {
                warn!("Reached maximum page limit ({}) at {}, stopping", self.config.max_pages, url);
                break;
            }

            let response = self.get(&url).await?;
            let following = response
                .headers()
                .get(next_header)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string());
            let body: Value = read_json(response, &url).await?;
            on_page(body, &url)?;
            pages += 1;

            if following.as_deref() == Some(url.as_str()) {
                warn!("Next page points back at {}, stopping", url);
                break;
            }
            next = following;
        }

        Ok(pages)
    }

    /// Collects the `events` of every page of an events-style endpoint, in page order.
    pub async fn fetch_paginated(&self, endpoint: &str, params: &Params) -> PipelineResult<Vec<Value>> {
        let first = self.endpoint_url(endpoint, params)?;
        let mut events = Vec::new();
        let header = self.config.events_next_header.clone();

        let pages = self
            .follow_pages(first, &header, |body, url| {
                let message = body
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("no events in response")
                    .to_string();
                match body {
                    Value::Object(mut map) => match map.remove("events") {
                        Some(Value::Array(page)) => {
                            events.extend(page);
                            Ok(())
                        }
                        Some(Value::Null) => Ok(()),
                        Some(other) => Err(PipelineError::decode(
                            url,
                            format!("events is not a list: {}", other),
                        )),
                        None => Err(PipelineError::decode(url, message)),
                    },
                    other => Err(PipelineError::decode(
                        url,
                        format!("expected an object with events, got {}", other),
                    )),
                }
            })
            .await?;

        info!("Fetched {} events from {} over {} pages", events.len(), endpoint, pages);
        Ok(events)
    }

    /// Collects the items of every page of a list-style endpoint.
    pub async fn fetch_bulk(&self, endpoint: &str, params: &Params) -> PipelineResult<Vec<Value>> {
        let first = self.endpoint_url(endpoint, params)?;
        let mut items = Vec::new();
        let header = self.config.bulk_next_header.clone();

        let pages = self
            .follow_pages(first, &header, |body, url| match body {
                Value::Array(page) => {
                    items.extend(page);
                    Ok(())
                }
                Value::Object(_) => {
                    items.push(body);
                    Ok(())
                }
                other => Err(PipelineError::decode(
                    url,
                    format!("expected a list or object, got {}", other),
                )),
            })
            .await?;

        info!("Fetched {} items from {} over {} pages", items.len(), endpoint, pages);
        Ok(items)
    }

    /// Starts an asynchronous batch job and returns its id.
    pub async fn submit_async_job(&self, endpoint: &str, body: &Value) -> PipelineResult<String> {
        let url = self.endpoint_url(endpoint, &[])?;
        let response = self
            .send_authorized(url.as_str(), |bearer| {
                self.client
                    .post(url.as_str())
                    .header("Authorization", bearer)
                    .json(body)
            })
            .await?;
        let reply: Value = read_json(response, url.as_str()).await?;

        let job_id = match reply.get("job_id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => return Err(PipelineError::decode(url.as_str(), "response has no job_id")),
        };
        info!("Submitted async job {} to {}", job_id, endpoint);
        Ok(job_id)
    }

    pub async fn poll_job(&self, job_id: &str) -> PipelineResult<Job> {
        let url = self.endpoint_url(&format!("async-batch/results/{}", job_id), &[])?;
        let response = self.get(url.as_str()).await?;
        let body: Value = read_json(response, url.as_str()).await?;

        let status = body
            .get("status")
            .and_then(|s| s.as_str())
            .ok_or_else(|| PipelineError::decode(url.as_str(), "job response has no status"))?;
        if status == "started" {
            return Ok(Job {
                job_id: job_id.to_string(),
                status: JobStatus::Started,
                result_urls: Vec::new(),
            });
        }

        let result_urls: Vec<String> = body
            .get("result")
            .and_then(|r| r.as_array())
            .map(|results| {
                results
                    .iter()
                    .filter_map(|r| r.get("data").and_then(|d| d.as_str()))
                    .map(|d| d.to_string())
                    .collect()
            })
            .unwrap_or_default();
        if result_urls.is_empty() {
            return Err(PipelineError::decode(
                url.as_str(),
                format!("job {} completed without result urls", job_id),
            ));
        }

        Ok(Job {
            job_id: job_id.to_string(),
            status: JobStatus::Complete,
            result_urls,
        })
    }

    /// Polls until the job leaves the started state, bounded by the configured job timeout.
    pub async fn wait_for_job(&self, job_id: &str) -> PipelineResult<Job> {
        let limit = self.config.job_timeout();
        let interval = self.config.job_poll_interval();
        tokio::time::timeout(limit, self.poll_until_complete(job_id, interval))
            .await
            .map_err(|_| PipelineError::Timeout(limit, format!("async job {}", job_id)))?
    }

    async fn poll_until_complete(&self, job_id: &str, interval: Duration) -> PipelineResult<Job> {
        loop {
            let job = self.poll_job(job_id).await?;
            if job.is_complete() {
                info!("Job {} complete, {} files ready", job_id, job.result_urls.len());
                return Ok(job);
            }
            info!("Job {} not ready yet, sleeping {:?}", job_id, interval);
            sleep(interval).await;
        }
    }

    /// Unauthenticated download of a result file link.
    pub async fn download(&self, url: &str) -> PipelineResult<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        let response = check_status(response, url).await?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}
