use async_trait::async_trait;
use polars::prelude::DataFrame;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};
use wreq::Client;

use super::{sql, WarehouseGateway};
use crate::config::WarehouseConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::fetcher::http::{check_status, read_json};
use crate::gcp::TokenProvider;
use crate::models::TableRef;
use crate::processor::frame::to_ndjson;
use crate::processor::ColumnSpec;

const MULTIPART_BOUNDARY: &str = "barb_pipeline_load_boundary";

/// BigQuery over its v2 REST API.
pub struct BigQueryGateway {
    client: Client,
    base_url: String,
    upload_url: String,
    project_id: String,
    tokens: Arc<dyn TokenProvider>,
    poll_interval: Duration,
    job_timeout: Duration,
}

impl BigQueryGateway {
    pub fn new(
        client: Client,
        config: &WarehouseConfig,
        project_id: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        BigQueryGateway {
            client,
            base_url: config.base_url.clone(),
            upload_url: config.upload_url.clone(),
            project_id: project_id.into(),
            tokens,
            poll_interval: config.job_poll_interval(),
            job_timeout: config.job_timeout(),
        }
    }

    async fn bearer(&self) -> PipelineResult<String> {
        Ok(format!("Bearer {}", self.tokens.access_token().await?))
    }

    async fn send_json(&self, request: wreq::RequestBuilder, context: &str) -> PipelineResult<Value> {
        let response = request
            .header("Authorization", self.bearer().await?)
            .send()
            .await?;
        let response = check_status(response, context)
            .await
            .map_err(|e| PipelineError::Warehouse(e.to_string()))?;
        read_json(response, context).await
    }

    fn job_error(body: &Value) -> Option<String> {
        let error = body
            .pointer("/status/errorResult")
            .or_else(|| body.get("errors").filter(|e| e.as_array().is_some_and(|a| !a.is_empty())))?;
        Some(error.to_string())
    }

    /// Runs a statement and returns its rows as cell values.
    async fn run_query(&self, statement: &str) -> PipelineResult<Vec<Vec<Value>>> {
        debug!("Running query:\n{}", statement);
        let url = format!("{}projects/{}/queries", self.base_url, self.project_id);
        let body = json!({
            "query": statement,
            "useLegacySql": false,
            "timeoutMs": 60000
        });
        let mut reply = self
            .send_json(self.client.post(&url).json(&body), "bigquery query")
            .await?;

        if !reply.get("jobComplete").and_then(|c| c.as_bool()).unwrap_or(false) {
            reply = tokio::time::timeout(self.job_timeout, self.poll_query(&reply))
                .await
                .map_err(|_| PipelineError::Timeout(self.job_timeout, "bigquery query".to_string()))??;
        }

        if let Some(error) = Self::job_error(&reply) {
            return Err(PipelineError::Warehouse(format!("query failed: {}", error)));
        }

        Ok(reply
            .get("rows")
            .and_then(|r| r.as_array())
            .map(|rows| {
                rows.iter()
                    .map(|row| {
                        row.get("f")
                            .and_then(|f| f.as_array())
                            .map(|cells| cells.iter().map(|c| c["v"].clone()).collect::<Vec<_>>())
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn poll_query(&self, submitted: &Value) -> PipelineResult<Value> {
        let job_id = submitted
            .pointer("/jobReference/jobId")
            .and_then(|j| j.as_str())
            .ok_or_else(|| PipelineError::decode("bigquery query", "no jobReference in reply"))?;
        let location = submitted
            .pointer("/jobReference/location")
            .and_then(|l| l.as_str())
            .unwrap_or("");
        let url = format!(
            "{}projects/{}/queries/{}?location={}",
            self.base_url, self.project_id, job_id, location
        );

        loop {
            sleep(self.poll_interval).await;
            let reply = self
                .send_json(self.client.get(&url), "bigquery getQueryResults")
                .await?;
            if reply.get("jobComplete").and_then(|c| c.as_bool()).unwrap_or(false) {
                return Ok(reply);
            }
        }
    }

    async fn wait_for_job(&self, job: Value) -> PipelineResult<Value> {
        let job_id = job
            .pointer("/jobReference/jobId")
            .and_then(|j| j.as_str())
            .ok_or_else(|| PipelineError::decode("bigquery load", "no jobReference in reply"))?
            .to_string();
        let location = job
            .pointer("/jobReference/location")
            .and_then(|l| l.as_str())
            .unwrap_or("")
            .to_string();
        let url = format!(
            "{}projects/{}/jobs/{}?location={}",
            self.base_url, self.project_id, job_id, location
        );

        let mut current = job;
        loop {
            if current.pointer("/status/state").and_then(|s| s.as_str()) == Some("DONE") {
                return Ok(current);
            }
            sleep(self.poll_interval).await;
            current = self.send_json(self.client.get(&url), "bigquery jobs.get").await?;
        }
    }
}

#[async_trait]
impl WarehouseGateway for BigQueryGateway {
    async fn ensure_table(&self, table: &TableRef, columns: &[ColumnSpec]) -> PipelineResult<()> {
        self.run_query(&sql::create_table_if_missing(table, columns)).await?;
        Ok(())
    }

    async fn create_temp_table(&self, raw: &TableRef, temp: &TableRef) -> PipelineResult<()> {
        self.run_query(&sql::create_temp_table(raw, temp)).await?;
        info!("Created temp table {}", temp);
        Ok(())
    }

    async fn load(&self, table: &TableRef, mut frame: DataFrame) -> PipelineResult<usize> {
        let rows = frame.height();
        let data = to_ndjson(&mut frame)?;
        let metadata = json!({
            "configuration": {
                "load": {
                    "destinationTable": {
                        "projectId": table.project,
                        "datasetId": table.dataset,
                        "tableId": table.table
                    },
                    "sourceFormat": "NEWLINE_DELIMITED_JSON",
                    "writeDisposition": "WRITE_APPEND"
                }
            }
        });

        let mut body = Vec::with_capacity(data.len() + 512);
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{m}\r\n--{b}\r\nContent-Type: application/octet-stream\r\n\r\n",
                b = MULTIPART_BOUNDARY,
                m = metadata
            )
            .as_bytes(),
        );
        body.extend_from_slice(&data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());

        let url = format!(
            "{}projects/{}/jobs?uploadType=multipart",
            self.upload_url, self.project_id
        );
        let request = self
            .client
            .post(&url)
            .header(
                "Content-Type",
                format!("multipart/related; boundary={}", MULTIPART_BOUNDARY),
            )
            .body(body);
        let job = self.send_json(request, "bigquery load").await?;

        let done = tokio::time::timeout(self.job_timeout, self.wait_for_job(job))
            .await
            .map_err(|_| PipelineError::Timeout(self.job_timeout, format!("load into {}", table)))??;
        if let Some(error) = Self::job_error(&done) {
            return Err(PipelineError::Warehouse(format!("load into {} failed: {}", table, error)));
        }

        info!("Loaded {} rows into {}", rows, table);
        Ok(rows)
    }

    async fn delete_matching(
        &self,
        raw: &TableRef,
        temp: &TableRef,
        key_columns: &[String],
    ) -> PipelineResult<()> {
        if key_columns.is_empty() {
            return Err(PipelineError::Config(format!(
                "refusing to delete from {} without key columns",
                raw
            )));
        }
        self.run_query(&sql::delete_matching(raw, temp, key_columns)).await?;
        info!("Deleted stale rows from {} matching {}", raw, temp);
        Ok(())
    }

    async fn get_columns(&self, table: &TableRef) -> PipelineResult<Vec<String>> {
        let rows = self.run_query(&sql::get_columns(table)).await?;
        let columns: Vec<String> = rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .filter_map(|cell| cell.as_str().map(|s| s.to_string()))
            .collect();
        if columns.is_empty() {
            return Err(PipelineError::Warehouse(format!("table {} has no columns", table)));
        }
        Ok(columns)
    }

    async fn insert_select(
        &self,
        temp: &TableRef,
        raw: &TableRef,
        columns: &[String],
    ) -> PipelineResult<()> {
        self.run_query(&sql::insert_select(temp, raw, columns)).await?;
        info!("Inserted rows from {} into {}", temp, raw);
        Ok(())
    }

    async fn drop_table(&self, table: &TableRef) -> PipelineResult<()> {
        self.run_query(&sql::drop_table(table)).await?;
        info!("Dropped table {}", table);
        Ok(())
    }
}
