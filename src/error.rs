//! Error taxonomy shared by the client, gateway and orchestrator.

use thiserror::Error;

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Network failure or non-2xx response from an upstream service.
    #[error("transport error ({context}): {message}")]
    Transport {
        context: String,
        status: Option<u16>,
        message: String,
    },

    /// Response body could not be decoded into the expected shape.
    #[error("decode error ({context}): {message}")]
    Decode { context: String, message: String },

    /// A named station, panel or viewing station did not resolve to exactly one code.
    #[error("{kind} '{name}' not found ({matches} matches)")]
    NotFound {
        kind: &'static str,
        name: String,
        matches: usize,
    },

    #[error("warehouse error: {0}")]
    Warehouse(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("async job {job_id} failed: {message}")]
    Job { job_id: String, message: String },

    #[error("timed out after {0:?} waiting for {1}")]
    Timeout(std::time::Duration, String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("frame error: {0}")]
    Frame(#[from] polars::prelude::PolarsError),
}

impl PipelineError {
    pub fn transport(context: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        PipelineError::Transport {
            context: context.into(),
            status,
            message: message.into(),
        }
    }

    pub fn decode(context: impl Into<String>, message: impl ToString) -> Self {
        PipelineError::Decode {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Whether redelivering the task at its current stage can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Transport { .. }
                | PipelineError::Warehouse(_)
                | PipelineError::Storage(_)
                | PipelineError::Timeout(..)
        )
    }
}

impl From<wreq::Error> for PipelineError {
    fn from(err: wreq::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());
        let context = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "http".to_string());
        PipelineError::Transport {
            context,
            status,
            message: err.to_string(),
        }
    }
}

impl From<s3::error::S3Error> for PipelineError {
    fn from(err: s3::error::S3Error) -> Self {
        PipelineError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(PipelineError::transport("barb", Some(502), "bad gateway").is_retryable());
        assert!(PipelineError::Warehouse("job failed".into()).is_retryable());
        assert!(!PipelineError::decode("barb", "expected value").is_retryable());
        assert!(
            !PipelineError::NotFound {
                kind: "station",
                name: "BBC".into(),
                matches: 0
            }
            .is_retryable()
        );
        assert!(!PipelineError::Config("missing project".into()).is_retryable());
    }
}
