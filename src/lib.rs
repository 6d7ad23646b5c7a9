//! Barb audience data into BigQuery through a five-stage, queue-driven pipeline.

pub mod app;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod gcp;
pub mod models;
pub mod pipeline;
pub mod processor;
pub mod server;
pub mod storage;
pub mod warehouse;

pub use error::{PipelineError, PipelineResult};
