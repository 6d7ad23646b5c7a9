//! Google Cloud REST adapters: access tokens, Secret Manager and Cloud Tasks.

pub mod auth;
pub mod secrets;
pub mod tasks;

pub use auth::{token_provider, MetadataTokenProvider, StaticToken, TokenProvider};
pub use secrets::{EnvSecretStore, GcpSecretManager, SecretStore};
pub use tasks::CloudTasksClient;
