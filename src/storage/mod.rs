pub mod memory;
pub mod object_storage;
pub mod offload;

use async_trait::async_trait;

use crate::error::PipelineResult;

pub use memory::MemoryBlobStore;
pub use object_storage::ObjectStorage;
pub use offload::offload_bulk_results;

/// Blob store for oversized bulk results.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, data: &[u8]) -> PipelineResult<()>;
    async fn get(&self, key: &str) -> PipelineResult<Vec<u8>>;
    async fn list(&self, prefix: &str) -> PipelineResult<Vec<String>>;
}
