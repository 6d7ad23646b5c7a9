use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::BlobStore;
use crate::error::{PipelineError, PipelineResult};

/// Process-local blob store for dry runs and tests.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn objects(&self) -> PipelineResult<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.objects
            .lock()
            .map_err(|_| PipelineError::Storage("blob store lock poisoned".to_string()))
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, data: &[u8]) -> PipelineResult<()> {
        self.objects()?.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> PipelineResult<Vec<u8>> {
        self.objects()?
            .get(key)
            .cloned()
            .ok_or_else(|| PipelineError::Storage(format!("no object at {}", key)))
    }

    async fn list(&self, prefix: &str) -> PipelineResult<Vec<String>> {
        Ok(self
            .objects()?
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}
