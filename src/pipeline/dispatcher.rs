use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, error};

use super::stages::Pipeline;
use super::task::StageTask;
use crate::config::OrchestrationConfig;
use crate::error::PipelineResult;
use crate::gcp::CloudTasksClient;

/// Hands a task to the stage that consumes it.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, pipeline: &Pipeline, task: StageTask) -> PipelineResult<()>;
}

/// Runs every hand-off in-process. Downstream failures are logged and counted
/// without failing the stage that handed off.
#[derive(Default)]
pub struct DirectDispatcher {
    dispatched: AtomicUsize,
    failures: AtomicUsize,
}

impl DirectDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatched(&self) -> usize {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Dispatcher for DirectDispatcher {
    async fn dispatch(&self, pipeline: &Pipeline, task: StageTask) -> PipelineResult<()> {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        let name = task.task_name();
        match pipeline.execute(task).await {
            Ok(status) => debug!("{} finished: {}", name, status),
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                error!("{} failed: {}", name, e);
            }
        }
        Ok(())
    }
}

/// Turns every hand-off into a Cloud Tasks task posting to the callback server.
pub struct QueuedDispatcher {
    tasks: CloudTasksClient,
    config: OrchestrationConfig,
}

impl QueuedDispatcher {
    pub fn new(tasks: CloudTasksClient, config: OrchestrationConfig) -> Self {
        QueuedDispatcher { tasks, config }
    }

    pub fn target_url(&self, task: &StageTask) -> String {
        format!(
            "{}/{}",
            self.config.callback_base_url.trim_end_matches('/'),
            task.route()
        )
    }
}

#[async_trait]
impl Dispatcher for QueuedDispatcher {
    async fn dispatch(&self, _pipeline: &Pipeline, task: StageTask) -> PipelineResult<()> {
        let body = task.payload()?;
        self.tasks
            .create_task(
                task.queue(&self.config),
                &task.task_name(),
                &self.target_url(&task),
                &body,
            )
            .await?;
        Ok(())
    }
}
