use serde::{Deserialize, Serialize};

use crate::config::OrchestrationConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{EnumerateRequest, StagedTableHandle, WorkUnit};

/// Message handed from one stage to the next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "payload", rename_all = "snake_case")]
pub enum StageTask {
    Enumerate(EnumerateRequest),
    Request(WorkUnit),
    DeleteStale(StagedTableHandle),
    InsertMerged(StagedTableHandle),
    DropTemp(StagedTableHandle),
}

impl StageTask {
    pub const ROUTES: [&'static str; 5] = [
        "1_enumerate",
        "2_request",
        "3_delete_data",
        "4_insert_data",
        "5_drop_table",
    ];

    /// Callback path segment of the stage that consumes this task.
    pub fn route(&self) -> &'static str {
        match self {
            StageTask::Enumerate(_) => Self::ROUTES[0],
            StageTask::Request(_) => Self::ROUTES[1],
            StageTask::DeleteStale(_) => Self::ROUTES[2],
            StageTask::InsertMerged(_) => Self::ROUTES[3],
            StageTask::DropTemp(_) => Self::ROUTES[4],
        }
    }

    /// API-bound stages share one queue, warehouse-bound stages another.
    pub fn queue<'a>(&self, config: &'a OrchestrationConfig) -> &'a str {
        match self {
            StageTask::Enumerate(_) | StageTask::Request(_) | StageTask::DeleteStale(_) => {
                &config.request_queue
            }
            StageTask::InsertMerged(_) | StageTask::DropTemp(_) => &config.warehouse_queue,
        }
    }

    pub fn task_name(&self) -> String {
        match self {
            StageTask::Enumerate(request) => match (request.start_date, request.end_date) {
                (Some(start), Some(end)) => format!("enumerate-{}--{}", start, end),
                _ => "enumerate-default".to_string(),
            },
            StageTask::Request(unit) => unit.label("request"),
            StageTask::DeleteStale(handle) => format!(
                "{}-delete-{}--{}",
                handle.report_type, handle.start_date, handle.end_date
            ),
            StageTask::InsertMerged(handle) => format!("INSERT-FROM_{}", handle.temp_table.table),
            StageTask::DropTemp(handle) => format!("DROP-TABLE_{}", handle.temp_table.table),
        }
    }

    /// JSON body posted to the stage's route.
    pub fn payload(&self) -> PipelineResult<Vec<u8>> {
        let encoded = match self {
            StageTask::Enumerate(request) => serde_json::to_vec(request),
            StageTask::Request(unit) => serde_json::to_vec(unit),
            StageTask::DeleteStale(handle)
            | StageTask::InsertMerged(handle)
            | StageTask::DropTemp(handle) => serde_json::to_vec(handle),
        };
        encoded.map_err(|e| PipelineError::decode(self.route(), e))
    }

    /// Rebuilds a task from a route and the body posted to it.
    pub fn from_route(route: &str, body: &[u8]) -> PipelineResult<Self> {
        let decode = |e: serde_json::Error| PipelineError::decode(route.to_string(), e);
        match route {
            "1_enumerate" => {
                // Only an empty body means "use the defaults".
                if body.iter().all(|b| b.is_ascii_whitespace()) {
                    return Ok(StageTask::Enumerate(EnumerateRequest::default()));
                }
                Ok(StageTask::Enumerate(serde_json::from_slice(body).map_err(decode)?))
            }
            "2_request" => Ok(StageTask::Request(serde_json::from_slice(body).map_err(decode)?)),
            "3_delete_data" => Ok(StageTask::DeleteStale(serde_json::from_slice(body).map_err(decode)?)),
            "4_insert_data" => Ok(StageTask::InsertMerged(serde_json::from_slice(body).map_err(decode)?)),
            "5_drop_table" => Ok(StageTask::DropTemp(serde_json::from_slice(body).map_err(decode)?)),
            other => Err(PipelineError::Config(format!("unknown stage route {}", other))),
        }
    }
}
