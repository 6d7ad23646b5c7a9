use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Started,
    Complete,
}

/// An asynchronous batch job on the upstream API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub result_urls: Vec<String>,
}

impl Job {
    pub fn is_complete(&self) -> bool {
        self.status == JobStatus::Complete
    }
}
