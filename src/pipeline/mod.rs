//! Five-stage chain: enumerate, request, delete stale rows, insert merged rows, drop the temp table.

pub mod dates;
pub mod dispatcher;
pub mod stages;
pub mod task;

pub use dates::{resolve_window, split_date_range, DateRange};
pub use dispatcher::{DirectDispatcher, Dispatcher, QueuedDispatcher};
pub use stages::{plan_work_units, Pipeline, PipelineServices, ReportOutcome, StageStatus};
pub use task::StageTask;
