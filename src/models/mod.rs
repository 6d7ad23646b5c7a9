pub mod events;
pub mod job;
pub mod reference;
pub mod report_type;
pub mod work_unit;

pub use job::{Job, JobStatus};
pub use reference::{Advertiser, Buyer, Code, Named, Panel, Station, ViewingStation};
pub use report_type::{EndpointStyle, Keying, ReportType, Sink};
pub use work_unit::{EnumerateRequest, StagedTableHandle, TableRef, Target, WorkUnit};
