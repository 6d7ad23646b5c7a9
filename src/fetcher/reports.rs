use serde_json::Value;

use super::barb_client::{BarbClient, Params};
use crate::error::PipelineResult;
use crate::models::{EndpointStyle, ReportType, WorkUnit};

const EVENTS_PAGE_LIMIT: &str = "5000";

/// Query parameters for one work unit of a report type.
pub fn report_params(unit: &WorkUnit, buyer_name: &str) -> Params {
    let start = unit.start_date.format("%Y-%m-%d").to_string();
    let end = unit.end_date.format("%Y-%m-%d").to_string();
    let code = unit.target.code().to_string();

    match unit.report_type {
        ReportType::AdvertisingSpots => vec![
            ("min_transmission_date", start),
            ("max_transmission_date", end),
            ("station_code", code),
            ("buyer_name", buyer_name.to_string()),
            ("consolidated", "true".to_string()),
            ("use_reporting_days", "true".to_string()),
            ("limit", EVENTS_PAGE_LIMIT.to_string()),
        ],
        ReportType::ProgrammeRatings => vec![
            ("min_transmission_date", start),
            ("max_transmission_date", end),
            ("station_code", code),
            ("consolidated", "true".to_string()),
            ("use_reporting_days", "true".to_string()),
            ("limit", EVENTS_PAGE_LIMIT.to_string()),
        ],
        ReportType::AudienceByTime => vec![
            ("min_transmission_date", start),
            ("max_transmission_date", end),
            ("station_code", code),
            ("time_period_length", "15".to_string()),
            ("viewing_status", "consolidated".to_string()),
            ("use_polling_days", "true".to_string()),
            ("limit", EVENTS_PAGE_LIMIT.to_string()),
        ],
        ReportType::ProgrammeSchedule | ReportType::SpotSchedule => vec![
            ("min_scheduled_date", start),
            ("max_scheduled_date", end),
            ("station_code", code),
        ],
        ReportType::SpotAudience | ReportType::ProgrammeAudience | ReportType::Viewing => vec![
            ("min_session_date", start),
            ("max_session_date", end),
            ("panel_code", code),
        ],
    }
}

impl BarbClient {
    /// Fetches every raw item of a work unit's report.
    pub async fn fetch_report(&self, unit: &WorkUnit) -> PipelineResult<Vec<Value>> {
        let params = report_params(unit, &self.config().buyer_name);
        let endpoint = unit.report_type.endpoint();
        match unit.report_type.style() {
            EndpointStyle::Events => self.fetch_paginated(endpoint, &params).await,
            EndpointStyle::Bulk => self.fetch_bulk(endpoint, &params).await,
        }
    }
}
