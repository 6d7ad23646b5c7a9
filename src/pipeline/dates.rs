use chrono::{Duration, NaiveDate};

use crate::config::OrchestrationConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::models::EnumerateRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Splits `start..=end` into consecutive ranges spanning `window_days + 1` days each,
/// the last one clipped to `end`.
pub fn split_date_range(start: NaiveDate, end: NaiveDate, window_days: i64) -> Vec<DateRange> {
    let window = window_days.max(0);
    let mut ranges = Vec::new();
    let mut current = start;
    while current <= end {
        let range_end = (current + Duration::days(window)).min(end);
        ranges.push(DateRange {
            start: current,
            end: range_end,
        });
        current = range_end + Duration::days(1);
    }
    ranges
}

/// Start and end dates of an enumerate request, defaulting to a lagged lookback window ending before `today`.
pub fn resolve_window(
    request: &EnumerateRequest,
    config: &OrchestrationConfig,
    today: NaiveDate,
) -> PipelineResult<(NaiveDate, NaiveDate)> {
    let end = request
        .end_date
        .unwrap_or_else(|| today - Duration::days(config.lag_days));
    let start = request
        .start_date
        .unwrap_or_else(|| end - Duration::days(config.lookback_days));
    if start > end {
        return Err(PipelineError::Config(format!(
            "start date {} is after end date {}",
            start, end
        )));
    }
    Ok((start, end))
}
