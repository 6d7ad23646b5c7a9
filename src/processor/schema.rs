use crate::models::ReportType;

/// Declared kind of a normalized column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    String,
    Int,
    Bool,
    Timestamp,
    /// Only produced by truncating a timestamp.
    Date,
    /// Nested object or list carried as JSON text.
    Opaque,
}

impl ColumnKind {
    /// Warehouse type used when a raw table has to be created.
    pub fn warehouse_type(&self) -> &'static str {
        match self {
            ColumnKind::String | ColumnKind::Opaque => "STRING",
            ColumnKind::Int => "INT64",
            ColumnKind::Bool => "BOOL",
            ColumnKind::Timestamp => "DATETIME",
            ColumnKind::Date => "DATE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
}

const fn col(name: &'static str, kind: ColumnKind) -> ColumnSpec {
    ColumnSpec { name, kind }
}

use ColumnKind::{Bool, Date, Int, Opaque, String as Str, Timestamp};

pub const DATE_OF_TRANSMISSION: &str = "date_of_transmission";

const ADVERTISING_SPOTS: &[ColumnSpec] = &[
    col("panel_region", Str),
    col("panel_code", Str),
    col("station_name", Str),
    col("station_code", Str),
    col("spot_type", Str),
    col("spot_start_datetime", Timestamp),
    col("spot_duration", Int),
    col("preceding_programme_name", Str),
    col("succeeding_programme_name", Str),
    col("break_type", Str),
    col("position_in_break", Str),
    col("broadcaster_spot_number", Str),
    col("commercial_number", Str),
    col("clearcast_commercial_title", Str),
    col("clearcast_match_group_code", Str),
    col("clearcast_match_group_name", Str),
    col("clearcast_buyer_code", Str),
    col("clearcast_buyer_name", Str),
    col("clearcast_advertiser_code", Str),
    col("clearcast_advertiser_name", Str),
    col("campaign_approval_id", Str),
    col("sales_house_name", Str),
    col("audience_views", Opaque),
    col(DATE_OF_TRANSMISSION, Date),
];

const PROGRAMME_RATINGS: &[ColumnSpec] = &[
    col("panel_code", Str),
    col("panel_region", Str),
    col("is_macro_region", Bool),
    col("station_code", Str),
    col("station_name", Str),
    col("prog_name", Str),
    col("programme_type", Str),
    col("programme_start_datetime", Timestamp),
    col("programme_duration_minutes", Int),
    col("spans_normal_day", Bool),
    col("sponsor_code", Str),
    col("bumpers_included", Bool),
    col("broadcaster_transmission_code", Str),
    col("live_status", Str),
    col("uk_premiere", Bool),
    col("broadcaster_premiere", Bool),
    col("programme_repeat", Bool),
    col("episode_name", Str),
    col("episode_number", Int),
    col("series_number", Str),
    col("number_of_episodes", Int),
    col("broadcaster_series_id", Str),
    col("genre", Str),
    col("platforms", Opaque),
    col("audience_views", Opaque),
    col(DATE_OF_TRANSMISSION, Date),
];

const PROGRAMME_SCHEDULE: &[ColumnSpec] = &[
    col("scheduled_date", Timestamp),
    col("station_code", Str),
    col("station_name", Str),
    col("panel_code", Str),
    col("panel_region", Str),
    col("is_macro_region", Bool),
    col("broadcaster_premier", Bool),
    col("broadcaster_transmission_code", Str),
    col("live_status", Str),
    col("platforms", Opaque),
    col("content_name", Str),
    col("barb_content_id", Str),
    col("broadcaster_content_id", Str),
    col("metabroadcast_content_id", Str),
    col("episode_number", Int),
    col("episode_name", Str),
    col("series_number", Str),
    col("number_of_episodes", Int),
    col("broadcaster_series_id", Str),
    col("genre", Str),
    col("programme_duration", Int),
    col("barb_reporting_datetime", Str),
    col("barb_polling_datetime", Str),
    col("standard_datetime", Timestamp),
    col("programme_type", Str),
    col("repeat", Bool),
    col("spans_normal_day", Bool),
    col("sponsor_code", Str),
    col("bumpers_included", Bool),
    col("transmission_log_programme_name", Str),
    col("uk_premier", Bool),
    col(DATE_OF_TRANSMISSION, Date),
];

const SPOT_SCHEDULE: &[ColumnSpec] = &[
    col("scheduled_date", Timestamp),
    col("station_code", Str),
    col("station_name", Str),
    col("panel_code", Str),
    col("panel_region", Str),
    col("is_macro_region", Bool),
    col("break_type", Str),
    col("broadcaster_spot_number", Str),
    col("campaign_approval_id", Str),
    col("match_group_code", Str),
    col("match_group_name", Str),
    col("buyer_code", Str),
    col("buyer_name", Str),
    col("advertiser_code", Str),
    col("advertiser_name", Str),
    col("holding_company_code", Str),
    col("holding_company_name", Str),
    col("product_code", Str),
    col("product_name", Str),
    col("clearcast_commercial_title", Str),
    col("commercial_spot_length", Str),
    col("clearcast_web_address", Str),
    col("commercial_number", Str),
    col("platforms", Opaque),
    col("position_in_break", Str),
    col("preceeding_programme_name", Str),
    col("sales_house_name", Str),
    col("sales_house_brand_description", Str),
    col("spot_duration", Str),
    col("barb_reporting_datetime", Str),
    col("barb_polling_datetime", Str),
    col("standard_datetime", Timestamp),
    col("spot_type", Str),
    col("succeeding_programme_name", Str),
    col(DATE_OF_TRANSMISSION, Date),
];

const AUDIENCE_BY_TIME: &[ColumnSpec] = &[
    col(DATE_OF_TRANSMISSION, Date),
    col("panel_code", Str),
    col("panel_region", Str),
    col("is_macro_region", Bool),
    col("station_code", Str),
    col("station_name", Str),
    col("activity", Str),
    col("transmission_time_period_duration_mins", Int),
    col("transmission_time_period_start", Timestamp),
    col("platforms", Opaque),
    col("audience_code", Str),
    col("audience_size_hundreds", Int),
    col("category_id", Str),
    col("audience_name", Str),
    col("audience_target_size_hundreds", Int),
];

/// Column layout of a tabular report type, `None` for blob-offloaded types.
pub fn columns_for(report_type: ReportType) -> Option<&'static [ColumnSpec]> {
    match report_type {
        ReportType::AdvertisingSpots => Some(ADVERTISING_SPOTS),
        ReportType::ProgrammeRatings => Some(PROGRAMME_RATINGS),
        ReportType::ProgrammeSchedule => Some(PROGRAMME_SCHEDULE),
        ReportType::SpotSchedule => Some(SPOT_SCHEDULE),
        ReportType::AudienceByTime => Some(AUDIENCE_BY_TIME),
        ReportType::SpotAudience | ReportType::ProgrammeAudience | ReportType::Viewing => None,
    }
}
