//! Flattens per-report event records into typed tables.

use polars::prelude::*;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{info, warn};

use super::coercion::{coerce, Cell};
use super::frame::build_column;
use super::schema::{columns_for, ColumnSpec, DATE_OF_TRANSMISSION};
use crate::error::{PipelineError, PipelineResult};
use crate::models::events::*;
use crate::models::ReportType;

type Record = HashMap<&'static str, Value>;

/// Rows of one report type after flattening and coercion.
#[derive(Debug, Clone)]
pub struct NormalizedTable {
    pub report_type: ReportType,
    pub columns: &'static [ColumnSpec],
    pub rows: Vec<Vec<Cell>>,
}

impl NormalizedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cells of one column in row order.
    pub fn column(&self, name: &str) -> Option<Vec<&Cell>> {
        let index = self.columns.iter().position(|c| c.name == name)?;
        Some(self.rows.iter().map(|row| &row[index]).collect())
    }

    pub fn to_dataframe(&self) -> PipelineResult<DataFrame> {
        let columns = self
            .columns
            .iter()
            .enumerate()
            .map(|(index, spec)| build_column(spec, self.rows.iter().map(|row| &row[index])))
            .collect::<PolarsResult<Vec<_>>>()?;
        Ok(DataFrame::new(columns)?)
    }
}

fn pick<T>(parent: Option<&T>, get: impl FnOnce(&T) -> &Value) -> Value {
    parent.map(get).cloned().unwrap_or(Value::Null)
}

fn decode_events<T: DeserializeOwned>(report_type: ReportType, events: &[Value]) -> Vec<T> {
    let mut decoded = Vec::with_capacity(events.len());
    for (index, event) in events.iter().enumerate() {
        if !event.is_object() {
            warn!("Skipping {} event at index {}: not an object", report_type, index);
            continue;
        }
        match serde_json::from_value::<T>(event.clone()) {
            Ok(record) => decoded.push(record),
            Err(e) => warn!("Skipping {} event at index {}: {}", report_type, index, e),
        }
    }
    decoded
}

fn panel_fields(record: &mut Record, panel: Option<&PanelInfo>) {
    record.insert("panel_code", pick(panel, |p| &p.panel_code));
    record.insert("panel_region", pick(panel, |p| &p.panel_region));
    record.insert("is_macro_region", pick(panel, |p| &p.is_macro_region));
}

fn station_fields(record: &mut Record, station: Option<&StationInfo>) {
    record.insert("station_code", pick(station, |s| &s.station_code));
    record.insert("station_name", pick(station, |s| &s.station_name));
}

fn advertising_spot(e: AdvertisingSpotEvent) -> Record {
    let mut r = Record::new();
    panel_fields(&mut r, e.panel.as_ref());
    station_fields(&mut r, e.station.as_ref());
    let start = pick(e.spot_start_datetime.as_ref(), |d| &d.standard_datetime);
    r.insert(DATE_OF_TRANSMISSION, start.clone());
    r.insert("spot_start_datetime", start);
    r.insert("spot_type", e.spot_type);
    r.insert("spot_duration", e.spot_duration);
    r.insert("preceding_programme_name", e.preceding_programme_name);
    r.insert("succeeding_programme_name", e.succeeding_programme_name);
    r.insert("break_type", e.break_type);
    r.insert("position_in_break", e.position_in_break);
    r.insert("broadcaster_spot_number", e.broadcaster_spot_number);
    r.insert("commercial_number", e.commercial_number);
    let cc = e.clearcast_information.as_ref();
    r.insert("clearcast_commercial_title", pick(cc, |c| &c.clearcast_commercial_title));
    r.insert("clearcast_match_group_code", pick(cc, |c| &c.match_group_code));
    r.insert("clearcast_match_group_name", pick(cc, |c| &c.match_group_name));
    r.insert("clearcast_buyer_code", pick(cc, |c| &c.buyer_code));
    r.insert("clearcast_buyer_name", pick(cc, |c| &c.buyer_name));
    r.insert("clearcast_advertiser_code", pick(cc, |c| &c.advertiser_code));
    r.insert("clearcast_advertiser_name", pick(cc, |c| &c.advertiser_name));
    r.insert("campaign_approval_id", e.campaign_approval_id);
    r.insert("sales_house_name", pick(e.sales_house.as_ref(), |s| &s.sales_house_name));
    r.insert("audience_views", e.audience_views);
    r
}

fn programme_content_fields(r: &mut Record, content: Option<&ProgrammeContent>) {
    let episode = content.and_then(|c| c.episode.as_ref());
    let series = content.and_then(|c| c.series.as_ref());
    r.insert("episode_name", pick(episode, |e| &e.episode_name));
    r.insert("episode_number", pick(episode, |e| &e.episode_number));
    r.insert("series_number", pick(series, |s| &s.series_number));
    r.insert("number_of_episodes", pick(series, |s| &s.number_of_episodes));
    r.insert("broadcaster_series_id", pick(series, |s| &s.broadcaster_series_id));
    r.insert("genre", pick(content, |c| &c.genre));
}

fn programme_rating(e: ProgrammeRatingEvent) -> Record {
    let mut r = Record::new();
    panel_fields(&mut r, e.panel.as_ref());
    station_fields(&mut r, e.station.as_ref());
    let start = pick(e.programme_start_datetime.as_ref(), |d| &d.standard_datetime);
    r.insert(DATE_OF_TRANSMISSION, start.clone());
    r.insert("programme_start_datetime", start);
    r.insert("prog_name", e.transmission_log_programme_name);
    r.insert("programme_type", e.programme_type);
    r.insert("programme_duration_minutes", e.programme_duration);
    r.insert("spans_normal_day", e.spans_normal_day);
    r.insert("sponsor_code", pick(e.sponsor.as_ref(), |s| &s.sponsor_code));
    r.insert("bumpers_included", pick(e.sponsor.as_ref(), |s| &s.bumpers_included));
    r.insert("broadcaster_transmission_code", e.broadcaster_transmission_code);
    r.insert("live_status", e.live_status);
    r.insert("uk_premiere", e.uk_premier);
    r.insert("broadcaster_premiere", e.broadcaster_premier);
    r.insert("programme_repeat", e.repeat);
    programme_content_fields(&mut r, e.programme_content.as_ref());
    r.insert("platforms", e.platforms);
    r.insert("audience_views", e.audience_views);
    r
}

fn schedule_day_fields(
    r: &mut Record,
    scheduled_date: &Value,
    station: Option<&StationInfo>,
    panel: Option<&PanelInfo>,
) {
    r.insert("scheduled_date", scheduled_date.clone());
    station_fields(r, station);
    panel_fields(r, panel);
}

fn datetime_fields(r: &mut Record, start: Option<&BarbDateTime>) {
    let standard = pick(start, |d| &d.standard_datetime);
    r.insert(DATE_OF_TRANSMISSION, standard.clone());
    r.insert("standard_datetime", standard);
    r.insert("barb_reporting_datetime", pick(start, |d| &d.barb_reporting_datetime));
    r.insert("barb_polling_datetime", pick(start, |d| &d.barb_polling_datetime));
}

fn programme_schedule(day: ProgrammeScheduleDay) -> Vec<Record> {
    day.station_schedule
        .into_iter()
        .map(|e| {
            let mut r = Record::new();
            schedule_day_fields(&mut r, &day.scheduled_date, day.station.as_ref(), day.panel.as_ref());
            let content = e.programme_content.as_ref();
            r.insert("broadcaster_premier", e.broadcaster_premier);
            r.insert("broadcaster_transmission_code", e.broadcaster_transmission_code);
            r.insert("live_status", e.live_status);
            r.insert("platforms", e.platforms);
            r.insert("content_name", pick(content, |c| &c.content_name));
            r.insert("barb_content_id", pick(content, |c| &c.barb_content_id));
            r.insert("broadcaster_content_id", pick(content, |c| &c.broadcaster_content_id));
            r.insert(
                "metabroadcast_content_id",
                pick(
                    content.and_then(|c| c.metabroadcast_information.as_ref()),
                    |m| &m.metabroadcast_content_id,
                ),
            );
            programme_content_fields(&mut r, content);
            r.insert("programme_duration", e.programme_duration);
            datetime_fields(&mut r, e.programme_start_datetime.as_ref());
            r.insert("programme_type", e.programme_type);
            r.insert("repeat", e.repeat);
            r.insert("spans_normal_day", e.spans_normal_day);
            r.insert("sponsor_code", pick(e.sponsor.as_ref(), |s| &s.sponsor_code));
            r.insert("bumpers_included", pick(e.sponsor.as_ref(), |s| &s.bumpers_included));
            r.insert("transmission_log_programme_name", e.transmission_log_programme_name);
            r.insert("uk_premier", e.uk_premier);
            r
        })
        .collect()
}

fn spot_schedule(day: SpotScheduleDay) -> Vec<Record> {
    day.spot_schedule
        .into_iter()
        .map(|e| {
            let mut r = Record::new();
            schedule_day_fields(&mut r, &day.scheduled_date, day.station.as_ref(), day.panel.as_ref());
            let cc = e.clearcast_information.as_ref();
            r.insert("break_type", e.break_type);
            r.insert("broadcaster_spot_number", e.broadcaster_spot_number);
            r.insert("campaign_approval_id", e.campaign_approval_id);
            r.insert("match_group_code", pick(cc, |c| &c.match_group_code));
            r.insert("match_group_name", pick(cc, |c| &c.match_group_name));
            r.insert("buyer_code", pick(cc, |c| &c.buyer_code));
            r.insert("buyer_name", pick(cc, |c| &c.buyer_name));
            r.insert("advertiser_code", pick(cc, |c| &c.advertiser_code));
            r.insert("advertiser_name", pick(cc, |c| &c.advertiser_name));
            r.insert("holding_company_code", pick(cc, |c| &c.holding_company_code));
            r.insert("holding_company_name", pick(cc, |c| &c.holding_company_name));
            r.insert("product_code", pick(cc, |c| &c.product_code));
            r.insert("product_name", pick(cc, |c| &c.product_name));
            r.insert("clearcast_commercial_title", pick(cc, |c| &c.clearcast_commercial_title));
            r.insert("commercial_spot_length", pick(cc, |c| &c.commercial_spot_length));
            r.insert("clearcast_web_address", pick(cc, |c| &c.clearcast_web_address));
            r.insert("commercial_number", e.commercial_number);
            r.insert("platforms", e.platforms);
            r.insert("position_in_break", e.position_in_break);
            r.insert("preceeding_programme_name", e.preceeding_programme_name);
            let sales = e.sales_house.as_ref();
            r.insert("sales_house_name", pick(sales, |s| &s.sales_house_name));
            r.insert(
                "sales_house_brand_description",
                pick(sales, |s| &s.sales_house_brand_description),
            );
            r.insert("spot_duration", e.spot_duration);
            datetime_fields(&mut r, e.spot_start_datetime.as_ref());
            r.insert("spot_type", e.spot_type);
            r.insert("succeeding_programme_name", e.succeeding_programme_name);
            r
        })
        .collect()
}

fn audience_by_time(e: AudienceByTimeEvent) -> Vec<Record> {
    e.audience_views
        .iter()
        .map(|view| {
            let mut r = Record::new();
            r.insert(DATE_OF_TRANSMISSION, e.date_of_transmission.clone());
            panel_fields(&mut r, e.panel.as_ref());
            station_fields(&mut r, e.station.as_ref());
            r.insert("activity", e.activity.clone());
            r.insert(
                "transmission_time_period_duration_mins",
                e.transmission_time_period_duration_mins.clone(),
            );
            r.insert(
                "transmission_time_period_start",
                pick(e.transmission_time_period_start.as_ref(), |d| &d.standard_datetime),
            );
            r.insert("platforms", e.platforms.clone());
            r.insert("audience_code", view.audience_code.clone());
            r.insert("audience_size_hundreds", view.audience_size_hundreds.clone());
            r.insert("category_id", view.category_id.clone());
            r.insert("audience_name", view.description.clone());
            r.insert("audience_target_size_hundreds", view.target_size_in_hundreds.clone());
            r
        })
        .collect()
}

/// Flattens raw events of a tabular report type into a coerced table.
pub fn normalize(report_type: ReportType, events: &[Value]) -> PipelineResult<NormalizedTable> {
    let columns = columns_for(report_type).ok_or_else(|| {
        PipelineError::Config(format!("{} is not a tabular report type", report_type))
    })?;

    let records: Vec<Record> = match report_type {
        ReportType::AdvertisingSpots => decode_events(report_type, events)
            .into_iter()
            .map(advertising_spot)
            .collect(),
        ReportType::ProgrammeRatings => decode_events(report_type, events)
            .into_iter()
            .map(programme_rating)
            .collect(),
        ReportType::ProgrammeSchedule => decode_events(report_type, events)
            .into_iter()
            .flat_map(programme_schedule)
            .collect(),
        ReportType::SpotSchedule => decode_events(report_type, events)
            .into_iter()
            .flat_map(spot_schedule)
            .collect(),
        ReportType::AudienceByTime => decode_events(report_type, events)
            .into_iter()
            .flat_map(audience_by_time)
            .collect(),
        ReportType::SpotAudience | ReportType::ProgrammeAudience | ReportType::Viewing => {
            Vec::new()
        }
    };

    let rows: Vec<Vec<Cell>> = records
        .iter()
        .map(|record| {
            columns
                .iter()
                .map(|spec| coerce(spec, record.get(spec.name).unwrap_or(&Value::Null)))
                .collect()
        })
        .collect();

    info!(
        "Normalized {} {} events into {} rows",
        events.len(),
        report_type,
        rows.len()
    );

    Ok(NormalizedTable {
        report_type,
        columns,
        rows,
    })
}
