//! Per-report event records as returned by the Barb API.
//!
//! Leaf values are kept as raw JSON so the normalizer's coercion pass can
//! decide what survives. Nested objects are optional and decoded leniently:
//! a sub-object of the wrong shape reads as absent instead of failing the event.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    Ok(serde_json::from_value(value).ok())
}

fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PanelInfo {
    pub panel_code: Value,
    pub panel_region: Value,
    pub is_macro_region: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StationInfo {
    pub station_code: Value,
    pub station_name: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BarbDateTime {
    pub standard_datetime: Value,
    pub barb_reporting_datetime: Value,
    pub barb_polling_datetime: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClearcastInformation {
    pub clearcast_commercial_title: Value,
    pub match_group_code: Value,
    pub match_group_name: Value,
    pub buyer_code: Value,
    pub buyer_name: Value,
    pub advertiser_code: Value,
    pub advertiser_name: Value,
    pub holding_company_code: Value,
    pub holding_company_name: Value,
    pub product_code: Value,
    pub product_name: Value,
    pub commercial_spot_length: Value,
    pub clearcast_web_address: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SalesHouse {
    pub sales_house_name: Value,
    pub sales_house_brand_description: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Sponsor {
    pub sponsor_code: Value,
    pub bumpers_included: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Episode {
    pub episode_number: Value,
    pub episode_name: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Series {
    pub series_number: Value,
    pub number_of_episodes: Value,
    pub broadcaster_series_id: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetabroadcastInformation {
    pub metabroadcast_content_id: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProgrammeContent {
    pub content_name: Value,
    pub barb_content_id: Value,
    pub broadcaster_content_id: Value,
    #[serde(deserialize_with = "lenient")]
    pub metabroadcast_information: Option<MetabroadcastInformation>,
    #[serde(deserialize_with = "lenient")]
    pub episode: Option<Episode>,
    #[serde(deserialize_with = "lenient")]
    pub series: Option<Series>,
    pub genre: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AudienceView {
    pub audience_code: Value,
    pub audience_size_hundreds: Value,
    pub category_id: Value,
    pub description: Value,
    pub target_size_in_hundreds: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AdvertisingSpotEvent {
    #[serde(deserialize_with = "lenient")]
    pub panel: Option<PanelInfo>,
    #[serde(deserialize_with = "lenient")]
    pub station: Option<StationInfo>,
    pub spot_type: Value,
    #[serde(deserialize_with = "lenient")]
    pub spot_start_datetime: Option<BarbDateTime>,
    pub spot_duration: Value,
    pub preceding_programme_name: Value,
    pub succeeding_programme_name: Value,
    pub break_type: Value,
    pub position_in_break: Value,
    pub broadcaster_spot_number: Value,
    pub commercial_number: Value,
    #[serde(deserialize_with = "lenient")]
    pub clearcast_information: Option<ClearcastInformation>,
    pub campaign_approval_id: Value,
    #[serde(deserialize_with = "lenient")]
    pub sales_house: Option<SalesHouse>,
    pub audience_views: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProgrammeRatingEvent {
    #[serde(deserialize_with = "lenient")]
    pub panel: Option<PanelInfo>,
    #[serde(deserialize_with = "lenient")]
    pub station: Option<StationInfo>,
    pub transmission_log_programme_name: Value,
    pub programme_type: Value,
    #[serde(deserialize_with = "lenient")]
    pub programme_start_datetime: Option<BarbDateTime>,
    pub programme_duration: Value,
    pub spans_normal_day: Value,
    #[serde(deserialize_with = "lenient")]
    pub sponsor: Option<Sponsor>,
    pub broadcaster_transmission_code: Value,
    pub live_status: Value,
    pub uk_premier: Value,
    pub broadcaster_premier: Value,
    pub repeat: Value,
    #[serde(deserialize_with = "lenient")]
    pub programme_content: Option<ProgrammeContent>,
    pub platforms: Value,
    pub audience_views: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProgrammeScheduleEntry {
    pub broadcaster_premier: Value,
    pub broadcaster_transmission_code: Value,
    pub live_status: Value,
    pub platforms: Value,
    #[serde(deserialize_with = "lenient")]
    pub programme_content: Option<ProgrammeContent>,
    pub programme_duration: Value,
    #[serde(deserialize_with = "lenient")]
    pub programme_start_datetime: Option<BarbDateTime>,
    pub programme_type: Value,
    pub repeat: Value,
    pub spans_normal_day: Value,
    #[serde(deserialize_with = "lenient")]
    pub sponsor: Option<Sponsor>,
    pub transmission_log_programme_name: Value,
    pub uk_premier: Value,
}

/// One scheduled day for one station, holding many programme entries.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProgrammeScheduleDay {
    pub scheduled_date: Value,
    #[serde(deserialize_with = "lenient")]
    pub station: Option<StationInfo>,
    #[serde(deserialize_with = "lenient")]
    pub panel: Option<PanelInfo>,
    #[serde(deserialize_with = "lenient_vec")]
    pub station_schedule: Vec<ProgrammeScheduleEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SpotScheduleEntry {
    pub break_type: Value,
    pub broadcaster_spot_number: Value,
    pub campaign_approval_id: Value,
    #[serde(deserialize_with = "lenient")]
    pub clearcast_information: Option<ClearcastInformation>,
    pub commercial_number: Value,
    pub platforms: Value,
    pub position_in_break: Value,
    /// Spelled this way by the API.
    pub preceeding_programme_name: Value,
    #[serde(deserialize_with = "lenient")]
    pub sales_house: Option<SalesHouse>,
    pub spot_duration: Value,
    #[serde(deserialize_with = "lenient")]
    pub spot_start_datetime: Option<BarbDateTime>,
    pub spot_type: Value,
    pub succeeding_programme_name: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SpotScheduleDay {
    pub scheduled_date: Value,
    #[serde(deserialize_with = "lenient")]
    pub station: Option<StationInfo>,
    #[serde(deserialize_with = "lenient")]
    pub panel: Option<PanelInfo>,
    #[serde(deserialize_with = "lenient_vec")]
    pub spot_schedule: Vec<SpotScheduleEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AudienceByTimeEvent {
    pub date_of_transmission: Value,
    #[serde(deserialize_with = "lenient")]
    pub panel: Option<PanelInfo>,
    #[serde(deserialize_with = "lenient")]
    pub station: Option<StationInfo>,
    pub activity: Value,
    pub transmission_time_period_duration_mins: Value,
    #[serde(deserialize_with = "lenient")]
    pub transmission_time_period_start: Option<BarbDateTime>,
    pub platforms: Value,
    #[serde(deserialize_with = "lenient_vec")]
    pub audience_views: Vec<AudienceView>,
}

/// A bulk endpoint result item pointing at downloadable files.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BulkFileResult {
    pub session_date: Value,
    pub panel_code: Value,
    #[serde(deserialize_with = "lenient_vec")]
    pub results: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_malformed_sub_objects_read_as_absent() {
        let event: AdvertisingSpotEvent = serde_json::from_value(json!({
            "station": "not an object",
            "clearcast_information": [1, 2, 3],
            "spot_type": "Commercial"
        }))
        .unwrap();

        assert!(event.station.is_none());
        assert!(event.clearcast_information.is_none());
        assert_eq!(event.spot_type, json!("Commercial"));
        assert!(event.panel.is_none());
    }

    #[test]
    fn test_schedule_entries_skip_non_objects() {
        let day: SpotScheduleDay = serde_json::from_value(json!({
            "scheduled_date": "2023-12-12",
            "spot_schedule": [{"spot_type": "Commercial"}, 42, null]
        }))
        .unwrap();
        assert_eq!(day.spot_schedule.len(), 1);
    }

    #[test]
    fn test_non_array_schedule_is_empty() {
        let day: ProgrammeScheduleDay =
            serde_json::from_value(json!({"station_schedule": {"oops": true}})).unwrap();
        assert!(day.station_schedule.is_empty());
    }
}
