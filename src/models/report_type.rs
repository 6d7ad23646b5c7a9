use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The upstream data products this pipeline ingests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    AdvertisingSpots,
    ProgrammeRatings,
    ProgrammeSchedule,
    SpotSchedule,
    AudienceByTime,
    SpotAudience,
    ProgrammeAudience,
    Viewing,
}

/// What a work unit is fanned out over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keying {
    Station,
    Panel,
}

/// How the upstream endpoint returns its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointStyle {
    /// Object with an `events` array, next page in the events link header.
    Events,
    /// Top-level list, next page in the bulk link header.
    Bulk,
}

/// Where fetched results land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sink {
    Warehouse,
    ObjectStore,
}

impl ReportType {
    pub const ALL: [ReportType; 8] = [
        ReportType::AdvertisingSpots,
        ReportType::ProgrammeRatings,
        ReportType::ProgrammeSchedule,
        ReportType::SpotSchedule,
        ReportType::AudienceByTime,
        ReportType::SpotAudience,
        ReportType::ProgrammeAudience,
        ReportType::Viewing,
    ];

    /// Report types requested when an enumerate call names none.
    pub const DEFAULT_QUERY_LIST: [ReportType; 7] = [
        ReportType::AdvertisingSpots,
        ReportType::SpotSchedule,
        ReportType::ProgrammeRatings,
        ReportType::ProgrammeAudience,
        ReportType::ProgrammeSchedule,
        ReportType::Viewing,
        ReportType::AudienceByTime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::AdvertisingSpots => "advertising_spots",
            ReportType::ProgrammeRatings => "programme_ratings",
            ReportType::ProgrammeSchedule => "programme_schedule",
            ReportType::SpotSchedule => "spot_schedule",
            ReportType::AudienceByTime => "audience_by_time",
            ReportType::SpotAudience => "spot_audience",
            ReportType::ProgrammeAudience => "programme_audience",
            ReportType::Viewing => "viewing",
        }
    }

    /// Path of the API endpoint relative to the API root.
    pub fn endpoint(&self) -> &'static str {
        match self {
            ReportType::AdvertisingSpots => "advertising_spots",
            ReportType::ProgrammeRatings => "programme_ratings",
            ReportType::ProgrammeSchedule => "programme_schedule",
            ReportType::SpotSchedule => "spot_schedule",
            ReportType::AudienceByTime => "audiences_by_time",
            ReportType::SpotAudience => "bulk/spot_audience",
            ReportType::ProgrammeAudience => "bulk/programme_audience",
            ReportType::Viewing => "bulk/viewing/",
        }
    }

    pub fn style(&self) -> EndpointStyle {
        match self {
            ReportType::AdvertisingSpots
            | ReportType::ProgrammeRatings
            | ReportType::AudienceByTime => EndpointStyle::Events,
            _ => EndpointStyle::Bulk,
        }
    }

    pub fn keying(&self) -> Keying {
        match self.sink() {
            Sink::Warehouse => Keying::Station,
            Sink::ObjectStore => Keying::Panel,
        }
    }

    pub fn sink(&self) -> Sink {
        match self {
            ReportType::SpotAudience | ReportType::ProgrammeAudience | ReportType::Viewing => {
                Sink::ObjectStore
            }
            _ => Sink::Warehouse,
        }
    }

    /// Columns identifying the same logical record in the raw table.
    pub fn natural_key(&self) -> &'static [&'static str] {
        match self {
            ReportType::AdvertisingSpots => &["date_of_transmission", "station_name"],
            ReportType::ProgrammeRatings | ReportType::AudienceByTime => {
                &["date_of_transmission", "station_code"]
            }
            ReportType::ProgrammeSchedule | ReportType::SpotSchedule => {
                &["scheduled_date", "station_code"]
            }
            ReportType::SpotAudience | ReportType::ProgrammeAudience | ReportType::Viewing => &[],
        }
    }

    /// Name used for the object-store partition prefix of offloaded files.
    pub fn blob_prefix(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReportType::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown report type: {}", s))
    }
}
