use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::reference::{Code, Panel, Station};
use super::report_type::ReportType;

/// Station or panel a work unit is scoped to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Station(Station),
    Panel(Panel),
}

impl Target {
    pub fn code(&self) -> &Code {
        match self {
            Target::Station(s) => &s.station_code,
            Target::Panel(p) => &p.panel_code,
        }
    }

    pub fn key_name(&self) -> &'static str {
        match self {
            Target::Station(_) => "station_code",
            Target::Panel(_) => "panel_code",
        }
    }
}

/// One fan-out unit: report type × date range × station-or-panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    pub report_type: ReportType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub target: Target,
}

impl WorkUnit {
    /// Human readable label, also the base of queue task names.
    pub fn label(&self, stage: &str) -> String {
        format!(
            "{}-{}-{}-{}-{}--{}",
            self.report_type,
            stage,
            self.target.key_name(),
            self.target.code(),
            self.start_date,
            self.end_date
        )
    }
}

/// Fully qualified warehouse table, `project.dataset.table`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn new(project: impl Into<String>, dataset: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    /// Parses `project.dataset.table`.
    pub fn parse(qualified: &str) -> Option<Self> {
        let mut parts = qualified.splitn(3, '.');
        let project = parts.next()?;
        let dataset = parts.next()?;
        let table = parts.next()?;
        if project.is_empty() || dataset.is_empty() || table.is_empty() {
            return None;
        }
        Some(Self::new(project, dataset, table))
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

/// Pipeline state carried from the request stage through delete, insert and drop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedTableHandle {
    pub raw_table: TableRef,
    pub temp_table: TableRef,
    pub report_type: ReportType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub key_columns: Vec<String>,
}

/// Input of the enumerate stage. Missing fields fall back to configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnumerateRequest {
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub query_list: Option<Vec<String>>,
}
