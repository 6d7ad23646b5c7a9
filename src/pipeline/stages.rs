use chrono::{NaiveDate, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::dates::{resolve_window, split_date_range, DateRange};
use super::dispatcher::Dispatcher;
use super::task::StageTask;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::fetcher::BarbClient;
use crate::models::{
    EnumerateRequest, Keying, Panel, ReportType, Sink, StagedTableHandle, Station, TableRef,
    Target, WorkUnit,
};
use crate::processor::{columns_for, normalize, NormalizedTable};
use crate::storage::{offload_bulk_results, BlobStore};
use crate::warehouse::WarehouseGateway;

/// Terminal status of one stage run, as reported back to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Ok,
    NoData,
    SentToTasks,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StageStatus::Ok => "ok",
            StageStatus::NoData => "No Data",
            StageStatus::SentToTasks => "sent to tasks",
        })
    }
}

/// What fetching one work unit produced.
#[derive(Debug)]
pub enum ReportOutcome {
    Rows(NormalizedTable),
    Offloaded(Vec<String>),
    Empty,
}

/// Service handles the stages run against.
#[derive(Clone)]
pub struct PipelineServices {
    pub barb: Arc<BarbClient>,
    pub warehouse: Arc<dyn WarehouseGateway>,
    pub blobs: Arc<dyn BlobStore>,
    pub dispatcher: Arc<dyn Dispatcher>,
}

pub struct Pipeline {
    config: Arc<PipelineConfig>,
    services: PipelineServices,
}

/// Cross product of date ranges, report types and the stations or panels each type is keyed by.
pub fn plan_work_units(
    ranges: &[DateRange],
    report_types: &[ReportType],
    stations: &[Station],
    panels: &[Panel],
) -> Vec<WorkUnit> {
    let mut units = Vec::new();
    for range in ranges {
        for report_type in report_types {
            let targets: Vec<Target> = match report_type.keying() {
                Keying::Station => stations.iter().cloned().map(Target::Station).collect(),
                Keying::Panel => panels.iter().cloned().map(Target::Panel).collect(),
            };
            units.extend(targets.into_iter().map(|target| WorkUnit {
                report_type: *report_type,
                start_date: range.start,
                end_date: range.end,
                target,
            }));
        }
    }
    units
}

/// Parses report names, skipping the ones that are not known report types.
pub fn parse_query_list(names: &[String]) -> Vec<ReportType> {
    names
        .iter()
        .filter_map(|name| match name.parse::<ReportType>() {
            Ok(report_type) => Some(report_type),
            Err(_) => {
                warn!("Skipping unknown report type '{}'", name);
                None
            }
        })
        .collect()
}

/// Warehouse table name for one unit's staged rows, restricted to `[A-Za-z0-9_]`.
pub fn temp_table_name(unit: &WorkUnit, stamp: &str) -> String {
    format!(
        "{}_{}_{}_{}_{}",
        unit.report_type,
        unit.target.code(),
        unit.start_date.format("%Y%m%d"),
        unit.end_date.format("%Y%m%d"),
        stamp
    )
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
    .collect()
}

impl Pipeline {
    pub fn new(config: Arc<PipelineConfig>, services: PipelineServices) -> Self {
        Pipeline { config, services }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn services(&self) -> &PipelineServices {
        &self.services
    }

    fn raw_table(&self, report_type: ReportType) -> TableRef {
        TableRef::new(
            &self.config.gcp.project_id,
            &self.config.warehouse.dataset,
            report_type.as_str(),
        )
    }

    async fn hand_off(&self, task: StageTask) -> PipelineResult<()> {
        self.services.dispatcher.dispatch(self, task).await
    }

    /// Runs the stage a task belongs to.
    pub async fn execute(&self, task: StageTask) -> PipelineResult<StageStatus> {
        match task {
            StageTask::Enumerate(request) => self.enumerate(request).await,
            StageTask::Request(unit) => self.request(unit).await,
            StageTask::DeleteStale(handle) => self.delete_stale(handle).await,
            StageTask::InsertMerged(handle) => self.insert_merged(handle).await,
            StageTask::DropTemp(handle) => self.drop_temp(handle).await,
        }
    }

    pub async fn enumerate(&self, request: EnumerateRequest) -> PipelineResult<StageStatus> {
        let orchestration = &self.config.orchestration;
        let today: NaiveDate = Utc::now().date_naive();
        let (start, end) = resolve_window(&request, orchestration, today)?;
        let names = request
            .query_list
            .as_ref()
            .unwrap_or(&orchestration.query_list);
        let report_types = parse_query_list(names);
        let ranges = split_date_range(start, end, orchestration.window_days);
        info!(
            "Enumerating {} report types over {} date ranges from {} to {}",
            report_types.len(),
            ranges.len(),
            start,
            end
        );

        let stations = if report_types.iter().any(|r| r.keying() == Keying::Station) {
            self.services
                .barb
                .list_stations(orchestration.station_filter.as_deref())
                .await?
        } else {
            Vec::new()
        };
        let panels = if report_types.iter().any(|r| r.keying() == Keying::Panel) {
            self.services
                .barb
                .list_panels(orchestration.panel_filter.as_deref())
                .await?
        } else {
            Vec::new()
        };
        info!("Total stations: {}, total panels: {}", stations.len(), panels.len());

        let units = plan_work_units(&ranges, &report_types, &stations, &panels);
        let count = units.len();
        for unit in units {
            self.hand_off(StageTask::Request(unit)).await?;
        }

        info!("Handed off {} request tasks", count);
        Ok(StageStatus::SentToTasks)
    }

    /// Fetches one unit's report and either normalizes it or offloads its files.
    pub async fn fetch(&self, unit: &WorkUnit) -> PipelineResult<ReportOutcome> {
        let items = self.services.barb.fetch_report(unit).await?;
        if items.is_empty() {
            return Ok(ReportOutcome::Empty);
        }

        match unit.report_type.sink() {
            Sink::Warehouse => {
                let table = normalize(unit.report_type, &items)?;
                if table.is_empty() {
                    Ok(ReportOutcome::Empty)
                } else {
                    Ok(ReportOutcome::Rows(table))
                }
            }
            Sink::ObjectStore => {
                let keys = offload_bulk_results(
                    &self.services.barb,
                    self.services.blobs.as_ref(),
                    unit.report_type,
                    items,
                )
                .await?;
                if keys.is_empty() {
                    Ok(ReportOutcome::Empty)
                } else {
                    Ok(ReportOutcome::Offloaded(keys))
                }
            }
        }
    }

    pub async fn request(&self, unit: WorkUnit) -> PipelineResult<StageStatus> {
        let label = unit.label("request");
        let table = match self.fetch(&unit).await? {
            ReportOutcome::Empty => {
                info!("{}: no data", label);
                return Ok(StageStatus::NoData);
            }
            ReportOutcome::Offloaded(keys) => {
                info!("{}: offloaded {} files", label, keys.len());
                return Ok(StageStatus::Ok);
            }
            ReportOutcome::Rows(table) => table,
        };

        let report_type = unit.report_type;
        let columns = columns_for(report_type).ok_or_else(|| {
            PipelineError::Config(format!("{} has no warehouse schema", report_type))
        })?;
        let raw_table = self.raw_table(report_type);
        let stamp = format!(
            "{}_{}",
            Utc::now().format("%Y%m%d%H%M%S"),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let temp_table = TableRef::new(
            &raw_table.project,
            &raw_table.dataset,
            temp_table_name(&unit, &stamp),
        );

        let warehouse = &self.services.warehouse;
        warehouse.ensure_table(&raw_table, columns).await?;
        warehouse.create_temp_table(&raw_table, &temp_table).await?;
        let loaded = warehouse.load(&temp_table, table.to_dataframe()?).await?;
        info!("{}: staged {} rows in {}", label, loaded, temp_table);

        let handle = StagedTableHandle {
            raw_table,
            temp_table,
            report_type,
            start_date: unit.start_date,
            end_date: unit.end_date,
            key_columns: report_type
                .natural_key()
                .iter()
                .map(|c| c.to_string())
                .collect(),
        };
        self.hand_off(StageTask::DeleteStale(handle)).await?;
        Ok(StageStatus::Ok)
    }

    pub async fn delete_stale(&self, handle: StagedTableHandle) -> PipelineResult<StageStatus> {
        self.services
            .warehouse
            .delete_matching(&handle.raw_table, &handle.temp_table, &handle.key_columns)
            .await?;
        self.hand_off(StageTask::InsertMerged(handle)).await?;
        Ok(StageStatus::Ok)
    }

    pub async fn insert_merged(&self, handle: StagedTableHandle) -> PipelineResult<StageStatus> {
        let warehouse = &self.services.warehouse;
        let columns = warehouse.get_columns(&handle.raw_table).await?;
        warehouse
            .insert_select(&handle.temp_table, &handle.raw_table, &columns)
            .await?;
        self.hand_off(StageTask::DropTemp(handle)).await?;
        Ok(StageStatus::Ok)
    }

    pub async fn drop_temp(&self, handle: StagedTableHandle) -> PipelineResult<StageStatus> {
        self.services.warehouse.drop_table(&handle.temp_table).await?;
        Ok(StageStatus::Ok)
    }
}
