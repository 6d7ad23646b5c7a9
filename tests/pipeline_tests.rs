use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use barb_pipeline::config::{ExecutionMode, PipelineConfig};
use barb_pipeline::error::{PipelineError, PipelineResult};
use barb_pipeline::fetcher::http::build_client;
use barb_pipeline::fetcher::{BarbClient, Credentials};
use barb_pipeline::gcp::{CloudTasksClient, StaticToken};
use barb_pipeline::models::{
    EnumerateRequest, Panel, ReportType, Station, TableRef, Target, WorkUnit,
};
use barb_pipeline::pipeline::{
    DirectDispatcher, Dispatcher, Pipeline, PipelineServices, QueuedDispatcher, StageStatus,
    StageTask,
};
use barb_pipeline::processor::ColumnSpec;
use barb_pipeline::storage::{BlobStore, MemoryBlobStore};
use barb_pipeline::warehouse::{InMemoryWarehouse, WarehouseGateway};
use chrono::NaiveDate;
use polars::prelude::DataFrame;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn config(server: &MockServer) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.gcp.project_id = "proj".to_string();
    config.barb.api_root = format!("{}/api/v1/", server.uri());
    config.barb.request_timeout_secs = 5;
    config.orchestration.mode = ExecutionMode::Direct;
    config
}

fn barb(config: &PipelineConfig) -> Arc<BarbClient> {
    let credentials = Credentials {
        email: "analyst@example.com".to_string(),
        password: "secret".to_string(),
    };
    Arc::new(BarbClient::new(config.barb.clone(), credentials).unwrap())
}

async fn mock_reference_data(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/token/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "token"})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/stations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"station_code": 101, "station_name": "BBC One"}
        ])))
        .mount(server)
        .await;
}

fn schedule_day(spots: &[(&str, &str)]) -> Value {
    json!([{
        "scheduled_date": "2023-12-12",
        "station": {"station_code": 101, "station_name": "BBC One"},
        "panel": {"panel_code": 50, "panel_region": "Network", "is_macro_region": false},
        "spot_schedule": spots.iter().map(|(number, spot_type)| json!({
            "broadcaster_spot_number": number,
            "spot_type": spot_type,
            "spot_start_datetime": {"standard_datetime": "2023-12-12 21:15:00"},
            "clearcast_information": {"buyer_name": "PHD Media Limited"}
        })).collect::<Vec<_>>()
    }])
}

fn spot_schedule_request() -> StageTask {
    StageTask::Enumerate(EnumerateRequest {
        start_date: Some(day("2023-12-12")),
        end_date: Some(day("2023-12-15")),
        query_list: Some(vec!["spot_schedule".to_string()]),
    })
}

struct Harness {
    pipeline: Pipeline,
    warehouse: Arc<InMemoryWarehouse>,
    dispatcher: Arc<DirectDispatcher>,
}

fn harness(server: &MockServer) -> Harness {
    let config = config(server);
    let warehouse = Arc::new(InMemoryWarehouse::new());
    let dispatcher = Arc::new(DirectDispatcher::new());
    let services = PipelineServices {
        barb: barb(&config),
        warehouse: warehouse.clone(),
        blobs: Arc::new(MemoryBlobStore::new()),
        dispatcher: dispatcher.clone(),
    };
    Harness {
        pipeline: Pipeline::new(Arc::new(config), services),
        warehouse,
        dispatcher,
    }
}

fn raw_spot_schedule() -> TableRef {
    TableRef::new("proj", "Barb_Data", "spot_schedule")
}

fn spot_types(frame: &DataFrame) -> Vec<Option<String>> {
    frame
        .column("spot_type")
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .map(|v| v.map(|s| s.to_string()))
        .collect()
}

#[tokio::test]
async fn test_running_twice_leaves_the_same_rows() {
    let server = MockServer::start().await;
    mock_reference_data(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/spot_schedule"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(schedule_day(&[("S1", "Commercial"), ("S2", "Commercial")])),
        )
        .mount(&server)
        .await;

    let h = harness(&server);
    let status = h.pipeline.execute(spot_schedule_request()).await.unwrap();
    assert_eq!(status, StageStatus::SentToTasks);
    let first = h.warehouse.table(&raw_spot_schedule()).unwrap();
    assert_eq!(first.height(), 2);

    h.pipeline.execute(spot_schedule_request()).await.unwrap();
    let second = h.warehouse.table(&raw_spot_schedule()).unwrap();

    assert_eq!(second.height(), 2);
    assert!(first.equals_missing(&second));
    assert_eq!(h.dispatcher.failures(), 0);
    // Temp tables are dropped at the end of each chain.
    assert_eq!(h.warehouse.table_names(), vec!["proj.Barb_Data.spot_schedule"]);
}

#[tokio::test]
async fn test_rerun_replaces_overlapping_rows_with_new_values() {
    let server = MockServer::start().await;
    mock_reference_data(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/spot_schedule"))
        .respond_with(ResponseTemplate::new(200).set_body_json(schedule_day(&[("S1", "Commercial")])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/spot_schedule"))
        .respond_with(ResponseTemplate::new(200).set_body_json(schedule_day(&[("S1", "Sponsorship")])))
        .mount(&server)
        .await;

    let h = harness(&server);
    h.pipeline.execute(spot_schedule_request()).await.unwrap();
    h.pipeline.execute(spot_schedule_request()).await.unwrap();

    let table = h.warehouse.table(&raw_spot_schedule()).unwrap();
    assert_eq!(spot_types(&table), vec![Some("Sponsorship".to_string())]);
}

#[tokio::test]
async fn test_viewing_results_are_offloaded_to_blobs() {
    let server = MockServer::start().await;
    mock_reference_data(&server).await;
    let link = format!("{}/files/viewing_abc.parquet", server.uri());
    Mock::given(method("GET"))
        .and(path("/api/v1/bulk/viewing/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "session_date": "2023-12-12",
            "panel_code": 50,
            "results": [link]
        }])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/viewing_abc.parquet"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PAR1".to_vec()))
        .mount(&server)
        .await;

    let config = config(&server);
    let blobs = Arc::new(MemoryBlobStore::new());
    let warehouse = Arc::new(RecordingWarehouse::default());
    let pipeline = Pipeline::new(
        Arc::new(config.clone()),
        PipelineServices {
            barb: barb(&config),
            warehouse: warehouse.clone(),
            blobs: blobs.clone(),
            dispatcher: Arc::new(RecordingDispatcher::default()),
        },
    );

    let unit = WorkUnit {
        report_type: ReportType::Viewing,
        start_date: day("2023-12-12"),
        end_date: day("2023-12-12"),
        target: Target::Panel(Panel {
            panel_code: "50".into(),
            panel_region: "Network".to_string(),
            is_macro_region: false,
        }),
    };
    let status = pipeline.execute(StageTask::Request(unit)).await.unwrap();

    assert_eq!(status, StageStatus::Ok);
    assert_eq!(
        blobs.list("viewing/").await.unwrap(),
        vec!["viewing/date=2023-12-12/panel_code=50/viewing_abc.parquet"]
    );
    assert!(warehouse.calls().is_empty());
}

#[derive(Default)]
struct RecordingWarehouse {
    calls: Mutex<Vec<String>>,
    fail_delete: bool,
}

impl RecordingWarehouse {
    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WarehouseGateway for RecordingWarehouse {
    async fn ensure_table(&self, _table: &TableRef, _columns: &[ColumnSpec]) -> PipelineResult<()> {
        self.record("ensure_table");
        Ok(())
    }

    async fn create_temp_table(&self, _raw: &TableRef, _temp: &TableRef) -> PipelineResult<()> {
        self.record("create_temp_table");
        Ok(())
    }

    async fn load(&self, _table: &TableRef, frame: DataFrame) -> PipelineResult<usize> {
        self.record("load");
        Ok(frame.height())
    }

    async fn delete_matching(
        &self,
        _raw: &TableRef,
        _temp: &TableRef,
        _key_columns: &[String],
    ) -> PipelineResult<()> {
        self.record("delete_matching");
        if self.fail_delete {
            return Err(PipelineError::Warehouse("delete rejected".to_string()));
        }
        Ok(())
    }

    async fn get_columns(&self, _table: &TableRef) -> PipelineResult<Vec<String>> {
        self.record("get_columns");
        Ok(vec!["spot_type".to_string()])
    }

    async fn insert_select(
        &self,
        _temp: &TableRef,
        _raw: &TableRef,
        _columns: &[String],
    ) -> PipelineResult<()> {
        self.record("insert_select");
        Ok(())
    }

    async fn drop_table(&self, _table: &TableRef) -> PipelineResult<()> {
        self.record("drop_table");
        Ok(())
    }
}

#[derive(Default)]
struct RecordingDispatcher {
    tasks: Mutex<Vec<StageTask>>,
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn dispatch(&self, _pipeline: &Pipeline, task: StageTask) -> PipelineResult<()> {
        self.tasks.lock().unwrap().push(task);
        Ok(())
    }
}

fn station_unit(report_type: ReportType) -> WorkUnit {
    WorkUnit {
        report_type,
        start_date: day("2023-12-12"),
        end_date: day("2023-12-15"),
        target: Target::Station(Station {
            station_code: "101".into(),
            station_name: "BBC One".to_string(),
        }),
    }
}

#[tokio::test]
async fn test_empty_report_makes_no_warehouse_calls_and_no_hand_off() {
    let server = MockServer::start().await;
    mock_reference_data(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/advertising_spots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"events": []})))
        .mount(&server)
        .await;

    let config = config(&server);
    let warehouse = Arc::new(RecordingWarehouse::default());
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let pipeline = Pipeline::new(
        Arc::new(config.clone()),
        PipelineServices {
            barb: barb(&config),
            warehouse: warehouse.clone(),
            blobs: Arc::new(MemoryBlobStore::new()),
            dispatcher: dispatcher.clone(),
        },
    );

    let status = pipeline
        .execute(StageTask::Request(station_unit(ReportType::AdvertisingSpots)))
        .await
        .unwrap();

    assert_eq!(status, StageStatus::NoData);
    assert_eq!(status.to_string(), "No Data");
    assert!(warehouse.calls().is_empty());
    assert!(dispatcher.tasks.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_request_stages_rows_and_hands_off_delete() {
    let server = MockServer::start().await;
    mock_reference_data(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/spot_schedule"))
        .respond_with(ResponseTemplate::new(200).set_body_json(schedule_day(&[("S1", "Commercial")])))
        .mount(&server)
        .await;

    let config = config(&server);
    let warehouse = Arc::new(RecordingWarehouse::default());
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let pipeline = Pipeline::new(
        Arc::new(config.clone()),
        PipelineServices {
            barb: barb(&config),
            warehouse: warehouse.clone(),
            blobs: Arc::new(MemoryBlobStore::new()),
            dispatcher: dispatcher.clone(),
        },
    );

    let status = pipeline
        .execute(StageTask::Request(station_unit(ReportType::SpotSchedule)))
        .await
        .unwrap();

    assert_eq!(status, StageStatus::Ok);
    assert_eq!(warehouse.calls(), vec!["ensure_table", "create_temp_table", "load"]);
    let tasks = dispatcher.tasks.lock().unwrap();
    match tasks.as_slice() {
        [StageTask::DeleteStale(handle)] => {
            assert_eq!(handle.raw_table, raw_spot_schedule());
            assert_eq!(handle.key_columns, vec!["scheduled_date", "station_code"]);
            assert!(handle.temp_table.table.starts_with("spot_schedule_101_20231212_20231215_"));
        }
        other => panic!("expected one delete hand-off, got {:?}", other),
    }
}

#[tokio::test]
async fn test_downstream_failure_does_not_fail_direct_upstream() {
    let server = MockServer::start().await;
    mock_reference_data(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/spot_schedule"))
        .respond_with(ResponseTemplate::new(200).set_body_json(schedule_day(&[("S1", "Commercial")])))
        .mount(&server)
        .await;

    let config = config(&server);
    let warehouse = Arc::new(RecordingWarehouse {
        fail_delete: true,
        ..RecordingWarehouse::default()
    });
    let dispatcher = Arc::new(DirectDispatcher::new());
    let pipeline = Pipeline::new(
        Arc::new(config.clone()),
        PipelineServices {
            barb: barb(&config),
            warehouse: warehouse.clone(),
            blobs: Arc::new(MemoryBlobStore::new()),
            dispatcher: dispatcher.clone(),
        },
    );

    let status = pipeline
        .execute(StageTask::Request(station_unit(ReportType::SpotSchedule)))
        .await
        .unwrap();

    assert_eq!(status, StageStatus::Ok);
    assert_eq!(dispatcher.dispatched(), 1);
    assert_eq!(dispatcher.failures(), 1);
    assert!(!warehouse.calls().contains(&"insert_select".to_string()));
}

#[tokio::test]
async fn test_unknown_report_names_are_skipped_during_enumerate() {
    let server = MockServer::start().await;
    mock_reference_data(&server).await;

    let config = config(&server);
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let pipeline = Pipeline::new(
        Arc::new(config.clone()),
        PipelineServices {
            barb: barb(&config),
            warehouse: Arc::new(RecordingWarehouse::default()),
            blobs: Arc::new(MemoryBlobStore::new()),
            dispatcher: dispatcher.clone(),
        },
    );

    let status = pipeline
        .execute(StageTask::Enumerate(EnumerateRequest {
            start_date: Some(day("2023-12-01")),
            end_date: Some(day("2023-12-14")),
            query_list: Some(vec!["households".to_string(), "advertising_spots".to_string()]),
        }))
        .await
        .unwrap();

    assert_eq!(status, StageStatus::SentToTasks);
    let tasks = dispatcher.tasks.lock().unwrap();
    // Two date ranges over the single station.
    assert_eq!(tasks.len(), 2);
    assert!(tasks.iter().all(|t| matches!(
        t,
        StageTask::Request(unit) if unit.report_type == ReportType::AdvertisingSpots
    )));
}

const CALLBACK: &str = "https://barb-etl.example";
const RUNNER: &str = "runner@proj.iam.gserviceaccount.com";

fn queued_pipeline(server: &MockServer, warehouse: Arc<RecordingWarehouse>) -> Pipeline {
    let mut config = config(server);
    config.orchestration.mode = ExecutionMode::Queued;
    config.orchestration.callback_base_url = format!("{}/", CALLBACK);
    config.orchestration.tasks_base_url = format!("{}/v2/", server.uri());
    config.gcp.service_account = RUNNER.to_string();

    let tasks = CloudTasksClient::new(
        build_client(Duration::from_secs(5)).unwrap(),
        config.orchestration.tasks_base_url.clone(),
        config.gcp.project_id.clone(),
        config.gcp.location.clone(),
        config.gcp.service_account.clone(),
        Arc::new(StaticToken::new("gcp-token")),
    );
    let dispatcher = Arc::new(QueuedDispatcher::new(tasks, config.orchestration.clone()));
    Pipeline::new(
        Arc::new(config.clone()),
        PipelineServices {
            barb: barb(&config),
            warehouse,
            blobs: Arc::new(MemoryBlobStore::new()),
            dispatcher,
        },
    )
}

async fn mock_cloud_tasks(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path_regex(r"^/v2/projects/proj/locations/europe-west2/queues/[^/]+/tasks$"))
        .and(header("Authorization", "Bearer gcp-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(server)
        .await;
}

/// A task as Cloud Tasks received it: queue, target URL and the decoded stage message.
struct QueuedTask {
    queue: String,
    url: String,
    task: StageTask,
}

async fn queued_tasks(server: &MockServer) -> Vec<QueuedTask> {
    let requests = server.received_requests().await.unwrap();
    requests
        .iter()
        .filter(|r| r.url.path().starts_with("/v2/"))
        .map(|r| {
            let queue = r
                .url
                .path()
                .split("/queues/")
                .nth(1)
                .and_then(|rest| rest.split('/').next())
                .unwrap()
                .to_string();
            let sent: Value = serde_json::from_slice(&r.body).unwrap();
            let http = &sent["task"]["httpRequest"];
            let url = http["url"].as_str().unwrap().to_string();
            assert_eq!(http["httpMethod"], "POST");
            assert_eq!(http["oidcToken"]["audience"], url.as_str());
            assert_eq!(http["oidcToken"]["serviceAccountEmail"], RUNNER);
            let body = STANDARD.decode(http["body"].as_str().unwrap()).unwrap();
            let route = url.rsplit('/').next().unwrap();
            QueuedTask {
                queue,
                task: StageTask::from_route(route, &body).unwrap(),
                url,
            }
        })
        .collect()
}

#[tokio::test]
async fn test_queued_chain_posts_each_stage_to_its_queue() {
    let server = MockServer::start().await;
    mock_reference_data(&server).await;
    mock_cloud_tasks(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/spot_schedule"))
        .respond_with(ResponseTemplate::new(200).set_body_json(schedule_day(&[("S1", "Commercial")])))
        .mount(&server)
        .await;

    let warehouse = Arc::new(RecordingWarehouse::default());
    let pipeline = queued_pipeline(&server, warehouse.clone());

    let status = pipeline
        .execute(StageTask::Request(station_unit(ReportType::SpotSchedule)))
        .await
        .unwrap();
    assert_eq!(status, StageStatus::Ok);

    let queued = queued_tasks(&server).await;
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].queue, "Barb-queue");
    assert_eq!(queued[0].url, format!("{}/3_delete_data", CALLBACK));
    let handle = match &queued[0].task {
        StageTask::DeleteStale(handle) => handle.clone(),
        other => panic!("expected a delete task, got {:?}", other),
    };
    assert_eq!(handle.raw_table, raw_spot_schedule());
    assert_eq!(handle.key_columns, vec!["scheduled_date", "station_code"]);

    // Feed each decoded task back in, as the callback server would.
    pipeline.execute(queued[0].task.clone()).await.unwrap();
    let queued = queued_tasks(&server).await;
    assert_eq!(queued.len(), 2);
    assert_eq!(queued[1].queue, "Barb-bq-queue");
    assert_eq!(queued[1].url, format!("{}/4_insert_data", CALLBACK));
    assert_eq!(queued[1].task, StageTask::InsertMerged(handle.clone()));

    pipeline.execute(queued[1].task.clone()).await.unwrap();
    let queued = queued_tasks(&server).await;
    assert_eq!(queued.len(), 3);
    assert_eq!(queued[2].queue, "Barb-bq-queue");
    assert_eq!(queued[2].url, format!("{}/5_drop_table", CALLBACK));
    assert_eq!(queued[2].task, StageTask::DropTemp(handle));

    assert_eq!(
        warehouse.calls(),
        vec![
            "ensure_table",
            "create_temp_table",
            "load",
            "delete_matching",
            "get_columns",
            "insert_select"
        ]
    );
}

#[tokio::test]
async fn test_queued_enumerate_posts_one_request_per_unit() {
    let server = MockServer::start().await;
    mock_reference_data(&server).await;
    mock_cloud_tasks(&server).await;

    let pipeline = queued_pipeline(&server, Arc::new(RecordingWarehouse::default()));
    let status = pipeline.execute(spot_schedule_request()).await.unwrap();
    assert_eq!(status, StageStatus::SentToTasks);

    let queued = queued_tasks(&server).await;
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].queue, "Barb-queue");
    assert_eq!(queued[0].url, format!("{}/2_request", CALLBACK));
    assert_eq!(
        queued[0].task,
        StageTask::Request(station_unit(ReportType::SpotSchedule))
    );
}

#[tokio::test]
async fn test_queue_rejection_fails_the_handing_off_stage() {
    let server = MockServer::start().await;
    mock_reference_data(&server).await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/v2/.*/tasks$"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let pipeline = queued_pipeline(&server, Arc::new(RecordingWarehouse::default()));
    let err = pipeline.execute(spot_schedule_request()).await.unwrap_err();
    assert!(err.is_retryable());
}
