use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use vigia_devkit::fixtures::{self, PortFixture};
use vigia_devkit::TestHarness;
use vigia_kernel::error::{FetchFailure, PipelineError};
use vigia_kernel::forecast::graph::GraphFormatError;
use vigia_kernel::health::HealthTracker;
use vigia_kernel::jobs::JobKind;
use vigia_kernel::models::{Completed, DeviceSnapshot, IncomingAlert, PersistedAlert};
use vigia_kernel::queries;
use vigia_kernel::scheduler::Scheduler;
use vigia_kernel::store::memory::MemoryStore;
use vigia_kernel::store::SnapshotKind;

fn stored_alert(id: &str, status: &str, completed: Completed) -> PersistedAlert {
    let mut alert = PersistedAlert::first_sighting(IncomingAlert {
        alert_table_id: id.into(),
        device_id: Some("1".into()),
        last_ok: None,
        severity: Some("crit".into()),
        status: Some(status.into()),
        recovered: None,
        device: DeviceSnapshot::default(),
    });
    alert.completed = completed;
    alert
}

#[tokio::test]
async fn alerts_job_inserts_new_and_keeps_completed_frozen() {
    let harness = TestHarness::new().with_store(MemoryStore::with_alerts(vec![stored_alert(
        "5",
        "critical",
        Completed::Yes,
    )]));
    harness
        .source
        .on("alerts", fixtures::alerts_page(&[fixtures::alert(5, 1, "ok"), fixtures::alert(6, 1, "failed")]))
        .on("devices/1", fixtures::device(1, "edge-1"));

    let report = harness.run(JobKind::Alerts).await.unwrap();
    let summary = report.reconcile.unwrap();
    assert_eq!((summary.inserted, summary.frozen), (1, 1));
    assert_eq!(report.written, 1);

    let five = harness.alert("5").await.unwrap();
    assert_eq!(five.status.as_deref(), Some("critical"));
    assert_eq!(five.completed, Completed::Yes);

    let six = harness.alert("6").await.unwrap();
    assert_eq!(six.completed, Completed::No);
    assert_eq!(six.device.hostname.as_deref(), Some("edge-1"));
    assert_eq!(six.device.lat.as_deref(), Some("19.43"));

    // un seul appel device pour deux alertes du même équipement
    assert_eq!(harness.source.calls_to("devices/1"), 1);
}

#[tokio::test]
async fn alerts_job_is_idempotent() {
    let harness = TestHarness::new();
    harness
        .source
        .on("alerts", fixtures::alerts_page(&[fixtures::alert(1, 2, "failed")]))
        .on("devices/2", fixtures::device(2, "core"));

    harness.run(JobKind::Alerts).await.unwrap();
    let once = harness.alerts().await.unwrap();
    let second = harness.run(JobKind::Alerts).await.unwrap();

    assert_eq!(harness.alerts().await.unwrap(), once);
    assert_eq!(second.written, 0);
    assert_eq!(second.reconcile.unwrap().unchanged, 1);
}

#[tokio::test]
async fn alerts_are_fetched_page_by_page() {
    let harness = TestHarness::new().configure(|c| c.alerts.page_size = 2);
    harness
        .source
        .on_with(
            "alerts",
            &[("pageno", "1")],
            fixtures::alerts_page(&[fixtures::alert(1, 1, "failed"), fixtures::alert(2, 1, "failed")]),
        )
        .on_with("alerts", &[("pageno", "2")], fixtures::alerts_page(&[fixtures::alert(3, 1, "ok")]))
        .on("devices/1", fixtures::device(1, "edge-1"));

    let report = harness.run(JobKind::Alerts).await.unwrap();
    assert_eq!(report.processed, 3);
    assert_eq!(harness.source.calls_to("alerts"), 2);
    assert_eq!(harness.alerts().await.unwrap().len(), 3);

    let pages: Vec<_> = harness.source.calls().into_iter().filter(|c| c.endpoint == "alerts").collect();
    assert!(pages.iter().all(|c| c.params.contains(&("pagesize".to_string(), "2".to_string()))));
}

#[tokio::test]
async fn fetch_failure_aborts_without_partial_writes() {
    let harness = TestHarness::new();
    harness
        .source
        .on("alerts", fixtures::alerts_page(&[fixtures::alert(1, 9, "failed")]))
        .fail("devices/9", 502);

    let err = harness.run(JobKind::Alerts).await.unwrap_err();
    assert!(matches!(err, PipelineError::Fetch(FetchFailure::Status { status: 502, .. })));
    assert!(harness.alerts().await.unwrap().is_empty());
}

#[tokio::test]
async fn graphs_job_stores_raw_data_and_forecast() {
    let harness = TestHarness::new().configure(|c| c.forecast.horizon = 2);
    let payload = fixtures::graph(0, 86400, &["traffic"], json!([10, 12, "11JS:0", null, 15]));
    harness.source.on("graph.php", payload.clone());

    let report = harness.run(JobKind::Graphs).await.unwrap();
    assert_eq!(report.fallbacks, 1);

    assert_eq!(harness.snapshot(SnapshotKind::GraphData).await.unwrap(), Some(payload));
    let forecast = harness.snapshot(SnapshotKind::GraphForecast).await.unwrap().unwrap();
    assert_eq!(forecast["data"], json!([15.0, 15.0]));
    assert_eq!(forecast["meta"]["forecast_start"], 5 * 86400);
    assert_eq!(forecast["meta"]["forecast_end"], 7 * 86400);
    assert_eq!(forecast["series"][0]["fallback"], true);

    let via_query = queries::latest_forecast(harness.store.as_ref()).await.unwrap();
    assert_eq!(via_query, forecast);
}

#[tokio::test]
async fn malformed_graph_writes_nothing() {
    let harness = TestHarness::new();
    harness.source.on("graph.php", json!({"meta": {"start": 0, "step": -5}, "data": []}));

    let err = harness.run(JobKind::Graphs).await.unwrap_err();
    assert!(matches!(err, PipelineError::Graph(_)));
    assert_eq!(harness.snapshot(SnapshotKind::GraphData).await.unwrap(), None);
}

#[tokio::test]
async fn oversized_graph_is_rejected_before_any_write() {
    let harness = TestHarness::new().configure(|c| c.forecast.max_series_len = 100);
    harness
        .source
        .on("graph.php", json!({"meta": {"start": 0, "step": 60, "rows": 4611686018427387904u64}, "data": [1, 2, 3]}));

    let err = harness.run(JobKind::Graphs).await.unwrap_err();
    assert!(matches!(err, PipelineError::Graph(GraphFormatError::TooLong { limit: 100, .. })));
    assert_eq!(harness.snapshot(SnapshotKind::GraphData).await.unwrap(), None);
    assert_eq!(harness.snapshot(SnapshotKind::GraphForecast).await.unwrap(), None);
}

#[tokio::test]
async fn consumption_splits_internet_and_other_ports() {
    let harness = TestHarness::new();
    let inet = fixtures::port(PortFixture {
        port_id: 1,
        descr_type: Some("inet"),
        in_octets: "1073741824",
        out_octets: "x",
        ..Default::default()
    });
    let lan = fixtures::port(PortFixture {
        port_id: 2,
        descr_type: Some("lan"),
        in_octets: "536870912",
        out_octets: "536870912",
        ..Default::default()
    });
    harness
        .source
        .on("ports", fixtures::ports(&[inet.clone(), lan]))
        .on_with("ports", &[("port_descr_type", "inet")], fixtures::ports(&[inet]));

    harness.run(JobKind::Consumption).await.unwrap();
    let report = queries::latest_consumption(harness.store.as_ref()).await.unwrap();

    assert_eq!(report.internet["total_in_octets"], 1_073_741_824i64);
    assert_eq!(report.internet["total_out_octets"], 0);
    assert_eq!(report.internet["total_combined_gb"], 1.0);
    assert_eq!(report.non_internet["port_count"], 1);
    assert_eq!(report.non_internet["total_combined_gb"], 1.0);
}

#[tokio::test]
async fn port_failures_are_ranked_with_device_names() {
    let harness = TestHarness::new().configure(|c| c.ports.failure_top_n = 2);
    harness
        .source
        .on("devices", fixtures::devices(&[fixtures::device_entry(1, "edge"), fixtures::device_entry(2, "core")]))
        .on(
            "ports",
            fixtures::ports(&[
                fixtures::port(PortFixture { port_id: 10, device_id: 1, in_errors: "4", ..Default::default() }),
                fixtures::port(PortFixture { port_id: 11, device_id: 2, in_errors: "9", out_errors: "1", ..Default::default() }),
                fixtures::port(PortFixture { port_id: 12, device_id: 2, ..Default::default() }),
                fixtures::port(PortFixture { port_id: 13, device_id: 1, out_errors: "2", ..Default::default() }),
            ]),
        );

    harness.run(JobKind::PortFailures).await.unwrap();
    let ranked = harness.snapshot(SnapshotKind::PortFailures).await.unwrap().unwrap();
    let ranked = ranked.as_array().unwrap();

    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0]["port_id"], "11");
    assert_eq!(ranked[0]["total_errors"], 10);
    assert_eq!(ranked[0]["device_name"], "core.lan");
    assert_eq!(ranked[1]["port_id"], "10");
}

#[tokio::test]
async fn device_names_snapshot_is_replaced_each_run() {
    let harness = TestHarness::new();
    harness.source.on("devices", fixtures::devices(&[fixtures::device_entry(1, "edge")]));
    harness.run(JobKind::DeviceNames).await.unwrap();

    harness.source.on("devices", fixtures::devices(&[fixtures::device_entry(2, "core")]));
    harness.run(JobKind::DeviceNames).await.unwrap();

    let names = harness.snapshot(SnapshotKind::DeviceNames).await.unwrap().unwrap();
    assert_eq!(names, json!({"2": {"hostname": "core", "sysName": "core.lan", "ip": "10.0.0.2"}}));
    assert_eq!(harness.store.snapshot_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn hung_source_is_a_fetch_timeout() {
    let harness = TestHarness::new().configure(|c| c.api.timeout_secs = 5);
    harness.source.hang("devices");

    let err = harness.run(JobKind::DeviceNames).await.unwrap_err();
    assert!(matches!(err, PipelineError::Fetch(FetchFailure::Timeout { .. })));
}

#[tokio::test(start_paused = true)]
async fn scheduler_keeps_running_jobs_after_one_fails() {
    let harness = TestHarness::new();
    harness
        .source
        .fail("graph.php", 500)
        .on("devices", fixtures::devices(&[fixtures::device_entry(1, "edge")]));

    let health = HealthTracker::new();
    let mut scheduler = Scheduler::new();
    scheduler.register(JobKind::Graphs, Duration::from_secs(3600));
    scheduler.register(JobKind::DeviceNames, Duration::from_secs(3600));
    let handle = scheduler.start(Arc::new(harness.pipeline()), health.clone());

    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.shutdown(Duration::from_secs(1)).await;

    let report = queries::health_report(&health);
    assert_eq!(report.jobs[&JobKind::Graphs].failures, 1);
    assert_eq!(report.jobs[&JobKind::DeviceNames].successes, 1);
    assert!(harness.snapshot(SnapshotKind::DeviceNames).await.unwrap().is_some());
}
