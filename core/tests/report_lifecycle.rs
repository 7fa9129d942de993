//! Report lifecycle tests: queued -> processing -> ready / failed, through
//! the generator directly and through a worker draining the queue.

use fuelwatch_core::artifacts::{ArtifactStore, ObjectStore};
use fuelwatch_core::config::PipelineConfig;
use fuelwatch_core::error::{PipelineError, PipelineResult};
use fuelwatch_core::push::PushDispatcher;
use fuelwatch_core::queue::{JobQueue, QueueName};
use fuelwatch_core::reports::{
    create_report, enqueue_report_generation, ReportFormat, ReportGenerator, ReportPeriod,
    ReportStatus,
};
use fuelwatch_core::store::ComplianceStore;
use fuelwatch_core::types::now_millis;
use fuelwatch_core::worker::Worker;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn test_db(dir: &TempDir) -> ComplianceStore {
    let path = dir.path().join("reports.db");
    let store = ComplianceStore::open(path.to_str().expect("utf-8 path")).expect("open");
    store.migrate().expect("migrate");
    store
}

fn local_artifacts(dir: &TempDir) -> ArtifactStore {
    ArtifactStore::local(&dir.path().join("storage"), "http://localhost:4000").expect("artifacts")
}

fn seed_counts(store: &ComplianceStore) {
    let now = now_millis();
    let station = store
        .insert_station("Station 1", 1.52, 1.52, Some(1000.0), &[], now)
        .unwrap();
    store.insert_station("Station 2", 1.48, 1.52, None, &[], now).unwrap();
    store.insert_audit(station, "pending", now).unwrap();
    store
        .insert_complaint(
            &fuelwatch_core::complaints::NewComplaint {
                station_name: "Station 1".into(),
                kind: "overpricing".into(),
                detail: None,
                photo_url: None,
            },
            now,
        )
        .unwrap();
}

/// CSV generation drives the row to `ready` with a URL, a mime type and a
/// positive size, and the artifact lands on disk with the summary rows.
#[test]
fn csv_report_reaches_ready_with_artifact() {
    let dir = TempDir::new().unwrap();
    let store = test_db(&dir);
    seed_counts(&store);

    let report_id = create_report(&store, ReportPeriod::Month, ReportFormat::Csv).unwrap();
    assert_eq!(
        store.get_report(report_id).unwrap().unwrap().status,
        ReportStatus::Queued
    );

    let generator = ReportGenerator::new(local_artifacts(&dir));
    let row = generator.generate(&store, report_id).unwrap();

    assert_eq!(row.status, ReportStatus::Ready);
    assert_eq!(row.mime_type.as_deref(), Some("text/csv"));
    assert!(row.size_mb.unwrap() > 0.0);
    let url = row.file_url.expect("url set");
    assert!(url.contains("/files/reports/"), "unexpected url {url}");

    let filename = url.rsplit('/').next().unwrap();
    let on_disk = dir.path().join("storage").join("reports").join(filename);
    let content = fs::read_to_string(&on_disk).expect("artifact on disk");
    assert!(content.starts_with("metric,value"));
    assert!(content.contains("stations,2"));
    assert!(content.contains("audits_this_month,1"));
    assert!(content.contains("pending_complaints,1"));
}

/// The PDF renderer produces a parseable PDF header and a .pdf artifact.
#[test]
fn pdf_report_writes_pdf_artifact() {
    let dir = TempDir::new().unwrap();
    let store = test_db(&dir);
    seed_counts(&store);

    let report_id = create_report(&store, ReportPeriod::Week, ReportFormat::Pdf).unwrap();
    let generator = ReportGenerator::new(local_artifacts(&dir));
    let row = generator.generate(&store, report_id).unwrap();

    assert_eq!(row.status, ReportStatus::Ready);
    assert_eq!(row.mime_type.as_deref(), Some("application/pdf"));
    let url = row.file_url.expect("url set");
    assert!(url.ends_with(".pdf"), "unexpected url {url}");

    let filename = url.rsplit('/').next().unwrap();
    let bytes = fs::read(dir.path().join("storage").join("reports").join(filename)).unwrap();
    assert!(bytes.starts_with(b"%PDF-1.4"));
    assert!(bytes.ends_with(b"%%EOF\n"));
}

/// The excel format shares the delimited renderer but keeps its own mime.
#[test]
fn excel_report_uses_csv_body_with_excel_mime() {
    let dir = TempDir::new().unwrap();
    let store = test_db(&dir);

    let report_id = create_report(&store, ReportPeriod::Year, ReportFormat::Excel).unwrap();
    let row = ReportGenerator::new(local_artifacts(&dir))
        .generate(&store, report_id)
        .unwrap();

    assert_eq!(row.mime_type.as_deref(), Some("application/vnd.ms-excel"));
    assert!(row.file_url.unwrap().ends_with(".csv"));
}

struct BrokenBackend;

impl ObjectStore for BrokenBackend {
    fn put_object(&self, key: &str, _path: &Path, _content_type: Option<&str>) -> PipelineResult<()> {
        Err(PipelineError::Storage(format!("put {key}: connection reset")))
    }
}

/// A storage backend failure marks the row `failed` with the error and no
/// URL, and the error propagates so the queue can retry.
#[test]
fn storage_failure_marks_report_failed() {
    let dir = TempDir::new().unwrap();
    let store = test_db(&dir);

    let report_id = create_report(&store, ReportPeriod::Month, ReportFormat::Csv).unwrap();
    let generator =
        ReportGenerator::new(ArtifactStore::remote(Box::new(BrokenBackend), "https://cdn.example.com"));

    let err = generator.generate(&store, report_id).unwrap_err();
    assert!(err.is_retryable(), "storage failures should be retryable");

    let row = store.get_report(report_id).unwrap().expect("row");
    assert_eq!(row.status, ReportStatus::Failed);
    assert!(row.error.as_deref().unwrap().contains("connection reset"));
    assert!(row.file_url.is_none());
}

/// Generating a report that does not exist is NotFound and not retryable.
#[test]
fn missing_report_is_not_found() {
    let dir = TempDir::new().unwrap();
    let store = test_db(&dir);

    let err = ReportGenerator::new(local_artifacts(&dir))
        .generate(&store, 404)
        .unwrap_err();
    assert!(matches!(err, PipelineError::NotFound { .. }));
    assert!(!err.is_retryable());
}

/// If the job cannot even be enqueued, the row is failed immediately so no
/// `queued` report lingers with nothing that will execute it.
#[test]
fn enqueue_failure_marks_report_failed() {
    let dir = TempDir::new().unwrap();
    let store = test_db(&dir);

    // A queue on an unmigrated database cannot accept jobs.
    let broken_path = dir.path().join("empty.db");
    let broken_queue =
        JobQueue::new(ComplianceStore::open(broken_path.to_str().unwrap()).unwrap());

    let report_id = create_report(&store, ReportPeriod::Month, ReportFormat::Csv).unwrap();
    let err = enqueue_report_generation(&broken_queue, &store, report_id).unwrap_err();
    assert!(matches!(err, PipelineError::Queue(_)));

    let row = store.get_report(report_id).unwrap().expect("row");
    assert_eq!(row.status, ReportStatus::Failed);
    assert!(row.error.as_deref().unwrap().starts_with("enqueue failed:"));
}

/// End to end through the queue: enqueue, drain one worker pass, ready.
#[test]
fn worker_drains_report_job_to_ready() {
    let dir = TempDir::new().unwrap();
    let store = test_db(&dir);
    seed_counts(&store);
    let config = PipelineConfig::local_defaults(&dir.path().join("storage"));

    let queue = JobQueue::new(store.reopen().unwrap());
    let report_id = create_report(&store, ReportPeriod::Month, ReportFormat::Csv).unwrap();
    enqueue_report_generation(&queue, &store, report_id).unwrap();

    let worker = Worker::new(
        store.reopen().unwrap(),
        ArtifactStore::from_config(&config.storage).unwrap(),
        PushDispatcher::from_config(&config.push),
        vec![QueueName::Reports],
    )
    .unwrap();

    let executed = worker.drain().unwrap();
    assert_eq!(executed, 1);

    let row = store.get_report(report_id).unwrap().expect("row");
    assert_eq!(row.status, ReportStatus::Ready);
    assert!(row.file_url.is_some());
}
