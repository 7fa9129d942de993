//! Artifact store tests: filename hygiene, both backends, configuration.

use fuelwatch_core::artifacts::{
    estimate_size_mb, safe_filename, ArtifactCategory, ArtifactStore, ObjectStore,
};
use fuelwatch_core::complaints::store_complaint_photo;
use fuelwatch_core::config::{PipelineConfig, StorageDriver};
use fuelwatch_core::error::PipelineResult;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[test]
fn safe_filename_rewrites_outside_the_safe_set() {
    assert_eq!(safe_filename("report_month.pdf"), "report_month.pdf");
    assert_eq!(safe_filename("foto estación #1.jpg"), "foto_estaci_n__1.jpg");
    assert_eq!(safe_filename("../../etc/passwd"), ".._.._etc_passwd");
    assert_eq!(safe_filename("a b/c\\d"), "a_b_c_d");
}

#[test]
fn size_estimates_round_to_two_decimals() {
    assert_eq!(estimate_size_mb(0), 0.0);
    assert_eq!(estimate_size_mb(1024 * 1024), 1.0);
    assert_eq!(estimate_size_mb(1536 * 1024), 1.5);
    // 3 MB + 333 KB = 3.325... -> 3.33
    assert_eq!(estimate_size_mb(3 * 1024 * 1024 + 333 * 1024), 3.33);
}

/// The local backend serves files from category directories and builds
/// `/files/...` URLs.
#[test]
fn local_backend_stores_under_category_dir() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::local(dir.path(), "http://localhost:4000/").unwrap();

    let scratch = store.scratch_path(ArtifactCategory::Reports, "summary.csv");
    fs::write(&scratch, "metric,value\n").unwrap();
    let stored = store
        .store(ArtifactCategory::Reports, "summary.csv", &scratch, Some("text/csv"))
        .unwrap();

    assert_eq!(stored.key, "reports/summary.csv");
    assert_eq!(stored.file_url, "http://localhost:4000/files/reports/summary.csv");
    assert!(dir.path().join("reports").join("summary.csv").exists());
}

struct RecordingBackend {
    puts: Arc<Mutex<Vec<(String, Option<String>)>>>,
}

impl ObjectStore for RecordingBackend {
    fn put_object(&self, key: &str, local_path: &Path, content_type: Option<&str>) -> PipelineResult<()> {
        assert!(local_path.exists(), "scratch file must exist during upload");
        self.puts
            .lock()
            .unwrap()
            .push((key.to_string(), content_type.map(str::to_string)));
        Ok(())
    }
}

/// The remote backend uploads under `category/filename` and removes the
/// scratch file afterwards.
#[test]
fn remote_backend_uploads_and_cleans_scratch() {
    let puts = Arc::new(Mutex::new(Vec::new()));
    let store = ArtifactStore::remote(
        Box::new(RecordingBackend { puts: Arc::clone(&puts) }),
        "https://cdn.example.com",
    );

    let scratch = store.scratch_path(ArtifactCategory::Complaints, "photo.jpg");
    fs::write(&scratch, b"jpeg-bytes").unwrap();
    let stored = store
        .store(ArtifactCategory::Complaints, "photo.jpg", &scratch, Some("image/jpeg"))
        .unwrap();

    assert_eq!(stored.key, "complaints/photo.jpg");
    assert_eq!(stored.file_url, "https://cdn.example.com/complaints/photo.jpg");
    assert!(!scratch.exists(), "scratch file should be cleaned up");

    let puts = puts.lock().unwrap();
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0], ("complaints/photo.jpg".to_string(), Some("image/jpeg".to_string())));
}

/// Complaint photos get a uuid prefix and a sanitized client filename.
#[test]
fn complaint_photo_is_sanitized_and_stored() {
    let dir = TempDir::new().unwrap();
    let artifacts = ArtifactStore::local(dir.path(), "http://localhost:4000").unwrap();

    let stored =
        store_complaint_photo(&artifacts, "mi foto #1.jpg", b"jpeg-bytes", Some("image/jpeg"))
            .unwrap();

    assert!(stored.file_url.contains("/files/complaints/"));
    assert!(stored.file_url.ends_with("_mi_foto__1.jpg"), "url was {}", stored.file_url);
    let filename = stored.key.strip_prefix("complaints/").unwrap();
    assert!(dir.path().join("complaints").join(filename).exists());
}

/// Environment-driven configuration, exercised in one sequential pass since
/// the process environment is shared.
#[test]
fn config_from_env_scenarios() {
    let clear = || {
        for key in [
            "STORAGE_DRIVER", "STORAGE_DIR", "FILES_BASE_URL", "S3_ENDPOINT", "S3_BUCKET",
            "S3_ACCESS_KEY", "S3_SECRET_KEY", "ML_ENABLED", "ML_API_URL", "ML_TIMEOUT_MS",
            "ML_FALLBACK_LABEL", "PUSH_API_URL", "PUSH_ACCESS_TOKEN",
        ] {
            std::env::remove_var(key);
        }
    };

    // Defaults: local driver, model disabled, stock push endpoint.
    clear();
    let config = PipelineConfig::from_env().unwrap();
    assert_eq!(config.storage.driver, StorageDriver::Local);
    assert_eq!(config.storage.root_dir, PathBuf::from("storage"));
    assert!(!config.model.enabled);
    assert!(config.push.api_url.contains("exp.host"));

    // s3 driver without credentials is rejected up front.
    clear();
    std::env::set_var("STORAGE_DRIVER", "s3");
    assert!(PipelineConfig::from_env().is_err());

    // Complete s3 settings parse, with trailing slashes trimmed.
    std::env::set_var("S3_ENDPOINT", "https://s3.example.com/");
    std::env::set_var("S3_BUCKET", "fuelwatch");
    std::env::set_var("S3_ACCESS_KEY", "ak");
    std::env::set_var("S3_SECRET_KEY", "sk");
    let config = PipelineConfig::from_env().unwrap();
    assert_eq!(config.storage.driver, StorageDriver::S3);
    assert_eq!(config.storage.s3.as_ref().unwrap().endpoint, "https://s3.example.com");

    // Model enabled without a URL is rejected.
    clear();
    std::env::set_var("ML_ENABLED", "true");
    assert!(PipelineConfig::from_env().is_err());

    std::env::set_var("ML_API_URL", "http://model.internal:8000/");
    std::env::set_var("ML_TIMEOUT_MS", "750");
    std::env::set_var("ML_FALLBACK_LABEL", "medium");
    let config = PipelineConfig::from_env().unwrap();
    assert!(config.model.enabled);
    assert_eq!(config.model.api_url.as_deref(), Some("http://model.internal:8000"));
    assert_eq!(config.model.timeout_ms, 750);

    // Garbage fallback labels are rejected rather than silently defaulted.
    std::env::set_var("ML_FALLBACK_LABEL", "catastrophic");
    assert!(PipelineConfig::from_env().is_err());

    clear();
}
