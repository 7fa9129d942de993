//! Pipeline configuration, read from the environment.
//!
//! Mirrors the deployment knobs of the hosted system: storage driver and
//! base URL for served files, the optional external risk model, and the push
//! gateway. Inconsistent combinations (s3 driver without credentials, model
//! enabled without a URL) are rejected up front rather than at first use.

use crate::{
    error::{PipelineError, PipelineResult},
    risk_model::RiskLabel,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_PUSH_URL: &str = "https://exp.host/--/api/v2/push/send";
pub const DEFAULT_MODEL_TIMEOUT_MS: u64 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageDriver {
    Local,
    S3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub driver: StorageDriver,
    /// Root directory for the local driver; also the scratch area for s3.
    pub root_dir: PathBuf,
    /// Prefix for the URLs handed back to clients; a separate file-serving
    /// collaborator resolves them.
    pub base_url: String,
    pub s3: Option<S3Config>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub enabled: bool,
    pub api_url: Option<String>,
    pub timeout_ms: u64,
    pub fallback_label: RiskLabel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    pub api_url: String,
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub storage: StorageConfig,
    pub model: ModelConfig,
    pub push: PushConfig,
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_flag(key: &str) -> bool {
    matches!(env_string(key).as_deref(), Some("true") | Some("1"))
}

fn trim_base_url(value: &str) -> String {
    value.trim_end_matches('/').to_string()
}

impl PipelineConfig {
    /// Read configuration from the process environment.
    ///
    /// Keys: `STORAGE_DRIVER`, `STORAGE_DIR`, `FILES_BASE_URL`, `S3_ENDPOINT`,
    /// `S3_BUCKET`, `S3_ACCESS_KEY`, `S3_SECRET_KEY`, `ML_ENABLED`,
    /// `ML_API_URL`, `ML_TIMEOUT_MS`, `ML_FALLBACK_LABEL`, `PUSH_API_URL`,
    /// `PUSH_ACCESS_TOKEN`.
    pub fn from_env() -> PipelineResult<Self> {
        let driver = match env_string("STORAGE_DRIVER").as_deref() {
            None | Some("local") => StorageDriver::Local,
            Some("s3") => StorageDriver::S3,
            Some(other) => {
                return Err(PipelineError::Validation(format!(
                    "unknown STORAGE_DRIVER '{other}' (expected 'local' or 's3')"
                )))
            }
        };

        let s3 = if driver == StorageDriver::S3 {
            let endpoint = env_string("S3_ENDPOINT");
            let bucket = env_string("S3_BUCKET");
            let access_key = env_string("S3_ACCESS_KEY");
            let secret_key = env_string("S3_SECRET_KEY");
            match (endpoint, bucket, access_key, secret_key) {
                (Some(endpoint), Some(bucket), Some(access_key), Some(secret_key)) => {
                    Some(S3Config { endpoint: trim_base_url(&endpoint), bucket, access_key, secret_key })
                }
                _ => {
                    return Err(PipelineError::Validation(
                        "S3_ENDPOINT, S3_BUCKET, S3_ACCESS_KEY and S3_SECRET_KEY must all be set when STORAGE_DRIVER=s3".into(),
                    ))
                }
            }
        } else {
            None
        };

        let storage = StorageConfig {
            driver,
            root_dir: env_string("STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("storage")),
            base_url: trim_base_url(
                &env_string("FILES_BASE_URL").unwrap_or_else(|| "http://localhost:4000".into()),
            ),
            s3,
        };

        let enabled = env_flag("ML_ENABLED");
        let api_url = env_string("ML_API_URL").map(|u| trim_base_url(&u));
        if enabled && api_url.is_none() {
            return Err(PipelineError::Validation(
                "ML_API_URL must be set when ML_ENABLED=true".into(),
            ));
        }
        let fallback_label = match env_string("ML_FALLBACK_LABEL") {
            Some(raw) => RiskLabel::parse_strict(&raw).ok_or_else(|| {
                PipelineError::Validation(format!("invalid ML_FALLBACK_LABEL '{raw}'"))
            })?,
            None => RiskLabel::Unknown,
        };
        let model = ModelConfig {
            enabled,
            api_url,
            timeout_ms: env_string("ML_TIMEOUT_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MODEL_TIMEOUT_MS),
            fallback_label,
        };

        let push = PushConfig {
            api_url: env_string("PUSH_API_URL").unwrap_or_else(|| DEFAULT_PUSH_URL.into()),
            access_token: env_string("PUSH_ACCESS_TOKEN"),
        };

        Ok(Self { storage, model, push })
    }

    /// Local-filesystem defaults rooted at `dir`, with the model disabled.
    /// Used by tests and for first-run development setups.
    pub fn local_defaults(dir: &Path) -> Self {
        Self {
            storage: StorageConfig {
                driver: StorageDriver::Local,
                root_dir: dir.to_path_buf(),
                base_url: "http://localhost:4000".into(),
                s3: None,
            },
            model: ModelConfig {
                enabled: false,
                api_url: None,
                timeout_ms: DEFAULT_MODEL_TIMEOUT_MS,
                fallback_label: RiskLabel::Unknown,
            },
            push: PushConfig {
                api_url: DEFAULT_PUSH_URL.into(),
                access_token: None,
            },
        }
    }
}
