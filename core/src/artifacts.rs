//! Artifact storage — "write named bytes under a category", with two
//! interchangeable backends behind one interface.
//!
//! - Local: files live under a category-scoped directory; the returned URL
//!   is resolved later by the auth-gated file-serving collaborator.
//! - Remote: the local scratch file is uploaded under `category/filename`
//!   as the object key, then deleted best-effort.
//!
//! Filenames are never trusted: anything outside `[A-Za-z0-9._-]` is
//! rewritten before it touches a path or a key.

use crate::{
    config::{S3Config, StorageConfig, StorageDriver},
    error::{PipelineError, PipelineResult},
};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactCategory {
    Reports,
    Complaints,
}

impl ArtifactCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactCategory::Reports => "reports",
            ArtifactCategory::Complaints => "complaints",
        }
    }
}

impl fmt::Display for ArtifactCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rewrite characters outside the safe set to `_`.
pub fn safe_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Size in megabytes, rounded to two decimals, as exposed to clients.
pub fn estimate_size_mb(size_bytes: u64) -> f64 {
    (size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
}

#[derive(Debug, Clone)]
pub struct StoredArtifact {
    /// Durable URL a client can fetch the artifact from.
    pub file_url: String,
    /// Backend key (`category/filename`).
    pub key: String,
}

/// Put-object seam for the remote backend. The shipped implementation does a
/// plain authenticated PUT against an S3-compatible endpoint; tests inject
/// failing stand-ins through the same trait.
pub trait ObjectStore: Send + Sync {
    fn put_object(
        &self,
        key: &str,
        local_path: &Path,
        content_type: Option<&str>,
    ) -> PipelineResult<()>;
}

/// S3-compatible put-object over HTTP (path-style: `{endpoint}/{bucket}/{key}`).
pub struct HttpObjectStore {
    endpoint: String,
    bucket: String,
    access_key: String,
    agent: ureq::Agent,
}

impl HttpObjectStore {
    pub fn new(config: &S3Config) -> Self {
        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            bucket: config.bucket.clone(),
            access_key: config.access_key.clone(),
            agent: ureq::Agent::new_with_defaults(),
        }
    }
}

impl ObjectStore for HttpObjectStore {
    fn put_object(
        &self,
        key: &str,
        local_path: &Path,
        content_type: Option<&str>,
    ) -> PipelineResult<()> {
        let url = format!("{}/{}/{}", self.endpoint, self.bucket, key);
        let body = fs::read(local_path)?;
        let response = self
            .agent
            .put(&url)
            .header("authorization", &format!("Bearer {}", self.access_key))
            .header(
                "content-type",
                content_type.unwrap_or("application/octet-stream"),
            )
            .send(&body[..])
            .map_err(|err| PipelineError::Storage(format!("put {key}: {err}")))?;
        if !response.status().is_success() {
            return Err(PipelineError::Storage(format!(
                "put {key}: HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}

enum Backend {
    Local { root: PathBuf },
    Remote { objects: Box<dyn ObjectStore> },
}

pub struct ArtifactStore {
    backend: Backend,
    base_url: String,
}

impl ArtifactStore {
    /// Local-filesystem backend rooted at `root`. Creates the category
    /// directories up front so writers never race on mkdir.
    pub fn local(root: &Path, base_url: &str) -> PipelineResult<Self> {
        for category in [ArtifactCategory::Reports, ArtifactCategory::Complaints] {
            fs::create_dir_all(root.join(category.as_str()))?;
        }
        Ok(Self {
            backend: Backend::Local {
                root: root.to_path_buf(),
            },
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Remote-object backend over any `ObjectStore` implementation.
    pub fn remote(objects: Box<dyn ObjectStore>, base_url: &str) -> Self {
        Self {
            backend: Backend::Remote { objects },
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> PipelineResult<Self> {
        match config.driver {
            StorageDriver::Local => Self::local(&config.root_dir, &config.base_url),
            StorageDriver::S3 => {
                let s3 = config.s3.as_ref().ok_or_else(|| {
                    PipelineError::Validation("s3 driver selected without s3 settings".into())
                })?;
                Ok(Self::remote(
                    Box::new(HttpObjectStore::new(s3)),
                    &config.base_url,
                ))
            }
        }
    }

    /// Where a producer should write the artifact before calling [`store`].
    /// The local backend hands out the final path directly; the remote one a
    /// scratch path in the system temp dir.
    ///
    /// [`store`]: ArtifactStore::store
    pub fn scratch_path(&self, category: ArtifactCategory, filename: &str) -> PathBuf {
        let filename = safe_filename(filename);
        match &self.backend {
            Backend::Local { root } => root.join(category.as_str()).join(filename),
            Backend::Remote { .. } => std::env::temp_dir().join(filename),
        }
    }

    /// Make the file at `local_path` durable under `category/filename` and
    /// return its URL and key.
    pub fn store(
        &self,
        category: ArtifactCategory,
        filename: &str,
        local_path: &Path,
        content_type: Option<&str>,
    ) -> PipelineResult<StoredArtifact> {
        let filename = safe_filename(filename);
        let key = format!("{}/{}", category.as_str(), filename);

        match &self.backend {
            Backend::Local { root } => {
                let target = root.join(category.as_str()).join(&filename);
                if local_path != target {
                    fs::copy(local_path, &target)?;
                }
                Ok(StoredArtifact {
                    file_url: format!("{}/files/{}/{}", self.base_url, category.as_str(), filename),
                    key,
                })
            }
            Backend::Remote { objects } => {
                objects.put_object(&key, local_path, content_type)?;
                // Best-effort cleanup of the scratch file.
                if let Err(err) = fs::remove_file(local_path) {
                    log::warn!("could not remove scratch file {}: {err}", local_path.display());
                }
                Ok(StoredArtifact {
                    file_url: format!("{}/{}", self.base_url, key),
                    key,
                })
            }
        }
    }
}
