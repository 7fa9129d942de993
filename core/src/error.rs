use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Storage backend error: {0}")]
    Storage(String),

    #[error("Queue unavailable: {0}")]
    Queue(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        PipelineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether a job that failed with this error should be rescheduled.
    ///
    /// NotFound and Validation are permanent: retrying cannot manufacture a
    /// missing row or fix a malformed payload. Everything else is treated as
    /// transient I/O and gets the exponential-backoff treatment.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            PipelineError::NotFound { .. }
                | PipelineError::Validation(_)
                | PipelineError::Serialization(_)
        )
    }
}
