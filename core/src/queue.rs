//! Durable job queue: two named queues with bounded retries, exponential
//! backoff, and bounded retention of finished jobs.
//!
//! The queue is an explicit handle constructed once at process start: the
//! producer side gets one for enqueueing, each worker constructs its own for
//! consuming. There is no process-global queue object.
//!
//! Payloads are a tagged union decoded once at claim time, so handlers
//! receive typed jobs rather than an untyped bag inspected by string
//! comparison.

use crate::{
    error::{PipelineError, PipelineResult},
    store::ComplianceStore,
    types::{JobId, ReportId, UnixMillis},
};
use serde::{Deserialize, Serialize};

/// Retry cap per job; attempt 3 failing leaves the job dead for inspection.
pub const MAX_ATTEMPTS: i64 = 3;

/// First retry delay; doubles per attempt (5s, 10s, 20s).
pub const BACKOFF_BASE_MS: i64 = 5_000;

/// Finished (completed or dead) jobs retained per queue, newest first.
pub const RETAINED_FINISHED_JOBS: i64 = 50;

/// Visibility timeout: a job still `active` this long after its claim is
/// presumed orphaned by a dead worker and recovered.
pub const STALLED_AFTER_MS: i64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueName {
    Reports,
    Notifications,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Reports => "reports",
            QueueName::Notifications => "notifications",
        }
    }

    pub const ALL: [QueueName; 2] = [QueueName::Reports, QueueName::Notifications];
}

/// Role-resolved notification target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyTarget {
    Supervisor,
    Admin,
}

impl NotifyTarget {
    pub fn role(&self) -> &'static str {
        match self {
            NotifyTarget::Supervisor => "supervisor",
            NotifyTarget::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    GenerateReport {
        report_id: ReportId,
    },
    Notify {
        target: NotifyTarget,
        title: String,
        body: String,
        #[serde(default)]
        data: serde_json::Value,
    },
}

impl JobPayload {
    /// Which named queue this job belongs on.
    pub fn queue(&self) -> QueueName {
        match self {
            JobPayload::GenerateReport { .. } => QueueName::Reports,
            JobPayload::Notify { .. } => QueueName::Notifications,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Active,
    Completed,
    Dead,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Dead => "dead",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(JobStatus::Queued),
            "active" => Some(JobStatus::Active),
            "completed" => Some(JobStatus::Completed),
            "dead" => Some(JobStatus::Dead),
            _ => None,
        }
    }
}

/// Raw job row, for inspection and tests.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: JobId,
    pub queue: String,
    pub payload: String,
    pub status: JobStatus,
    pub attempts_made: i64,
    pub max_attempts: i64,
    pub available_at: UnixMillis,
    pub claimed_at: Option<UnixMillis>,
    pub last_error: Option<String>,
    pub created_at: UnixMillis,
    pub finished_at: Option<UnixMillis>,
}

/// A job claimed by exactly one worker, payload already decoded.
#[derive(Debug)]
pub struct ClaimedJob {
    pub id: JobId,
    pub payload: JobPayload,
    pub attempts_made: i64,
    pub max_attempts: i64,
}

pub struct JobQueue {
    store: ComplianceStore,
}

impl JobQueue {
    pub fn new(store: ComplianceStore) -> Self {
        Self { store }
    }

    /// Submit a job to its queue, due immediately.
    pub fn enqueue(&self, payload: &JobPayload) -> PipelineResult<JobId> {
        let body = serde_json::to_string(payload)?;
        self.store
            .insert_job(payload.queue().as_str(), &body, MAX_ATTEMPTS, crate::types::now_millis())
            .map_err(|err| PipelineError::Queue(err.to_string()))
    }

    /// Claim the oldest due job on `queue`, if any. The claim is a single
    /// atomic UPDATE (SQLite serializes writers), so a job is never executed
    /// by two workers at once, even across processes. `attempts_made` is
    /// incremented by the claim itself.
    pub fn claim(&self, queue: QueueName, now: UnixMillis) -> PipelineResult<Option<ClaimedJob>> {
        let Some(row) = self.store.claim_due_job(queue.as_str(), now)? else {
            return Ok(None);
        };

        let payload: JobPayload = match serde_json::from_str(&row.payload) {
            Ok(p) => p,
            Err(err) => {
                // A payload we cannot decode is permanently failed, before
                // any handler I/O happens.
                log::error!("job {} has malformed payload: {err}", row.id);
                self.store
                    .kill_job(row.id, &format!("malformed payload: {err}"), now)?;
                return self.claim(queue, now);
            }
        };

        Ok(Some(ClaimedJob {
            id: row.id,
            payload,
            attempts_made: row.attempts_made,
            max_attempts: row.max_attempts,
        }))
    }

    /// Mark a claimed job successful and prune old finished jobs.
    pub fn complete(&self, job: &ClaimedJob, now: UnixMillis) -> PipelineResult<()> {
        self.store.complete_job(job.id, now)?;
        self.prune(job.payload.queue())?;
        Ok(())
    }

    /// Record a failed attempt. Retryable errors reschedule with exponential
    /// backoff until the attempt cap; everything else (and an exhausted cap)
    /// leaves the job dead with the last error attached.
    pub fn fail(&self, job: &ClaimedJob, error: &PipelineError, now: UnixMillis) -> PipelineResult<()> {
        let message = error.to_string();
        if error.is_retryable() && job.attempts_made < job.max_attempts {
            let delay = BACKOFF_BASE_MS << (job.attempts_made - 1).max(0);
            log::warn!(
                "job {} attempt {}/{} failed, retrying in {}ms: {message}",
                job.id,
                job.attempts_made,
                job.max_attempts,
                delay
            );
            self.store.reschedule_job(job.id, now + delay, &message)?;
        } else {
            log::error!(
                "job {} dead after {} attempt(s): {message}",
                job.id,
                job.attempts_made
            );
            self.store.kill_job(job.id, &message, now)?;
            self.prune(job.payload.queue())?;
        }
        Ok(())
    }

    /// Recover jobs whose worker died between claim and settle. An `active`
    /// job older than the visibility timeout goes back on the queue for
    /// another attempt, or dead once its attempts are spent, so a crash
    /// never strands a job invisibly. The claim already burned the attempt,
    /// meaning a job that stalls on every attempt still hits the cap.
    pub fn recover_stalled(&self, queue: QueueName, now: UnixMillis) -> PipelineResult<usize> {
        let stalled = self.store.stalled_active_jobs(queue.as_str(), now - STALLED_AFTER_MS)?;
        let recovered = stalled.len();
        for row in &stalled {
            if row.attempts_made < row.max_attempts {
                log::warn!(
                    "job {} stalled on attempt {}/{}, requeueing",
                    row.id,
                    row.attempts_made,
                    row.max_attempts
                );
                self.store
                    .reschedule_job(row.id, now, "worker stalled before settling")?;
            } else {
                log::error!(
                    "job {} stalled with attempts exhausted, marking dead",
                    row.id
                );
                self.store
                    .kill_job(row.id, "worker stalled before settling", now)?;
            }
        }
        if recovered > 0 {
            self.prune(queue)?;
        }
        Ok(recovered)
    }

    fn prune(&self, queue: QueueName) -> PipelineResult<()> {
        for status in [JobStatus::Completed, JobStatus::Dead] {
            self.store
                .prune_finished_jobs(queue.as_str(), status.as_str(), RETAINED_FINISHED_JOBS)?;
        }
        Ok(())
    }
}
