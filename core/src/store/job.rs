use super::ComplianceStore;
use crate::{
    error::PipelineResult,
    queue::{JobRow, JobStatus},
    types::{JobId, UnixMillis},
};
use rusqlite::{params, types::Type, OptionalExtension};

fn job_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRow> {
    let status: String = row.get(3)?;
    Ok(JobRow {
        id: row.get(0)?,
        queue: row.get(1)?,
        payload: row.get(2)?,
        status: JobStatus::parse(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                Type::Text,
                format!("unexpected status '{status}'").into(),
            )
        })?,
        attempts_made: row.get(4)?,
        max_attempts: row.get(5)?,
        available_at: row.get(6)?,
        claimed_at: row.get(7)?,
        last_error: row.get(8)?,
        created_at: row.get(9)?,
        finished_at: row.get(10)?,
    })
}

const JOB_COLUMNS: &str =
    "id, queue, payload, status, attempts_made, max_attempts, available_at, claimed_at, last_error, created_at, finished_at";

impl ComplianceStore {
    // ── Jobs ───────────────────────────────────────────────────

    pub fn insert_job(
        &self,
        queue: &str,
        payload: &str,
        max_attempts: i64,
        now: UnixMillis,
    ) -> PipelineResult<JobId> {
        self.conn().execute(
            "INSERT INTO job (queue, payload, status, attempts_made, max_attempts, available_at, created_at)
             VALUES (?1, ?2, 'queued', 0, ?3, ?4, ?4)",
            params![queue, payload, max_attempts, now],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    /// Atomically claim the oldest due job on `queue`: flips it to `active`,
    /// increments `attempts_made` and stamps `claimed_at` in one UPDATE, so
    /// no two connections can ever claim the same job.
    pub fn claim_due_job(&self, queue: &str, now: UnixMillis) -> PipelineResult<Option<JobRow>> {
        self.conn()
            .query_row(
                &format!(
                    "UPDATE job SET status = 'active', attempts_made = attempts_made + 1, claimed_at = ?2
                     WHERE id = (
                         SELECT id FROM job
                         WHERE queue = ?1 AND status = 'queued' AND available_at <= ?2
                         ORDER BY id LIMIT 1
                     )
                     RETURNING {JOB_COLUMNS}"
                ),
                params![queue, now],
                job_row_mapper,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Jobs still `active` whose claim is older than `cutoff`. Their worker
    /// died (or lost its store connection) between claim and settle.
    pub fn stalled_active_jobs(&self, queue: &str, cutoff: UnixMillis) -> PipelineResult<Vec<JobRow>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM job
             WHERE queue = ?1 AND status = 'active' AND claimed_at <= ?2
             ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![queue, cutoff], job_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn complete_job(&self, job_id: JobId, now: UnixMillis) -> PipelineResult<()> {
        self.conn().execute(
            "UPDATE job SET status = 'completed', finished_at = ?2, last_error = NULL WHERE id = ?1",
            params![job_id, now],
        )?;
        Ok(())
    }

    /// Put a failed attempt back on the queue, due at `available_at`.
    pub fn reschedule_job(
        &self,
        job_id: JobId,
        available_at: UnixMillis,
        error: &str,
    ) -> PipelineResult<()> {
        self.conn().execute(
            "UPDATE job SET status = 'queued', available_at = ?2, claimed_at = NULL, last_error = ?3
             WHERE id = ?1",
            params![job_id, available_at, error],
        )?;
        Ok(())
    }

    /// Terminal failure: the job stays for operator inspection.
    pub fn kill_job(&self, job_id: JobId, error: &str, now: UnixMillis) -> PipelineResult<()> {
        self.conn().execute(
            "UPDATE job SET status = 'dead', last_error = ?2, finished_at = ?3 WHERE id = ?1",
            params![job_id, error, now],
        )?;
        Ok(())
    }

    /// Bounded retention: keep only the newest `keep` rows with `status` on
    /// `queue`.
    pub fn prune_finished_jobs(&self, queue: &str, status: &str, keep: i64) -> PipelineResult<()> {
        self.conn().execute(
            "DELETE FROM job
             WHERE queue = ?1 AND status = ?2 AND id NOT IN (
                 SELECT id FROM job WHERE queue = ?1 AND status = ?2
                 ORDER BY id DESC LIMIT ?3
             )",
            params![queue, status, keep],
        )?;
        Ok(())
    }

    pub fn get_job(&self, job_id: JobId) -> PipelineResult<Option<JobRow>> {
        self.conn()
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM job WHERE id = ?1"),
                params![job_id],
                job_row_mapper,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn job_count_by_status(&self, queue: &str, status: &str) -> PipelineResult<i64> {
        self.conn()
            .query_row(
                "SELECT COUNT(*) FROM job WHERE queue = ?1 AND status = ?2",
                params![queue, status],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }
}
