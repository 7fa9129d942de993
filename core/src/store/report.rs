use super::ComplianceStore;
use crate::{
    error::PipelineResult,
    reports::{ReportFormat, ReportPeriod, ReportRow, ReportStatus},
    types::{ReportId, UnixMillis},
};
use rusqlite::{params, types::Type, OptionalExtension};

fn bad_text(index: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        Type::Text,
        format!("unexpected value '{value}'").into(),
    )
}

fn report_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReportRow> {
    let period: String = row.get(1)?;
    let format: String = row.get(2)?;
    let status: String = row.get(3)?;
    Ok(ReportRow {
        id: row.get(0)?,
        period: ReportPeriod::parse(&period).ok_or_else(|| bad_text(1, &period))?,
        format: ReportFormat::parse(&format).ok_or_else(|| bad_text(2, &format))?,
        status: ReportStatus::parse(&status).ok_or_else(|| bad_text(3, &status))?,
        size_mb: row.get(4)?,
        file_url: row.get(5)?,
        mime_type: row.get(6)?,
        error: row.get(7)?,
        created_at: row.get(8)?,
    })
}

impl ComplianceStore {
    // ── Report ─────────────────────────────────────────────────

    pub fn insert_report(
        &self,
        period: ReportPeriod,
        format: ReportFormat,
        now: UnixMillis,
    ) -> PipelineResult<ReportId> {
        self.conn().execute(
            "INSERT INTO report (period, format, status, created_at) VALUES (?1, ?2, 'queued', ?3)",
            params![period.as_str(), format.as_str(), now],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    pub fn get_report(&self, report_id: ReportId) -> PipelineResult<Option<ReportRow>> {
        self.conn()
            .query_row(
                "SELECT id, period, format, status, size_mb, file_url, mime_type, error, created_at
                 FROM report WHERE id = ?1",
                params![report_id],
                report_row_mapper,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Claim the row for generation: `processing`, previous error cleared.
    pub fn mark_report_processing(&self, report_id: ReportId) -> PipelineResult<()> {
        self.conn().execute(
            "UPDATE report SET status = 'processing', error = NULL WHERE id = ?1",
            params![report_id],
        )?;
        Ok(())
    }

    pub fn mark_report_ready(
        &self,
        report_id: ReportId,
        size_mb: f64,
        file_url: &str,
        mime_type: &str,
    ) -> PipelineResult<()> {
        self.conn().execute(
            "UPDATE report
             SET status = 'ready', size_mb = ?2, file_url = ?3, mime_type = ?4, error = NULL
             WHERE id = ?1",
            params![report_id, size_mb, file_url, mime_type],
        )?;
        Ok(())
    }

    /// `failed` is terminal from the client's point of view; only a queued
    /// retry of the same job moves the row back through `processing`.
    pub fn mark_report_failed(&self, report_id: ReportId, error: &str) -> PipelineResult<()> {
        self.conn().execute(
            "UPDATE report SET status = 'failed', error = ?2, file_url = NULL WHERE id = ?1",
            params![report_id, error],
        )?;
        Ok(())
    }
}
