use super::ComplianceStore;
use crate::{
    error::PipelineResult,
    notifications::{NotificationRow, NotificationStatus},
    types::{NotificationId, UnixMillis, UserId},
};
use rusqlite::{params, types::Type, OptionalExtension};

fn notification_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<NotificationRow> {
    let status: String = row.get(5)?;
    let data: String = row.get(4)?;
    Ok(NotificationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        body: row.get(3)?,
        data: serde_json::from_str(&data).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e))
        })?,
        status: NotificationStatus::parse(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                5,
                Type::Text,
                format!("unexpected status '{status}'").into(),
            )
        })?,
        sent_at: row.get(6)?,
        error: row.get(7)?,
        created_at: row.get(8)?,
    })
}

impl ComplianceStore {
    // ── Notification ───────────────────────────────────────────

    pub fn insert_notification(
        &self,
        user_id: UserId,
        title: &str,
        body: &str,
        data: &serde_json::Value,
        now: UnixMillis,
    ) -> PipelineResult<NotificationId> {
        self.conn().execute(
            "INSERT INTO notification (user_id, title, body, data, status, created_at)
             VALUES (?1, ?2, ?3, ?4, 'queued', ?5)",
            params![user_id, title, body, serde_json::to_string(data)?, now],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    pub fn get_notification(&self, id: NotificationId) -> PipelineResult<Option<NotificationRow>> {
        self.conn()
            .query_row(
                "SELECT id, user_id, title, body, data, status, sent_at, error, created_at
                 FROM notification WHERE id = ?1",
                params![id],
                notification_row_mapper,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn mark_notification_sent(&self, id: NotificationId, sent_at: UnixMillis) -> PipelineResult<()> {
        self.conn().execute(
            "UPDATE notification SET status = 'sent', sent_at = ?2, error = NULL WHERE id = ?1",
            params![id, sent_at],
        )?;
        Ok(())
    }

    pub fn mark_notification_failed(&self, id: NotificationId, error: &str) -> PipelineResult<()> {
        self.conn().execute(
            "UPDATE notification SET status = 'failed', error = ?2 WHERE id = ?1",
            params![id, error],
        )?;
        Ok(())
    }

    pub fn notification_count(&self) -> PipelineResult<i64> {
        self.conn()
            .query_row("SELECT COUNT(*) FROM notification", [], |row| row.get(0))
            .map_err(Into::into)
    }
}
