use super::ComplianceStore;
use crate::{
    devices::{DeviceTokenRow, Platform},
    error::PipelineResult,
    types::{UnixMillis, UserId},
};
use rusqlite::{params, types::Type, OptionalExtension};

fn device_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeviceTokenRow> {
    let platform: String = row.get(2)?;
    Ok(DeviceTokenRow {
        token: row.get(0)?,
        user_id: row.get(1)?,
        platform: Platform::parse(&platform).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                Type::Text,
                format!("unexpected platform '{platform}'").into(),
            )
        })?,
        active: row.get::<_, i64>(3)? != 0,
        last_seen: row.get(4)?,
    })
}

impl ComplianceStore {
    // ── Device token ───────────────────────────────────────────

    /// Upsert keyed by token value. Re-registering a deactivated token
    /// reactivates it and re-points it at the registering user.
    pub fn upsert_device_token(
        &self,
        token: &str,
        user_id: UserId,
        platform: Platform,
        now: UnixMillis,
    ) -> PipelineResult<()> {
        self.conn().execute(
            "INSERT INTO device_token (token, user_id, platform, active, last_seen)
             VALUES (?1, ?2, ?3, 1, ?4)
             ON CONFLICT(token) DO UPDATE
             SET user_id = ?2, platform = ?3, active = 1, last_seen = ?4",
            params![token, user_id, platform.as_str(), now],
        )?;
        Ok(())
    }

    pub fn get_device_token(&self, token: &str) -> PipelineResult<Option<DeviceTokenRow>> {
        self.conn()
            .query_row(
                "SELECT token, user_id, platform, active, last_seen
                 FROM device_token WHERE token = ?1",
                params![token],
                device_row_mapper,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn active_tokens_for_user(&self, user_id: UserId) -> PipelineResult<Vec<DeviceTokenRow>> {
        let mut stmt = self.conn().prepare(
            "SELECT token, user_id, platform, active, last_seen
             FROM device_token WHERE user_id = ?1 AND active = 1 ORDER BY token",
        )?;
        let rows = stmt.query_map(params![user_id], device_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Set-based deactivation; safe to run concurrently from multiple
    /// delivery attempts.
    pub fn deactivate_tokens(&self, tokens: &[String]) -> PipelineResult<()> {
        let mut stmt = self
            .conn()
            .prepare("UPDATE device_token SET active = 0 WHERE token = ?1")?;
        for token in tokens {
            stmt.execute(params![token])?;
        }
        Ok(())
    }
}
