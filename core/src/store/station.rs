use super::ComplianceStore;
use crate::{
    complaints::{ComplaintRow, NewComplaint},
    error::PipelineResult,
    types::{StationId, UnixMillis},
};
use rusqlite::{params, types::Type, OptionalExtension};

/// A monitored fuel station. `history` is the ordered sequence of recorded
/// observations, stored as a JSON array (may contain junk entries that the
/// analyzer drops).
#[derive(Debug, Clone)]
pub struct StationRow {
    pub id: StationId,
    pub name: String,
    pub price: f64,
    pub official_price: f64,
    pub stock: Option<f64>,
    pub history: Vec<serde_json::Value>,
    pub created_at: UnixMillis,
}

fn station_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<StationRow> {
    let history: String = row.get(5)?;
    Ok(StationRow {
        id: row.get(0)?,
        name: row.get(1)?,
        price: row.get(2)?,
        official_price: row.get(3)?,
        stock: row.get(4)?,
        history: serde_json::from_str(&history).map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(5, Type::Text, err.into())
        })?,
        created_at: row.get(6)?,
    })
}

fn complaint_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<ComplaintRow> {
    Ok(ComplaintRow {
        id: row.get(0)?,
        station_name: row.get(1)?,
        kind: row.get(2)?,
        detail: row.get(3)?,
        photo_url: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
    })
}

impl ComplianceStore {
    // ── Stations ───────────────────────────────────────────────

    pub fn insert_station(
        &self,
        name: &str,
        price: f64,
        official_price: f64,
        stock: Option<f64>,
        history: &[serde_json::Value],
        now: UnixMillis,
    ) -> PipelineResult<StationId> {
        let history = serde_json::to_string(history)?;
        self.conn().execute(
            "INSERT INTO station (name, price, official_price, stock, history, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![name, price, official_price, stock, history, now],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    pub fn get_station(&self, station_id: StationId) -> PipelineResult<Option<StationRow>> {
        self.conn()
            .query_row(
                "SELECT id, name, price, official_price, stock, history, created_at
                 FROM station WHERE id = ?1",
                params![station_id],
                station_row_mapper,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn station_count(&self) -> PipelineResult<i64> {
        self.conn()
            .query_row("SELECT COUNT(*) FROM station", [], |row| row.get(0))
            .map_err(Into::into)
    }

    // ── Audits ─────────────────────────────────────────────────

    pub fn insert_audit(&self, station_id: StationId, status: &str, now: UnixMillis) -> PipelineResult<i64> {
        self.conn().execute(
            "INSERT INTO audit (station_id, status, created_at) VALUES (?1, ?2, ?3)",
            params![station_id, status, now],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    pub fn audit_count_since(&self, since: UnixMillis) -> PipelineResult<i64> {
        self.conn()
            .query_row(
                "SELECT COUNT(*) FROM audit WHERE created_at >= ?1",
                params![since],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    // ── Complaints ─────────────────────────────────────────────

    pub fn insert_complaint(&self, input: &NewComplaint, now: UnixMillis) -> PipelineResult<ComplaintRow> {
        self.conn().execute(
            "INSERT INTO complaint (station_name, kind, detail, photo_url, status, created_at)
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5)",
            params![input.station_name, input.kind, input.detail, input.photo_url, now],
        )?;
        let id = self.conn().last_insert_rowid();
        self.conn()
            .query_row(
                "SELECT id, station_name, kind, detail, photo_url, status, created_at
                 FROM complaint WHERE id = ?1",
                params![id],
                complaint_row_mapper,
            )
            .map_err(Into::into)
    }

    pub fn pending_complaint_count(&self) -> PipelineResult<i64> {
        self.conn()
            .query_row(
                "SELECT COUNT(*) FROM complaint WHERE status = 'pending'",
                [],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }
}
