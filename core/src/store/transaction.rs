use super::ComplianceStore;
use crate::{
    error::PipelineResult,
    risk_model::RiskAssessment,
    transactions::{NewTransaction, TransactionRow, VehicleRow},
    types::{TransactionId, UnixMillis, VehicleId},
};
use rusqlite::{params, OptionalExtension};

fn vehicle_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<VehicleRow> {
    Ok(VehicleRow {
        id: row.get(0)?,
        plate: row.get(1)?,
        model: row.get(2)?,
        capacity_liters: row.get(3)?,
        fuel_type: row.get(4)?,
        owner_name: row.get(5)?,
    })
}

fn transaction_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<TransactionRow> {
    Ok(TransactionRow {
        id: row.get(0)?,
        station_id: row.get(1)?,
        vehicle_id: row.get(2)?,
        liters: row.get(3)?,
        unit_price: row.get(4)?,
        total_amount: row.get(5)?,
        payment_method: row.get(6)?,
        reported_by: row.get(7)?,
        risk_score: row.get(8)?,
        risk_label: row.get(9)?,
        model_version: row.get(10)?,
        occurred_at: row.get(11)?,
    })
}

impl ComplianceStore {
    // ── Vehicles ───────────────────────────────────────────────

    pub fn insert_vehicle(
        &self,
        plate: &str,
        model: Option<&str>,
        capacity_liters: f64,
        fuel_type: Option<&str>,
        owner_name: Option<&str>,
        now: UnixMillis,
    ) -> PipelineResult<VehicleId> {
        self.conn().execute(
            "INSERT INTO vehicle (plate, model, capacity_liters, fuel_type, owner_name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![plate, model, capacity_liters, fuel_type, owner_name, now],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    pub fn get_vehicle(&self, vehicle_id: VehicleId) -> PipelineResult<Option<VehicleRow>> {
        self.conn()
            .query_row(
                "SELECT id, plate, model, capacity_liters, fuel_type, owner_name
                 FROM vehicle WHERE id = ?1",
                params![vehicle_id],
                vehicle_row_mapper,
            )
            .optional()
            .map_err(Into::into)
    }

    // ── Transactions ───────────────────────────────────────────

    pub fn insert_transaction(
        &self,
        input: &NewTransaction,
        total_amount: f64,
        risk: Option<&RiskAssessment>,
        occurred_at: UnixMillis,
    ) -> PipelineResult<TransactionId> {
        self.conn().execute(
            "INSERT INTO fuel_transaction
                 (station_id, vehicle_id, liters, unit_price, total_amount,
                  payment_method, reported_by, risk_score, risk_label, model_version, occurred_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                input.station_id,
                input.vehicle_id,
                input.liters,
                input.unit_price,
                total_amount,
                input.payment_method,
                input.reported_by,
                risk.and_then(|r| r.score),
                risk.map(|r| r.label.as_str()),
                risk.and_then(|r| r.model_version.as_deref()),
                occurred_at,
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    pub fn get_transaction(&self, transaction_id: TransactionId) -> PipelineResult<Option<TransactionRow>> {
        self.conn()
            .query_row(
                "SELECT id, station_id, vehicle_id, liters, unit_price, total_amount,
                        payment_method, reported_by, risk_score, risk_label, model_version, occurred_at
                 FROM fuel_transaction WHERE id = ?1",
                params![transaction_id],
                transaction_row_mapper,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Liters dispensed per past transaction of `vehicle_id`, most recent
    /// first.
    pub fn vehicle_liters_history(&self, vehicle_id: VehicleId) -> PipelineResult<Vec<f64>> {
        let mut stmt = self.conn().prepare(
            "SELECT liters FROM fuel_transaction
             WHERE vehicle_id = ?1 ORDER BY occurred_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![vehicle_id], |row| row.get(0))?;
        let mut out = Vec::new();
        for liters in rows {
            out.push(liters?);
        }
        Ok(out)
    }
}
