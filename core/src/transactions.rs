//! Transaction recording with risk enrichment.
//!
//! The risk assessment is produced once, at creation time, and persisted
//! with the transaction — never recomputed retroactively. The compliance
//! analysis, by contrast, is derived on every read and never stored.

use crate::{
    analysis::{analyze_vehicle_transaction, AnalysisResult},
    error::{PipelineError, PipelineResult},
    risk_model::{RiskModelClient, TransactionFeatures},
    store::ComplianceStore,
    types::{now_millis, StationId, TransactionId, UnixMillis, VehicleId},
};

#[derive(Debug, Clone)]
pub struct VehicleRow {
    pub id: VehicleId,
    pub plate: String,
    pub model: Option<String>,
    pub capacity_liters: f64,
    pub fuel_type: Option<String>,
    pub owner_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TransactionRow {
    pub id: TransactionId,
    pub station_id: StationId,
    pub vehicle_id: VehicleId,
    pub liters: f64,
    pub unit_price: f64,
    pub total_amount: f64,
    pub payment_method: Option<String>,
    pub reported_by: Option<String>,
    pub risk_score: Option<f64>,
    pub risk_label: Option<String>,
    pub model_version: Option<String>,
    pub occurred_at: UnixMillis,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub station_id: StationId,
    pub vehicle_id: VehicleId,
    pub liters: f64,
    pub unit_price: f64,
    pub payment_method: Option<String>,
    pub reported_by: Option<String>,
    pub occurred_at: Option<UnixMillis>,
}

#[derive(Debug, Clone)]
pub struct RecordedTransaction {
    pub transaction: TransactionRow,
    pub analysis: AnalysisResult,
}

/// Record one fuel transaction.
///
/// The external model is best-effort enrichment: a disabled, slow or broken
/// model never prevents the transaction from being recorded. The candidate
/// liters amount is analyzed against the vehicle history as it stood before
/// this transaction.
pub fn record_transaction(
    store: &ComplianceStore,
    model: &RiskModelClient,
    input: NewTransaction,
) -> PipelineResult<RecordedTransaction> {
    // NaN fails every ordered comparison, so finiteness is checked first.
    if !input.liters.is_finite()
        || !input.unit_price.is_finite()
        || input.liters <= 0.0
        || input.unit_price <= 0.0
    {
        return Err(PipelineError::Validation(
            "liters and unit_price must be positive finite numbers".into(),
        ));
    }

    let vehicle = store
        .get_vehicle(input.vehicle_id)?
        .ok_or_else(|| PipelineError::not_found("vehicle", input.vehicle_id))?;

    let total_amount = (input.liters * input.unit_price * 100.0).round() / 100.0;

    let risk = model.evaluate(&TransactionFeatures {
        liters: input.liters,
        unit_price: input.unit_price,
        total_amount,
        capacity_liters: Some(vehicle.capacity_liters),
    });

    let history = store.vehicle_liters_history(input.vehicle_id)?;
    let analysis = analyze_vehicle_transaction(input.liters, vehicle.capacity_liters, &history);

    let occurred_at = input.occurred_at.unwrap_or_else(now_millis);
    let id = store.insert_transaction(
        &input,
        total_amount,
        risk.as_ref(),
        occurred_at,
    )?;

    let transaction = store
        .get_transaction(id)?
        .ok_or_else(|| PipelineError::not_found("transaction", id))?;

    Ok(RecordedTransaction { transaction, analysis })
}
