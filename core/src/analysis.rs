//! Compliance analyzer — pure scoring of stations and vehicle transactions.
//!
//! Two rule sets share the same statistical backbone:
//! - Stations: a price above the official rate is a definitive violation and
//!   short-circuits everything else; otherwise the most recent history entry
//!   is z-scored against the station's own consumption history.
//! - Vehicle transactions: liters physically exceeding tank capacity (with a
//!   5% tolerance) is a definitive violation; otherwise the candidate liters
//!   amount is z-scored against the vehicle's history.
//!
//! No I/O, deterministic, recomputed on every read — results are never
//! persisted.

use serde::Serialize;

/// Minimum history length for a meaningful deviation check.
const MIN_HISTORY_POINTS: usize = 3;

/// |z| at or above this is an anomaly worth flagging.
const ANOMALY_Z_THRESHOLD: f64 = 2.5;

/// Scale factor from |z| to a 0-100 score.
const Z_SCORE_SCALE: f64 = 18.0;

/// Tolerated overfill before a transaction exceeds declared capacity.
const CAPACITY_TOLERANCE: f64 = 1.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Compliant,
    Observation,
    Violation,
}

impl ComplianceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceStatus::Compliant => "compliant",
            ComplianceStatus::Observation => "observation",
            ComplianceStatus::Violation => "violation",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub status: ComplianceStatus,
    /// 0-100, monotone in |z_score| when one is present.
    pub score: u8,
    pub message: String,
    pub z_score: Option<f64>,
}

impl AnalysisResult {
    fn fixed(status: ComplianceStatus, score: u8, message: &str) -> Self {
        Self {
            status,
            score,
            message: message.to_string(),
            z_score: None,
        }
    }
}

/// Coerce a JSON history array to finite numbers, silently dropping anything
/// that is not one. Station history is stored as a JSON blob, so strings,
/// nulls and NaN-producing junk are all possible.
pub fn numeric_history(values: &[serde_json::Value]) -> Vec<f64> {
    values
        .iter()
        .filter_map(|v| v.as_f64())
        .filter(|v| v.is_finite())
        .collect()
}

/// Analyze a station: price check first, then deviation of the most recent
/// history entry against the station's own history.
pub fn analyze_station(
    price: f64,
    official_price: f64,
    history: &[f64],
    stock: f64,
) -> AnalysisResult {
    if price - official_price > 0.01 {
        return AnalysisResult::fixed(
            ComplianceStatus::Violation,
            90,
            "Price above the official rate.",
        );
    }

    if history.len() < MIN_HISTORY_POINTS {
        return AnalysisResult::fixed(
            ComplianceStatus::Observation,
            55,
            "Insufficient history to evaluate consumption.",
        );
    }

    // "Current" is the last recorded data point; stock only matters if the
    // history were somehow empty, which the length guard above rules out.
    let current = history.last().copied().unwrap_or(stock);
    deviation_result(
        current,
        history,
        "Atypical consumption deviation from the station average.",
        "Consumption within the expected range.",
    )
}

/// Analyze a single vehicle transaction: capacity check first, then deviation
/// of the candidate liters amount against the vehicle's history (the
/// candidate itself is not part of the history).
pub fn analyze_vehicle_transaction(
    liters: f64,
    capacity_liters: f64,
    history: &[f64],
) -> AnalysisResult {
    if capacity_liters > 0.0 && liters > capacity_liters * CAPACITY_TOLERANCE {
        return AnalysisResult::fixed(
            ComplianceStatus::Violation,
            95,
            "Liters dispensed exceed the declared vehicle capacity.",
        );
    }

    if history.len() < MIN_HISTORY_POINTS {
        return AnalysisResult::fixed(
            ComplianceStatus::Observation,
            55,
            "Insufficient history to evaluate vehicle consumption.",
        );
    }

    deviation_result(
        liters,
        history,
        "Atypical consumption relative to the vehicle history.",
        "Consumption within the expected range for the vehicle.",
    )
}

/// Shared z-score classification. Population statistics (divide by N): the
/// history is the whole population of observations, not a sample.
fn deviation_result(
    current: f64,
    history: &[f64],
    anomaly_message: &str,
    normal_message: &str,
) -> AnalysisResult {
    let n = history.len() as f64;
    let mean = history.iter().sum::<f64>() / n;
    let variance = history.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    // Flat history is never anomalous by this metric.
    let z_score = if std_dev == 0.0 {
        0.0
    } else {
        (current - mean) / std_dev
    };

    let score = (z_score.abs() * Z_SCORE_SCALE).round().min(100.0) as u8;

    if z_score.abs() >= ANOMALY_Z_THRESHOLD {
        AnalysisResult {
            status: ComplianceStatus::Observation,
            score: score.max(70),
            message: anomaly_message.to_string(),
            z_score: Some(z_score),
        }
    } else {
        AnalysisResult {
            status: ComplianceStatus::Compliant,
            score: score.max(20),
            message: normal_message.to_string(),
            z_score: Some(z_score),
        }
    }
}
