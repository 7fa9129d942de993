//! Client for the external risk-scoring model.
//!
//! Best-effort enrichment only: one HTTP call with a hard timeout, no
//! retries, and every failure mode (timeout, transport error, non-2xx,
//! garbage body) resolves to a fallback assessment instead of an error.
//! The caller must never be blocked from recording a transaction because
//! the model is slow or down.

use crate::config::ModelConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLabel {
    Low,
    Medium,
    High,
    Unknown,
}

impl RiskLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLabel::Low => "low",
            RiskLabel::Medium => "medium",
            RiskLabel::High => "high",
            RiskLabel::Unknown => "unknown",
        }
    }

    /// Exact-match parse; `None` for anything unrecognized.
    pub fn parse_strict(value: &str) -> Option<Self> {
        match value {
            "low" => Some(RiskLabel::Low),
            "medium" => Some(RiskLabel::Medium),
            "high" => Some(RiskLabel::High),
            "unknown" => Some(RiskLabel::Unknown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskAssessment {
    /// Clamped into [0,1] when the model returned a finite number.
    pub score: Option<f64>,
    pub label: RiskLabel,
    pub model_version: Option<String>,
}

/// Feature vector sent to the model, one per transaction.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionFeatures {
    pub liters: f64,
    pub unit_price: f64,
    pub total_amount: f64,
    pub capacity_liters: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ModelResponse {
    risk_score: Option<f64>,
    risk_label: Option<String>,
    model_version: Option<String>,
}

pub struct RiskModelClient {
    endpoint: Option<String>,
    fallback_label: RiskLabel,
    agent: ureq::Agent,
}

impl RiskModelClient {
    pub fn from_config(config: &ModelConfig) -> Self {
        let endpoint = if config.enabled {
            config.api_url.as_ref().map(|base| format!("{}/predict", base.trim_end_matches('/')))
        } else {
            None
        };
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_millis(config.timeout_ms)))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            endpoint,
            fallback_label: config.fallback_label,
            agent,
        }
    }

    /// Whether the external model integration is configured at all.
    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Score one transaction. `None` when the integration is disabled (the
    /// caller persists no risk fields); otherwise always `Some` — failures
    /// of any kind collapse to the configured fallback label.
    pub fn evaluate(&self, features: &TransactionFeatures) -> Option<RiskAssessment> {
        let endpoint = self.endpoint.as_ref()?;

        let response = self
            .agent
            .post(endpoint)
            .header("content-type", "application/json")
            .send_json(features);

        let response = match response {
            Ok(r) => r,
            Err(err) => {
                log::warn!("risk model unreachable: {err}");
                return Some(self.fallback());
            }
        };

        if !response.status().is_success() {
            log::warn!("risk model returned HTTP {}", response.status());
            return Some(self.fallback());
        }

        let payload: ModelResponse = match response.into_body().read_json() {
            Ok(p) => p,
            Err(err) => {
                log::warn!("risk model returned invalid body: {err}");
                return Some(self.fallback());
            }
        };

        let score = payload
            .risk_score
            .filter(|s| s.is_finite())
            .map(|s| s.clamp(0.0, 1.0));
        let label = payload
            .risk_label
            .as_deref()
            .and_then(RiskLabel::parse_strict)
            .unwrap_or(self.fallback_label);

        Some(RiskAssessment {
            score,
            label,
            model_version: payload.model_version,
        })
    }

    fn fallback(&self) -> RiskAssessment {
        RiskAssessment {
            score: None,
            label: self.fallback_label,
            model_version: None,
        }
    }
}
