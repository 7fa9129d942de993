//! Push gateway dispatcher.
//!
//! The gateway accepts up to [`PUSH_BATCH_SIZE`] messages per call and
//! answers with a per-message status array index-aligned to the request.
//! Failure isolation is per-chunk: if a whole call fails, every message in
//! that chunk gets an error outcome. Every input message yields exactly one
//! outcome, in input order — nothing is ever silently dropped.

use crate::config::PushConfig;
use serde::{Deserialize, Serialize};

/// Documented batch limit of the push gateway.
pub const PUSH_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct PushMessage {
    pub to: String,
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone)]
pub struct PushOutcome {
    pub token: String,
    pub status: PushStatus,
    pub message: Option<String>,
    /// Raw gateway details; carries the permanent-failure markers such as
    /// `{"error": "DeviceNotRegistered"}`.
    pub details: Option<serde_json::Value>,
}

impl PushOutcome {
    /// Whether the gateway reported this recipient as permanently gone.
    pub fn is_device_unregistered(&self) -> bool {
        self.status == PushStatus::Error
            && self
                .details
                .as_ref()
                .and_then(|d| d.get("error"))
                .and_then(|e| e.as_str())
                == Some("DeviceNotRegistered")
    }
}

/// Shape check for gateway push tokens (`ExponentPushToken[...]` or
/// `ExpoPushToken[...]`). Not a guarantee the token is live, just that it is
/// not arbitrary junk.
pub fn is_valid_push_token(token: &str) -> bool {
    let rest = token
        .strip_prefix("ExponentPushToken[")
        .or_else(|| token.strip_prefix("ExpoPushToken["));
    match rest {
        Some(inner) => inner.ends_with(']') && inner.len() > 1 && !inner[..inner.len() - 1].contains(']'),
        None => false,
    }
}

#[derive(Debug, Deserialize)]
struct GatewayResponse {
    #[serde(default)]
    data: Vec<GatewayTicket>,
}

#[derive(Debug, Deserialize)]
struct GatewayTicket {
    status: Option<String>,
    message: Option<String>,
    details: Option<serde_json::Value>,
}

pub struct PushDispatcher {
    api_url: String,
    access_token: Option<String>,
    agent: ureq::Agent,
}

impl PushDispatcher {
    pub fn from_config(config: &PushConfig) -> Self {
        Self {
            api_url: config.api_url.clone(),
            access_token: config.access_token.clone(),
            agent: ureq::Agent::config_builder()
                .http_status_as_error(false)
                .build()
                .into(),
        }
    }

    /// Send `messages`, chunked to the gateway batch limit. Infallible at the
    /// batch level: transport and HTTP errors become per-message outcomes.
    pub fn send(&self, messages: &[PushMessage]) -> Vec<PushOutcome> {
        let mut results = Vec::with_capacity(messages.len());

        for chunk in messages.chunks(PUSH_BATCH_SIZE) {
            match self.send_chunk(chunk) {
                Ok(tickets) => {
                    // Walk the gateway's status array in lockstep with the
                    // chunk; a short array means errors for the tail.
                    for (index, message) in chunk.iter().enumerate() {
                        let ticket = tickets.get(index);
                        match ticket {
                            Some(t) if t.status.as_deref() == Some("ok") => {
                                results.push(PushOutcome {
                                    token: message.to.clone(),
                                    status: PushStatus::Ok,
                                    message: None,
                                    details: None,
                                });
                            }
                            Some(t) => results.push(PushOutcome {
                                token: message.to.clone(),
                                status: PushStatus::Error,
                                message: Some(
                                    t.message.clone().unwrap_or_else(|| "Push delivery failed".into()),
                                ),
                                details: t.details.clone(),
                            }),
                            None => results.push(PushOutcome {
                                token: message.to.clone(),
                                status: PushStatus::Error,
                                message: Some("Push delivery failed".into()),
                                details: None,
                            }),
                        }
                    }
                }
                Err(error) => {
                    log::warn!("push gateway call failed: {error}");
                    for message in chunk {
                        results.push(PushOutcome {
                            token: message.to.clone(),
                            status: PushStatus::Error,
                            message: Some(error.clone()),
                            details: None,
                        });
                    }
                }
            }
        }

        results
    }

    /// One HTTP call for one chunk. `Err` carries the HTTP status/body text.
    fn send_chunk(&self, chunk: &[PushMessage]) -> Result<Vec<GatewayTicket>, String> {
        let mut request = self
            .agent
            .post(&self.api_url)
            .header("accept", "application/json")
            .header("content-type", "application/json");
        if let Some(token) = &self.access_token {
            request = request.header("authorization", &format!("Bearer {token}"));
        }

        let response = request.send_json(chunk).map_err(|err| err.to_string())?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .into_body()
                .read_to_string()
                .unwrap_or_default();
            let message = if body.is_empty() {
                format!("HTTP {status}")
            } else {
                body
            };
            return Err(message);
        }

        let payload: GatewayResponse = response
            .into_body()
            .read_json()
            .map_err(|err| err.to_string())?;
        Ok(payload.data)
    }
}
