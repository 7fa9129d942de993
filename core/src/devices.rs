//! Device-token registry.
//!
//! Registration is an upsert keyed by the token value: a token previously
//! deactivated by a failed delivery is implicitly reactivated when the same
//! value is registered again.

use crate::{
    error::{PipelineError, PipelineResult},
    push::is_valid_push_token,
    store::ComplianceStore,
    types::{now_millis, UnixMillis, UserId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Ios,
    Android,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ios" => Some(Platform::Ios),
            "android" => Some(Platform::Android),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceTokenRow {
    pub token: String,
    pub user_id: UserId,
    pub platform: Platform,
    pub active: bool,
    pub last_seen: UnixMillis,
}

/// Register (or re-register) a device token for `user_id`. Junk tokens are
/// rejected before any I/O.
pub fn register_device_token(
    store: &ComplianceStore,
    user_id: UserId,
    token: &str,
    platform: Platform,
) -> PipelineResult<()> {
    let token = token.trim();
    if !is_valid_push_token(token) {
        return Err(PipelineError::Validation(format!(
            "invalid push token '{token}'"
        )));
    }
    if !store.user_exists(user_id)? {
        return Err(PipelineError::not_found("user", user_id));
    }
    store.upsert_device_token(token, user_id, platform, now_millis())
}
