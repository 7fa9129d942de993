//! Notification delivery.
//!
//! A `Notification` row is created before any delivery is attempted, so an
//! audit trail exists even when delivery fails entirely. A recipient with no
//! active device tokens is not an error: the row simply stays `queued` —
//! nothing to deliver yet.

use crate::{
    error::PipelineResult,
    push::{PushDispatcher, PushMessage, PushStatus},
    queue::{JobPayload, JobQueue, NotifyTarget},
    store::ComplianceStore,
    types::{now_millis, NotificationId, UnixMillis, UserId},
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationStatus {
    Queued,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Queued => "queued",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(NotificationStatus::Queued),
            "sent" => Some(NotificationStatus::Sent),
            "failed" => Some(NotificationStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotificationRow {
    pub id: NotificationId,
    pub user_id: UserId,
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
    pub status: NotificationStatus,
    pub sent_at: Option<UnixMillis>,
    pub error: Option<String>,
    pub created_at: UnixMillis,
}

/// What gets pushed: same title/body/data for every device of the target.
#[derive(Debug, Clone, Serialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
}

/// Producer-side helper: schedule a role-targeted notification. Enqueue
/// failure is logged and swallowed — the caller's primary operation (e.g.
/// recording a complaint) must never fail because the notification could not
/// be scheduled. Deliberately best-effort.
pub fn enqueue_notification_best_effort(queue: &JobQueue, target: NotifyTarget, payload: PushPayload) {
    let job = JobPayload::Notify {
        target,
        title: payload.title,
        body: payload.body,
        data: payload.data,
    };
    if let Err(err) = queue.enqueue(&job) {
        log::error!("notification enqueue failed (dropped): {err}");
    }
}

pub struct NotificationService {
    dispatcher: PushDispatcher,
}

impl NotificationService {
    pub fn new(dispatcher: PushDispatcher) -> Self {
        Self { dispatcher }
    }

    /// Notify the first user carrying `target`'s role. Unresolvable targets
    /// are logged and skipped — there is no recipient, so no row is created.
    pub fn notify_role(
        &self,
        store: &ComplianceStore,
        target: NotifyTarget,
        payload: &PushPayload,
    ) -> PipelineResult<Option<NotificationId>> {
        let Some(user_id) = store.first_user_with_role(target.role())? else {
            log::warn!("no user with role '{}' to notify", target.role());
            return Ok(None);
        };
        self.notify_user(store, user_id, payload).map(Some)
    }

    /// Notify one specific user on every active device they have registered.
    pub fn notify_user(
        &self,
        store: &ComplianceStore,
        user_id: UserId,
        payload: &PushPayload,
    ) -> PipelineResult<NotificationId> {
        let tokens = store.active_tokens_for_user(user_id)?;

        // Record intent first: the row exists even if delivery never happens.
        let notification_id =
            store.insert_notification(user_id, &payload.title, &payload.body, &payload.data, now_millis())?;

        if tokens.is_empty() {
            log::info!("user {user_id} has no active devices; notification {notification_id} stays queued");
            return Ok(notification_id);
        }

        let messages: Vec<PushMessage> = tokens
            .iter()
            .map(|t| PushMessage {
                to: t.token.clone(),
                title: payload.title.clone(),
                body: payload.body.clone(),
                data: Some(payload.data.clone()),
            })
            .collect();

        let outcomes = self.dispatcher.send(&messages);

        let delivered = outcomes.iter().filter(|o| o.status == PushStatus::Ok).count();
        if delivered > 0 {
            store.mark_notification_sent(notification_id, now_millis())?;
        } else {
            store.mark_notification_failed(notification_id, "Push delivery failed")?;
        }

        // Tokens the gateway reports as permanently unregistered are turned
        // off, not deleted; future sends skip them without another failure.
        let invalid: Vec<String> = outcomes
            .iter()
            .filter(|o| o.is_device_unregistered())
            .map(|o| o.token.clone())
            .collect();
        if !invalid.is_empty() {
            log::info!("deactivating {} unregistered device token(s)", invalid.len());
            store.deactivate_tokens(&invalid)?;
        }

        log::info!(
            "notification {notification_id}: {delivered}/{} device(s) accepted",
            outcomes.len()
        );
        Ok(notification_id)
    }
}
