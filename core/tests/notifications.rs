//! Notification service tests: audit rows, delivery, token lifecycle.

use fuelwatch_core::config::PushConfig;
use fuelwatch_core::devices::{register_device_token, Platform};
use fuelwatch_core::error::PipelineError;
use fuelwatch_core::notifications::{NotificationService, NotificationStatus, PushPayload};
use fuelwatch_core::push::PushDispatcher;
use fuelwatch_core::queue::NotifyTarget;
use fuelwatch_core::store::ComplianceStore;
use fuelwatch_core::types::now_millis;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tiny_http::{Header, Response, Server};

fn test_store() -> ComplianceStore {
    let store = ComplianceStore::in_memory().expect("in-memory store");
    store.migrate().expect("migrate");
    store
}

fn payload() -> PushPayload {
    PushPayload {
        title: "Audit due".into(),
        body: "Station 12 audit is due".into(),
        data: serde_json::json!({ "stationId": 12 }),
    }
}

/// Spawn a gateway that counts calls and answers `body` for each of them.
fn spawn_gateway(body: &'static str) -> (String, Arc<AtomicUsize>) {
    let server = Server::http("127.0.0.1:0").expect("http server");
    let base = format!("http://{}", server.server_addr());
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_in = Arc::clone(&calls);
    thread::spawn(move || {
        while let Ok(Some(request)) = server.recv_timeout(Duration::from_millis(2000)) {
            calls_in.fetch_add(1, Ordering::SeqCst);
            let response = Response::from_string(body).with_header(
                Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).expect("header"),
            );
            let _ = request.respond(response);
        }
    });
    (base, calls)
}

fn service(base: &str) -> NotificationService {
    NotificationService::new(PushDispatcher::from_config(&PushConfig {
        api_url: format!("{base}/push"),
        access_token: None,
    }))
}

/// A recipient with no registered devices gets an audit row in `queued` and
/// the gateway is never contacted.
#[test]
fn no_devices_leaves_row_queued_without_gateway_call() {
    let store = test_store();
    let user = store.insert_user("Ana", "ana@example.com", "supervisor", now_millis()).unwrap();
    let (base, calls) = spawn_gateway(r#"{"data":[]}"#);

    let id = service(&base).notify_user(&store, user, &payload()).unwrap();

    let row = store.get_notification(id).unwrap().expect("row exists");
    assert_eq!(row.status, NotificationStatus::Queued);
    assert_eq!(row.sent_at, None);
    assert_eq!(row.user_id, user);
    assert_eq!(calls.load(Ordering::SeqCst), 0, "no delivery attempt expected");
}

/// Happy path: one active device, gateway accepts, row flips to `sent`.
#[test]
fn accepted_delivery_marks_row_sent() {
    let store = test_store();
    let user = store.insert_user("Ana", "ana@example.com", "supervisor", now_millis()).unwrap();
    register_device_token(&store, user, "ExponentPushToken[dev1]", Platform::Ios).unwrap();
    let (base, calls) = spawn_gateway(r#"{"data":[{"status":"ok"}]}"#);

    let id = service(&base).notify_user(&store, user, &payload()).unwrap();

    let row = store.get_notification(id).unwrap().expect("row exists");
    assert_eq!(row.status, NotificationStatus::Sent);
    assert!(row.sent_at.is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// When every device fails, the row is `failed` and a DeviceNotRegistered
/// token is deactivated for future sends.
#[test]
fn unregistered_device_is_deactivated_and_row_failed() {
    let store = test_store();
    let user = store.insert_user("Ana", "ana@example.com", "supervisor", now_millis()).unwrap();
    register_device_token(&store, user, "ExponentPushToken[gone]", Platform::Android).unwrap();
    let (base, _) = spawn_gateway(
        r#"{"data":[{"status":"error","message":"gone","details":{"error":"DeviceNotRegistered"}}]}"#,
    );

    let id = service(&base).notify_user(&store, user, &payload()).unwrap();

    let row = store.get_notification(id).unwrap().expect("row exists");
    assert_eq!(row.status, NotificationStatus::Failed);
    assert!(row.error.is_some());

    assert!(
        store.active_tokens_for_user(user).unwrap().is_empty(),
        "token should be deactivated"
    );
    let token = store.get_device_token("ExponentPushToken[gone]").unwrap().expect("row kept");
    assert!(!token.active, "deactivated, not deleted");
}

/// Re-registering a deactivated token reactivates it.
#[test]
fn reregistration_reactivates_token() {
    let store = test_store();
    let user = store.insert_user("Ana", "ana@example.com", "supervisor", now_millis()).unwrap();
    register_device_token(&store, user, "ExponentPushToken[dev1]", Platform::Ios).unwrap();
    store.deactivate_tokens(&["ExponentPushToken[dev1]".to_string()]).unwrap();
    assert!(store.active_tokens_for_user(user).unwrap().is_empty());

    register_device_token(&store, user, "ExponentPushToken[dev1]", Platform::Ios).unwrap();

    let tokens = store.active_tokens_for_user(user).unwrap();
    assert_eq!(tokens.len(), 1);
    assert!(tokens[0].active);
}

/// Junk tokens are rejected before any row is written.
#[test]
fn junk_token_is_rejected() {
    let store = test_store();
    let user = store.insert_user("Ana", "ana@example.com", "supervisor", now_millis()).unwrap();

    let err = register_device_token(&store, user, "not-a-token", Platform::Ios).unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));
    assert!(store.get_device_token("not-a-token").unwrap().is_none());
}

/// Registering for a user that does not exist is NotFound.
#[test]
fn unknown_user_is_not_found() {
    let store = test_store();
    let err =
        register_device_token(&store, 999, "ExponentPushToken[dev1]", Platform::Ios).unwrap_err();
    assert!(matches!(err, PipelineError::NotFound { .. }));
}

/// Role targeting picks the first user carrying the role; with nobody to
/// notify, no row is created and the call still succeeds.
#[test]
fn role_targeting_resolves_first_user_or_skips() {
    let store = test_store();
    let (base, _) = spawn_gateway(r#"{"data":[]}"#);
    let svc = service(&base);

    // Nobody carries the role yet.
    let none = svc.notify_role(&store, NotifyTarget::Supervisor, &payload()).unwrap();
    assert!(none.is_none());
    assert_eq!(store.notification_count().unwrap(), 0);

    let first = store.insert_user("First", "first@example.com", "supervisor", now_millis()).unwrap();
    store.insert_user("Second", "second@example.com", "supervisor", now_millis()).unwrap();

    let id = svc
        .notify_role(&store, NotifyTarget::Supervisor, &payload())
        .unwrap()
        .expect("resolved");
    let row = store.get_notification(id).unwrap().expect("row exists");
    assert_eq!(row.user_id, first);
}
