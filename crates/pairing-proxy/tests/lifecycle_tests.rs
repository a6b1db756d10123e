//! Integration tests for the pairing session lifecycle.

mod common;

use base64::Engine;
use common::{CodeBehavior, Harness, NUMBER};
use pairing_proxy::registry::{PairingState, SessionStatus};
use pairing_proxy::PairingError;
use serde_json::json;
use std::time::Duration;

async fn settle() {
    tokio::time::sleep(Duration::from_millis(60)).await;
}

#[tokio::test]
async fn test_start_returns_grouped_code() {
    let h = Harness::new();

    let code = h.manager.start(NUMBER).await.unwrap().unwrap();
    assert_eq!(code, "ABCD-0001");

    let session = h.registry().get(NUMBER).await.unwrap();
    assert_eq!(session.status, SessionStatus::Pending);
    assert_eq!(session.state, PairingState::CodeIssued);
    assert_eq!(session.pairing_code.as_deref(), Some("ABCD-0001"));
    assert_eq!(session.retry_count, 0);
    assert!(h.store.dir(NUMBER).is_dir());
}

#[tokio::test]
async fn test_start_accepts_formatted_number() {
    let h = Harness::new();

    h.manager.start("+1 (555) 123-4567").await.unwrap();

    assert!(h.registry().contains(NUMBER).await);
}

#[tokio::test]
async fn test_invalid_number_is_rejected_before_any_work() {
    let h = Harness::new();

    let result = h.manager.start("12345").await;

    assert!(matches!(result, Err(PairingError::InvalidPhoneNumber(_))));
    assert_eq!(h.registry().count().await, 0);
    assert_eq!(h.transport.opened(), 0);
}

#[tokio::test]
async fn test_second_start_conflicts() {
    let h = Harness::new();
    h.manager.start(NUMBER).await.unwrap();

    let result = h.manager.start(NUMBER).await;

    assert_eq!(result, Err(PairingError::SessionActive(NUMBER.into())));
    assert_eq!(h.transport.opened(), 1);
}

#[tokio::test]
async fn test_concurrent_starts_admit_exactly_one() {
    let h = Harness::new();

    let (a, b) = tokio::join!(h.manager.start(NUMBER), h.manager.start(NUMBER));

    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    let conflicts = [&a, &b]
        .iter()
        .filter(|r| matches!(r, Err(PairingError::SessionActive(_))))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(conflicts, 1);
    assert_eq!(h.transport.opened(), 1);
}

#[tokio::test]
async fn test_distinct_numbers_are_independent() {
    let h = Harness::new();

    h.manager.start(NUMBER).await.unwrap();
    h.manager.start("447911123456").await.unwrap();

    h.transport.session(0).emit_close(403).await;
    h.wait_for_removal(NUMBER).await;

    let other = h.registry().get("447911123456").await.unwrap();
    assert_eq!(other.status, SessionStatus::Pending);
}

#[tokio::test]
async fn test_forbidden_close_removes_session_and_storage() {
    let h = Harness::new();
    h.manager.start(NUMBER).await.unwrap();
    let session = h.transport.session(0);

    session.emit_close(403).await;
    h.wait_for_removal(NUMBER).await;

    assert!(!h.store.dir(NUMBER).exists());
    assert!(session.is_closed());
    assert_eq!(h.registry().live_count().await, 0);

    settle().await;
    assert_eq!(h.transport.opened(), 1);
}

#[tokio::test]
async fn test_logged_out_close_removes_session() {
    let h = Harness::new();
    h.manager.start(NUMBER).await.unwrap();

    h.transport.session(0).emit_close(401).await;
    h.wait_for_removal(NUMBER).await;

    assert!(!h.store.dir(NUMBER).exists());
    settle().await;
    assert_eq!(h.transport.opened(), 1);
}

#[tokio::test]
async fn test_number_can_be_paired_again_after_removal() {
    let h = Harness::new();
    h.manager.start(NUMBER).await.unwrap();
    h.transport.session(0).emit_close(403).await;
    h.wait_for_removal(NUMBER).await;

    let code = h.manager.start(NUMBER).await.unwrap();

    assert!(code.is_some());
    let session = h.registry().get(NUMBER).await.unwrap();
    assert_eq!(session.retry_count, 0);
    assert_eq!(session.status, SessionStatus::Pending);
}

#[tokio::test]
async fn test_third_unknown_close_terminates() {
    let h = Harness::new();
    h.manager.start(NUMBER).await.unwrap();

    for index in 0..3 {
        let session = h.transport.wait_for_session(index).await;
        session.emit_close(999).await;
    }

    h.wait_for_status(NUMBER, SessionStatus::Failed).await;
    let session = h.registry().get(NUMBER).await.unwrap();
    assert_eq!(session.retry_count, 3);
    assert_eq!(session.state, PairingState::Terminal);

    h.wait_for_removal(NUMBER).await;
    assert!(!h.store.dir(NUMBER).exists());

    settle().await;
    assert_eq!(h.transport.opened(), 3);
}

#[tokio::test]
async fn test_retry_count_tracks_reconnects() {
    let h = Harness::new();
    h.manager.start(NUMBER).await.unwrap();

    h.transport.session(0).emit_close(408).await;
    h.transport.wait_for_session(1).await;
    settle().await;

    let session = h.registry().get(NUMBER).await.unwrap();
    assert_eq!(session.retry_count, 1);
    assert_eq!(session.status, SessionStatus::Pending);
    assert!(h.transport.session(0).is_closed());
}

#[tokio::test]
async fn test_code_is_reused_across_retries() {
    let h = Harness::new();
    let code = h.manager.start(NUMBER).await.unwrap().unwrap();

    h.transport.session(0).emit_close(503).await;
    let reconnected = h.transport.wait_for_session(1).await;
    settle().await;

    assert_eq!(reconnected.code_requests(), vec![Some("abcd0001".to_string())]);
    let session = h.registry().get(NUMBER).await.unwrap();
    assert_eq!(session.pairing_code, Some(code));
}

#[tokio::test]
async fn test_rejected_code_is_regenerated() {
    let h = Harness::new();
    h.manager.start(NUMBER).await.unwrap();
    h.transport.set_code_behavior(CodeBehavior::RejectPreferred);

    h.transport.session(0).emit_close(408).await;
    let reconnected = h.transport.wait_for_session(1).await;
    settle().await;

    assert_eq!(
        reconnected.code_requests(),
        vec![Some("abcd0001".to_string()), None]
    );
    let session = h.registry().get(NUMBER).await.unwrap();
    assert_eq!(session.pairing_code.as_deref(), Some("ABCD-0002"));
}

#[tokio::test]
async fn test_pairing_code_failure_is_reported_once() {
    let h = Harness::new();
    h.transport.set_code_behavior(CodeBehavior::Fail);

    let result = h.manager.start(NUMBER).await;

    assert!(matches!(result, Err(PairingError::PairingCode(_))));
    assert!(!h.registry().contains(NUMBER).await);
    assert!(!h.store.dir(NUMBER).exists());
    assert!(h.transport.session(0).is_closed());

    settle().await;
    assert_eq!(h.transport.opened(), 1);
}

#[tokio::test]
async fn test_pairing_code_failure_on_reconnect_ends_attempt() {
    let h = Harness::new();
    h.manager.start(NUMBER).await.unwrap();
    h.transport.set_code_behavior(CodeBehavior::Fail);

    h.transport.session(0).emit_close(408).await;
    h.wait_for_removal(NUMBER).await;

    let reconnected = h.transport.session(1);
    assert_eq!(reconnected.code_requests().len(), 1);
    assert!(reconnected.is_closed());

    settle().await;
    assert!(!h.store.dir(NUMBER).exists());
    assert_eq!(h.transport.opened(), 2);
    assert!(!h.registry().contains(NUMBER).await);
}

#[tokio::test]
async fn test_open_failure_is_reported_to_caller() {
    let h = Harness::new();
    h.transport.set_fail_open(true);

    let result = h.manager.start(NUMBER).await;

    assert!(matches!(result, Err(PairingError::Transport(_))));
    assert!(!h.registry().contains(NUMBER).await);
}

#[tokio::test]
async fn test_corrupt_storage_is_recovered() {
    let h = Harness::new();
    std::fs::create_dir_all(h.store.dir(NUMBER)).unwrap();
    std::fs::write(h.store.credential_path(NUMBER), b"{\"registered\": tr").unwrap();

    let code = h.manager.start(NUMBER).await.unwrap();

    assert!(code.is_some());
    assert!(!h.transport.session(0).registered_on_open);
}

#[tokio::test]
async fn test_completion_delivers_prefixed_blob_once() {
    let h = Harness::new();
    h.manager.start(NUMBER).await.unwrap();
    let session = h.transport.session(0);

    let creds = json!({ "registered": true, "me": { "id": "15551234567:7@s.whatsapp.net" } });
    session.emit_creds(creds.clone()).await;
    session.emit_open(Some("15551234567:7@s.whatsapp.net")).await;
    session.emit_open(Some("15551234567:7@s.whatsapp.net")).await;

    h.wait_for_status(NUMBER, SessionStatus::Completed).await;
    let completed = h.registry().get(NUMBER).await.unwrap();
    let blob = completed.credential_blob.unwrap();
    assert!(blob.starts_with("PAIRED~"));

    let raw = base64::engine::general_purpose::STANDARD
        .decode(blob.trim_start_matches("PAIRED~"))
        .unwrap();
    let decoded: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(decoded, creds);

    settle().await;
    let sent = session.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0], ("15551234567@s.whatsapp.net".to_string(), blob));
    assert_eq!(sent[1].1, "Linked.");
    assert!(session.is_closed());
    assert_eq!(h.registry().live_count().await, 0);
}

#[tokio::test]
async fn test_completed_session_is_cleaned_up() {
    let h = Harness::new();
    h.manager.start(NUMBER).await.unwrap();
    let session = h.transport.session(0);

    session.emit_creds(json!({ "registered": true })).await;
    session.emit_open(None).await;
    h.wait_for_status(NUMBER, SessionStatus::Completed).await;

    h.wait_for_removal(NUMBER).await;
    assert!(!h.store.dir(NUMBER).exists());
    assert_eq!(session.sent()[0].0, "owner@s.whatsapp.net");
}

#[tokio::test]
async fn test_completed_is_absorbing() {
    let mut config = common::test_config();
    config.close_grace = Duration::from_millis(200);
    config.completed_cleanup_delay = Duration::from_secs(2);
    let h = Harness::with_config(config);
    h.manager.start(NUMBER).await.unwrap();
    let session = h.transport.session(0);

    session.emit_creds(json!({ "registered": true })).await;
    session.emit_open(None).await;
    h.wait_for_status(NUMBER, SessionStatus::Completed).await;
    let completed = h.registry().get(NUMBER).await.unwrap();

    // Still inside the close grace: the transport is open and the driver alive.
    assert!(!session.is_closed());
    session.emit_close(401).await;

    let failed = h
        .registry()
        .update(NUMBER, completed.attempt, |s| {
            s.fail();
        })
        .await
        .unwrap();
    assert_eq!(failed.status, SessionStatus::Completed);

    tokio::time::sleep(Duration::from_millis(300)).await;

    let after = h.registry().get(NUMBER).await.unwrap();
    assert_eq!(after.status, SessionStatus::Completed);
    assert_eq!(after.state, PairingState::Completed);
    assert_eq!(after.credential_blob, completed.credential_blob);
    assert!(session.is_closed());
    assert_eq!(h.transport.opened(), 1);
    assert!(!h.registry().is_live(NUMBER).await);
}

#[tokio::test]
async fn test_restart_after_confirmation_harvests() {
    let h = Harness::new();
    h.manager.start(NUMBER).await.unwrap();

    let first = h.transport.session(0);
    first.emit_creds(json!({ "registered": true })).await;
    first.emit_close(515).await;

    let second = h.transport.wait_for_session(1).await;
    assert!(second.registered_on_open);
    assert!(second.code_requests().is_empty());

    second.emit_open(None).await;
    h.wait_for_status(NUMBER, SessionStatus::Completed).await;

    let session = h.registry().get(NUMBER).await.unwrap();
    assert_eq!(session.retry_count, 1);
    assert!(session.credential_blob.is_some());
}

#[tokio::test]
async fn test_open_without_credentials_fails_attempt() {
    let h = Harness::new();
    h.manager.start(NUMBER).await.unwrap();

    h.transport.session(0).emit_open(None).await;

    h.wait_for_removal(NUMBER).await;
    assert!(h.transport.session(0).sent().is_empty());
}

#[tokio::test]
async fn test_already_registered_start_skips_code() {
    let h = Harness::new();
    h.store
        .save(NUMBER, &json!({ "registered": true }))
        .await
        .unwrap();

    let code = h.manager.start(NUMBER).await.unwrap();

    assert_eq!(code, None);
    let session = h.transport.session(0);
    assert!(session.code_requests().is_empty());

    session.emit_open(None).await;
    h.wait_for_status(NUMBER, SessionStatus::Completed).await;
}

#[tokio::test]
async fn test_keepalive_runs_until_confirmed() {
    let h = Harness::new();
    h.manager.start(NUMBER).await.unwrap();
    let session = h.transport.session(0);

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(session.pings() > 0);

    session.emit_creds(json!({ "registered": true })).await;
    settle().await;
    let pings = session.pings();

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(session.pings(), pings);
}

#[tokio::test]
async fn test_keepalive_stops_after_teardown() {
    let h = Harness::new();
    h.manager.start(NUMBER).await.unwrap();
    let session = h.transport.session(0);

    session.emit_close(403).await;
    h.wait_for_removal(NUMBER).await;
    let pings = session.pings();

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(session.pings(), pings);
}

#[tokio::test]
async fn test_unconfirmed_update_keeps_session_pending() {
    let h = Harness::new();
    h.manager.start(NUMBER).await.unwrap();

    h.transport
        .session(0)
        .emit_creds(json!({ "registered": false }))
        .await;
    settle().await;

    let session = h.registry().get(NUMBER).await.unwrap();
    assert_eq!(session.status, SessionStatus::Pending);
    assert_eq!(session.state, PairingState::AwaitingConfirmation);
    assert!(h.store.credential_path(NUMBER).exists());
}

#[tokio::test]
async fn test_abandoned_attempt_hits_safety_net() {
    let mut config = common::test_config();
    config.pending_cleanup_delay = Duration::from_millis(200);
    let h = Harness::with_config(config);

    h.manager.start(NUMBER).await.unwrap();
    assert!(h.manager.cleanup().is_scheduled(NUMBER).await);

    h.wait_for_removal(NUMBER).await;

    assert!(!h.store.dir(NUMBER).exists());
    assert!(h.transport.session(0).is_closed());
    assert_eq!(h.registry().live_count().await, 0);
}

#[tokio::test]
async fn test_session_leaves_pending_within_bound() {
    let mut config = common::test_config();
    config.pending_cleanup_delay = Duration::from_millis(300);
    let h = Harness::with_config(config);

    h.manager.start(NUMBER).await.unwrap();

    // Keep reconnecting without ever confirming; the safety net still applies.
    h.transport.session(0).emit_close(515).await;
    h.transport.wait_for_session(1).await;

    h.wait_for_removal(NUMBER).await;
    assert!(!h.store.dir(NUMBER).exists());
}
