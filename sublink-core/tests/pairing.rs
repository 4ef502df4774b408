//! Pairing workflow tests

mod common;

use std::time::Duration;

use common::{Harness, OWNER, identity, next_event, next_removal};
use sublink_core::{ClientEvent, LifecycleEvent, RemovalReason, SessionError};

const ID: &str = "6281234567890";

#[tokio::test(start_paused = true)]
async fn second_create_while_pending_is_rejected() {
    let h = Harness::new();
    h.pair(ID).await;

    let result = h
        .manager
        .create_pairing_session(ID, OWNER, h.main.clone())
        .await;

    assert!(matches!(result, Err(SessionError::DuplicatePending(_))));
    assert!(h.manager.is_pending(ID).await);
}

#[tokio::test(start_paused = true)]
async fn concurrent_creates_admit_one() {
    let h = Harness::new();

    let (a, b) = tokio::join!(
        h.manager.create_pairing_session(ID, OWNER, h.main.clone()),
        h.manager.create_pairing_session(ID, OWNER, h.main.clone()),
    );

    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    let rejected = if a.is_err() { a } else { b };
    assert!(matches!(rejected, Err(SessionError::DuplicatePending(_))));
}

#[tokio::test(start_paused = true)]
async fn successful_pairing_activates_and_persists() {
    let h = Harness::new();
    let client = h.pair(ID).await;
    let mut rx = h.manager.subscribe();

    h.devices.pair(ID, identity(ID));
    client.emit(ClientEvent::PairSucceeded {
        identity: identity(ID),
    });
    next_event(&mut rx, |e| matches!(e, LifecycleEvent::Paired { .. })).await;

    assert!(h.manager.is_active(ID).await);
    let metadata = h.manager.layout().read_metadata(ID).await.unwrap().unwrap();
    assert_eq!(metadata.phone_number, ID);

    let sessions = h.manager.list_active_sessions().await;
    assert_eq!(sessions.len(), 1);
    assert!(sessions[0].connected);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(client.sent_texts().iter().any(|(to, _)| to == OWNER));
}

#[tokio::test(start_paused = true)]
async fn timeout_removes_session_and_notifies_owner() {
    let h = Harness::new();
    h.pair(ID).await;
    let mut rx = h.manager.subscribe();

    let (reason, seen) = next_removal(&mut rx, ID).await;

    assert_eq!(reason, RemovalReason::PairingTimeout);
    assert!(seen.contains(&LifecycleEvent::PairingTimedOut { id: ID.to_string() }));
    assert!(!h.manager.session_exists(ID).await);
    assert!(!h.dir(ID).exists());

    tokio::time::sleep(Duration::from_millis(10)).await;
    let sent = h.main.sent_texts();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, OWNER);
}

#[tokio::test(start_paused = true)]
async fn timeout_notification_needs_main_link() {
    let h = Harness::new();
    h.main.set_connected(false);
    h.pair(ID).await;
    let mut rx = h.manager.subscribe();

    next_removal(&mut rx, ID).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(h.main.sent_texts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn timeout_respects_configured_window() {
    let h = Harness::with_config(|c| c.pairing.timeout_secs = 30);
    h.pair(ID).await;
    let mut rx = h.manager.subscribe();
    let started = tokio::time::Instant::now();

    next_removal(&mut rx, ID).await;

    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(29));
    assert!(waited < Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn removing_pending_session_frees_the_id() {
    let h = Harness::new();
    h.pair(ID).await;

    h.manager.remove_session(ID).await.unwrap();

    assert!(!h.dir(ID).exists());
    assert!(!h.manager.session_exists(ID).await);
    h.pair(ID).await;
    assert!(h.manager.is_pending(ID).await);
}

#[tokio::test(start_paused = true)]
async fn logout_during_pairing_removes_session() {
    let h = Harness::new();
    let client = h.pair(ID).await;
    let mut rx = h.manager.subscribe();

    client.emit(ClientEvent::LoggedOut);

    let (reason, _) = next_removal(&mut rx, ID).await;
    assert_eq!(reason, RemovalReason::LoggedOut);
    assert!(!h.dir(ID).exists());
}
