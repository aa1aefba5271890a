//! Link and session supervisors wired together
//!
//! The session must only run while the link is Connected, and must come back
//! (with fresh subscriptions) after the link recovers.


use stationlink::link::{LinkEvent, LinkState, LinkSupervisor};
use stationlink::session::{SessionError, SessionSupervisor};
use stationlink::testing::{MockLinkDriver, MockSessionTransport, RecordingConsumer, TransportCall};
use std::sync::Arc;
use std::time::Duration;
use test_helpers::{eventually, link_section, session_section, wait_for};

#[tokio::test]
async fn test_session_follows_link() {
    let driver = MockLinkDriver::new();
    driver.script_outcomes([LinkEvent::Associated]);
    let transport = MockSessionTransport::establishing();

    let link = LinkSupervisor::start(&link_section(3, 60), driver.clone())
        .await
        .unwrap();
    let session = SessionSupervisor::start(
        &session_section("a/b;c/d"),
        Arc::new(transport.clone()),
        link.subscribe(),
        RecordingConsumer::new(),
    )
    .unwrap();

    eventually("session connected", || session.is_connected()).await;
    assert_eq!(transport.subscriptions().len(), 2);
    session.publish("a/b", b"hello").unwrap();

    // Link drops: session is torn down and publishing fails fast
    assert!(
        driver
            .inject(LinkEvent::Disassociated { reason: None })
            .await
    );
    eventually("session torn down", || !transport.is_running()).await;
    assert!(matches!(
        session.publish("a/b", b"hello"),
        Err(SessionError::NotConnected { .. })
    ));

    // Link recovers: session restarts and resubscribes
    assert!(driver.inject(LinkEvent::Associated).await);
    eventually("session reconnected", || session.is_connected()).await;
    eventually("resubscribed", || transport.subscriptions().len() == 4).await;

    let starts = transport
        .calls()
        .into_iter()
        .filter(|call| *call == TransportCall::Start)
        .count();
    assert_eq!(starts, 2);

    session.shutdown().await;
    link.shutdown().await;
}

#[tokio::test]
async fn test_session_never_starts_without_link() {
    // No scripted outcome: the first association attempt never completes
    let driver = MockLinkDriver::new();
    let transport = MockSessionTransport::establishing();

    let link = LinkSupervisor::start(&link_section(3, 60), driver.clone())
        .await
        .unwrap();
    let session = SessionSupervisor::start(
        &session_section("a/b"),
        Arc::new(transport.clone()),
        link.subscribe(),
        RecordingConsumer::new(),
    )
    .unwrap();

    let mut states = link.subscribe();
    wait_for(&mut states, |s| *s == LinkState::Connecting).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(transport.calls().is_empty());
    assert!(!session.is_connected());

    session.shutdown().await;
    link.shutdown().await;
}

#[tokio::test]
async fn test_link_shutdown_ends_session() {
    let driver = MockLinkDriver::new();
    driver.script_outcomes([LinkEvent::Associated]);
    let transport = MockSessionTransport::establishing();

    let link = LinkSupervisor::start(&link_section(3, 60), driver)
        .await
        .unwrap();
    let session = SessionSupervisor::start(
        &session_section(""),
        Arc::new(transport.clone()),
        link.subscribe(),
        RecordingConsumer::new(),
    )
    .unwrap();
    eventually("session connected", || session.is_connected()).await;

    link.shutdown().await;

    eventually("transport stopped", || !transport.is_running()).await;
    assert!(!session.is_connected());
}
