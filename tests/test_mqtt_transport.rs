//! rumqttc transport against local sockets
//!
//! No broker is needed: a refused port and a silent listener cover the error
//! and connect-timeout paths of the event pump.


use rumqttc::v5::mqttbytes::QoS;
use stationlink::session::{MqttSessionTransport, SessionError, SessionEvent, SessionTransport};
use std::time::Duration;
use test_helpers::session_section;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

async fn next_transport_error(rx: &mut mpsc::Receiver<SessionEvent>) -> String {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no event from transport")
            .expect("event channel closed");
        if let SessionEvent::TransportError(reason) = event {
            return reason;
        }
    }
}

#[tokio::test]
async fn test_refused_connection_reports_transport_errors() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut section = session_section("a/b");
    section.broker_url = format!("mqtt://127.0.0.1:{port}");
    let transport = MqttSessionTransport::new(&section).unwrap();
    let (tx, mut rx) = mpsc::channel(16);

    transport.start(tx).await.unwrap();

    // The pump keeps retrying, so errors keep coming
    next_transport_error(&mut rx).await;
    next_transport_error(&mut rx).await;

    transport.stop().await;
}

#[tokio::test]
async fn test_silent_broker_hits_connect_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let _accept = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let mut section = session_section("");
    section.broker_url = format!("mqtt://127.0.0.1:{port}");
    section.connect_timeout_ms = 200;
    let transport = MqttSessionTransport::new(&section).unwrap();
    let (tx, mut rx) = mpsc::channel(16);

    transport.start(tx).await.unwrap();

    let reason = next_transport_error(&mut rx).await;
    assert!(reason.contains("200ms"), "unexpected error: {reason}");

    transport.stop().await;
}

#[tokio::test]
async fn test_requests_accepted_once_started() {
    let mut section = session_section("");
    section.broker_url = "mqtt://127.0.0.1:1".to_string();
    let transport = MqttSessionTransport::new(&section).unwrap();

    assert!(matches!(
        transport.publish("a/b", b"x", QoS::AtLeastOnce, false),
        Err(SessionError::NotStarted)
    ));

    let (tx, _rx) = mpsc::channel(16);
    transport.start(tx).await.unwrap();

    // Queued for the event loop; acceptance does not depend on a live broker
    transport.subscribe("a/b", QoS::AtMostOnce).unwrap();
    transport.publish("a/b", b"x", QoS::AtLeastOnce, false).unwrap();

    transport.stop().await;
    assert!(matches!(
        transport.subscribe("a/b", QoS::AtMostOnce),
        Err(SessionError::NotStarted)
    ));
}
