//! Session capability boundary
//!
//! The broker transport performs the handshake and wire framing. The supervisor
//! starts and stops it, submits subscribe/publish requests, and consumes its
//! notifications as [`SessionEvent`]s in arrival order.

use super::state::SessionState;
use super::topics::TopicError;
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::v5::mqttbytes::QoS;
use thiserror::Error;
use tokio::sync::mpsc;

/// Notifications delivered to the session supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Broker accepted the session
    Established,
    /// Session dropped by the broker or the network
    Lost,
    SubscribeAcked { pkid: u16 },
    UnsubscribeAcked { pkid: u16 },
    PublishAcked { pkid: u16 },
    /// Inbound publish on a subscribed topic
    MessageArrived { topic: Bytes, payload: Bytes },
    /// Transport-level failure; the transport keeps reconnecting on its own
    TransportError(String),
}

/// Session layer errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Invalid topic list: {0}")]
    InvalidTopics(#[from] TopicError),
    #[error("Session transport initialization failed: {0}")]
    TransportInit(String),
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: SessionState },
    #[error("Session transport not started")]
    NotStarted,
    #[error("Publish rejected by transport")]
    PublishRejected(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription rejected by transport")]
    SubscribeRejected(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Broker-session transport
///
/// `subscribe` and `publish` only submit a request; success means the transport
/// accepted it for transmission, not that the broker acknowledged it.
#[async_trait]
pub trait SessionTransport: Send + Sync + 'static {
    /// Begin establishing a session; notifications go to `events`
    async fn start(&self, events: mpsc::Sender<SessionEvent>) -> Result<(), SessionError>;

    /// Tear the session down and stop producing events
    async fn stop(&self);

    fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), SessionError>;

    fn publish(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool)
        -> Result<(), SessionError>;
}
