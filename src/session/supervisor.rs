//! Session supervisor event loop
//!
//! Watches the link state and only runs a broker session while the link is
//! Connected. Transport notifications are consumed from one channel in arrival
//! order; the session state is published through [`SessionStatus`] for
//! lock-free reads.

use super::state::{SessionState, SessionStatus};
use super::topics::TopicSet;
use super::transport::{SessionError, SessionEvent, SessionTransport};
use crate::config::SessionSection;
use crate::link::LinkState;
use crate::session_span;
use rumqttc::v5::mqttbytes::QoS;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// Depth of the inbound transport event queue
pub const SESSION_EVENT_QUEUE_DEPTH: usize = 64;

/// Quality of service for topic subscriptions
pub const SUBSCRIBE_QOS: QoS = QoS::AtMostOnce;

/// Quality of service for outbound publishes
pub const PUBLISH_QOS: QoS = QoS::AtLeastOnce;

/// Borrowed view of an inbound message, valid only for the consumer call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundMessage<'a> {
    pub topic: &'a [u8],
    pub payload: &'a [u8],
}

impl<'a> InboundMessage<'a> {
    pub fn topic_len(&self) -> usize {
        self.topic.len()
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Topic decoded as UTF-8, with invalid sequences replaced
    pub fn topic_str(&self) -> std::borrow::Cow<'a, str> {
        String::from_utf8_lossy(self.topic)
    }
}

/// Receiver of inbound messages
///
/// Called synchronously on the supervisor task; implementations must not block
/// and must copy anything they keep.
pub trait MessageConsumer: Send + Sync + 'static {
    fn on_message(&self, message: &InboundMessage<'_>);
}

impl<F> MessageConsumer for F
where
    F: Fn(&InboundMessage<'_>) + Send + Sync + 'static,
{
    fn on_message(&self, message: &InboundMessage<'_>) {
        self(message)
    }
}

pub struct SessionSupervisor<T: SessionTransport> {
    transport: Arc<T>,
    topics: TopicSet,
    consumer: Arc<dyn MessageConsumer>,
    status: Arc<SessionStatus>,
    link_rx: watch::Receiver<LinkState>,
    /// Events of the current transport episode; replaced on every start, dropped on stop
    events_rx: Option<mpsc::Receiver<SessionEvent>>,
}

impl<T: SessionTransport> SessionSupervisor<T> {
    /// Parse the topic list, register the consumer and spawn the supervisor loop
    ///
    /// Returns without waiting for a session. The transport is started once
    /// `link_rx` reports [`LinkState::Connected`].
    pub fn start(
        section: &SessionSection,
        transport: Arc<T>,
        link_rx: watch::Receiver<LinkState>,
        consumer: impl MessageConsumer,
    ) -> Result<SessionHandle, SessionError> {
        let topics = TopicSet::parse(&section.topics)?;
        info!(
            broker = %section.broker_url,
            topics = topics.len(),
            "Starting broker session supervisor"
        );

        let supervisor = Self::new(transport.clone(), topics, link_rx, Arc::new(consumer));
        let status = supervisor.status.clone();
        status.swap(SessionState::Disconnected);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(
            supervisor
                .run(shutdown_rx)
                .instrument(session_span!(broker = %section.broker_url)),
        );

        Ok(SessionHandle {
            status,
            transport,
            shutdown_tx,
            task: Some(task),
        })
    }

    fn new(
        transport: Arc<T>,
        topics: TopicSet,
        link_rx: watch::Receiver<LinkState>,
        consumer: Arc<dyn MessageConsumer>,
    ) -> Self {
        Self {
            transport,
            topics,
            consumer,
            status: Arc::new(SessionStatus::new()),
            link_rx,
            events_rx: None,
        }
    }

    fn is_active(&self) -> bool {
        self.events_rx.is_some()
    }

    async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        let initial = *self.link_rx.borrow_and_update();
        self.on_link_state(initial).await;

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping session supervisor");
                        break;
                    }
                }
                changed = self.link_rx.changed() => {
                    if changed.is_err() {
                        warn!("Link supervisor stopped, ending broker session");
                        break;
                    }
                    let link = *self.link_rx.borrow_and_update();
                    self.on_link_state(link).await;
                }
                Some(event) = next_event(&mut self.events_rx) => self.handle_event(event),
            }
        }

        if self.is_active() {
            self.transport.stop().await;
        }
        self.set_state(SessionState::Disconnected);
    }

    /// Start the transport when the link comes up, stop it when the link goes away
    async fn on_link_state(&mut self, link: LinkState) {
        match (link == LinkState::Connected, self.is_active()) {
            (true, false) => {
                info!("Link up, starting broker session");
                let (events_tx, events_rx) = mpsc::channel(SESSION_EVENT_QUEUE_DEPTH);
                match self.transport.start(events_tx).await {
                    Ok(()) => self.events_rx = Some(events_rx),
                    Err(e) => error!("Failed to start broker session: {}", e),
                }
            }
            (false, true) => {
                info!(link = ?link, "Link down, stopping broker session");
                self.transport.stop().await;
                // Whatever the stopped transport already queued goes with its channel
                self.events_rx = None;
                self.set_state(SessionState::Disconnected);
            }
            _ => {}
        }
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Established => {
                if !self.is_active() {
                    debug!("Ignoring session establishment while the transport is stopped");
                    return;
                }
                self.set_state(SessionState::Connected);
                self.subscribe_all();
            }
            SessionEvent::Lost => self.set_state(SessionState::Disconnected),
            SessionEvent::SubscribeAcked { pkid } => debug!(pkid, "Subscription acknowledged"),
            SessionEvent::UnsubscribeAcked { pkid } => {
                debug!(pkid, "Unsubscription acknowledged")
            }
            SessionEvent::PublishAcked { pkid } => debug!(pkid, "Publish acknowledged"),
            SessionEvent::MessageArrived { topic, payload } => {
                let message = InboundMessage {
                    topic: &topic,
                    payload: &payload,
                };
                debug!(
                    topic = %message.topic_str(),
                    payload_len = message.payload_len(),
                    "Message arrived"
                );
                self.consumer.on_message(&message);
            }
            SessionEvent::TransportError(reason) => error!("Broker transport error: {}", reason),
        }
    }

    /// Subscribe to every configured filter, in order; nothing to do for an empty set
    fn subscribe_all(&self) {
        for topic in &self.topics {
            match self.transport.subscribe(topic, SUBSCRIBE_QOS) {
                Ok(()) => info!(%topic, "Subscribed"),
                Err(e) => warn!(%topic, "Subscription request failed: {}", e),
            }
        }
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.status.swap(state);
        if previous != state {
            info!(from = ?previous, to = ?state, "Session state changed");
        }
    }
}

/// Next event of the running transport episode; pending forever while stopped
async fn next_event(
    events_rx: &mut Option<mpsc::Receiver<SessionEvent>>,
) -> Option<SessionEvent> {
    match events_rx {
        Some(events_rx) => events_rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Caller-side handle to a running session supervisor
///
/// Dropping the handle stops the supervisor.
pub struct SessionHandle {
    status: Arc<SessionStatus>,
    transport: Arc<dyn SessionTransport>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Non-blocking snapshot: true only while a broker session is established
    pub fn is_connected(&self) -> bool {
        self.status.is_connected()
    }

    pub fn state(&self) -> SessionState {
        self.status.state()
    }

    /// Shared status cell for readers on other tasks or threads
    pub fn status(&self) -> Arc<SessionStatus> {
        self.status.clone()
    }

    /// Submit a publish without waiting for broker acknowledgment
    ///
    /// Fails with [`SessionError::NotConnected`] when no session is established;
    /// nothing is queued or retried.
    pub fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), SessionError> {
        let state = self.status.state();
        if state != SessionState::Connected {
            return Err(SessionError::NotConnected { state });
        }
        self.transport.publish(topic, payload, PUBLISH_QOS, false)
    }

    /// Stop the event loop, tearing down any active session
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            match tokio::time::timeout(Duration::from_secs(2), task).await {
                Ok(Ok(())) => info!("Session supervisor shut down gracefully"),
                Ok(Err(e)) if !e.is_cancelled() => {
                    warn!("Session supervisor ended with error: {}", e)
                }
                Err(_) => warn!("Session supervisor didn't shut down in time"),
                _ => {}
            }
        }
    }
}
