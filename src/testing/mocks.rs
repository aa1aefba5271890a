//! Mock implementations for testing
//!
//! Provides mock link drivers, session transports and message consumers so both
//! supervisors can be driven without a radio or a broker.

use crate::link::{LinkDriver, LinkError, LinkEvent, StationProfile};
use crate::session::{InboundMessage, MessageConsumer, SessionError, SessionEvent, SessionTransport};
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::QoS;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct LinkDriverState {
    connect_calls: AtomicU32,
    fail_start: AtomicBool,
    fail_connects: AtomicBool,
    events: Mutex<Option<mpsc::Sender<LinkEvent>>>,
    profile: Mutex<Option<StationProfile>>,
    outcomes: Mutex<VecDeque<LinkEvent>>,
}

/// Mock link driver
///
/// Clones share state, so a test can keep one clone while the supervisor owns another.
#[derive(Debug, Clone, Default)]
pub struct MockLinkDriver {
    inner: Arc<LinkDriverState>,
}

impl MockLinkDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `start` fail with [`LinkError::DriverInit`]
    pub fn fail_start(&self, fail: bool) {
        self.inner.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Make every `connect` call fail with [`LinkError::Connect`]
    pub fn fail_connects(&self, fail: bool) {
        self.inner.fail_connects.store(fail, Ordering::SeqCst);
    }

    /// Queue events reported one per accepted `connect`, in order
    pub fn script_outcomes(&self, outcomes: impl IntoIterator<Item = LinkEvent>) {
        lock(&self.inner.outcomes).extend(outcomes);
    }

    pub fn connect_calls(&self) -> u32 {
        self.inner.connect_calls.load(Ordering::SeqCst)
    }

    /// Profile received by `start`
    pub fn profile(&self) -> Option<StationProfile> {
        lock(&self.inner.profile).clone()
    }

    /// Deliver `event` as if the driver had reported it; false if not started
    pub async fn inject(&self, event: LinkEvent) -> bool {
        let sender = lock(&self.inner.events).clone();
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl LinkDriver for MockLinkDriver {
    async fn start(
        &mut self,
        profile: &StationProfile,
        events: mpsc::Sender<LinkEvent>,
    ) -> Result<(), LinkError> {
        if self.inner.fail_start.load(Ordering::SeqCst) {
            return Err(LinkError::DriverInit("Mock driver start failure".to_string()));
        }

        *lock(&self.inner.profile) = Some(profile.clone());
        events
            .send(LinkEvent::DriverStarted)
            .await
            .map_err(|e| LinkError::DriverInit(e.to_string()))?;
        *lock(&self.inner.events) = Some(events);
        Ok(())
    }

    async fn connect(&mut self) -> Result<(), LinkError> {
        self.inner.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_connects.load(Ordering::SeqCst) {
            return Err(LinkError::Connect("Mock connect failure".to_string()));
        }

        let outcome = lock(&self.inner.outcomes).pop_front();
        if let Some(event) = outcome {
            // Called from the supervisor loop, so never wait on its own queue
            if let Some(sender) = lock(&self.inner.events).as_ref() {
                let _ = sender.try_send(event);
            }
        }
        Ok(())
    }
}

/// Request observed by [`MockSessionTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Start,
    Stop,
    Subscribe {
        topic: String,
        qos: QoS,
    },
    Publish {
        topic: String,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    },
}

#[derive(Debug, Default)]
struct SessionTransportState {
    calls: Mutex<Vec<TransportCall>>,
    events: Mutex<Option<mpsc::Sender<SessionEvent>>>,
    fail_start: AtomicBool,
    fail_publish: AtomicBool,
    establish_on_start: AtomicBool,
}

/// Mock broker session transport that records every request
#[derive(Debug, Clone, Default)]
pub struct MockSessionTransport {
    inner: Arc<SessionTransportState>,
}

impl MockSessionTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report [`SessionEvent::Established`] as soon as `start` succeeds
    pub fn establishing() -> Self {
        let transport = Self::default();
        transport.inner.establish_on_start.store(true, Ordering::SeqCst);
        transport
    }

    pub fn fail_start(&self, fail: bool) {
        self.inner.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn fail_publish(&self, fail: bool) {
        self.inner.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        lock(&self.inner.calls).clone()
    }

    pub fn subscriptions(&self) -> Vec<(String, QoS)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Subscribe { topic, qos } => Some((topic, qos)),
                _ => None,
            })
            .collect()
    }

    pub fn publishes(&self) -> Vec<TransportCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, TransportCall::Publish { .. }))
            .collect()
    }

    /// Whether the transport is currently started
    pub fn is_running(&self) -> bool {
        lock(&self.inner.events).is_some()
    }

    /// Deliver `event` as if the broker connection had produced it; false if not running
    pub async fn inject(&self, event: SessionEvent) -> bool {
        let sender = lock(&self.inner.events).clone();
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }

    fn record(&self, call: TransportCall) {
        lock(&self.inner.calls).push(call);
    }
}

#[async_trait]
impl SessionTransport for MockSessionTransport {
    async fn start(&self, events: mpsc::Sender<SessionEvent>) -> Result<(), SessionError> {
        self.record(TransportCall::Start);
        if self.inner.fail_start.load(Ordering::SeqCst) {
            return Err(SessionError::TransportInit(
                "Mock transport start failure".to_string(),
            ));
        }

        if self.inner.establish_on_start.load(Ordering::SeqCst) {
            let _ = events.try_send(SessionEvent::Established);
        }
        *lock(&self.inner.events) = Some(events);
        Ok(())
    }

    async fn stop(&self) {
        self.record(TransportCall::Stop);
        lock(&self.inner.events).take();
    }

    fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), SessionError> {
        self.record(TransportCall::Subscribe {
            topic: topic.to_string(),
            qos,
        });
        Ok(())
    }

    fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), SessionError> {
        self.record(TransportCall::Publish {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
            retain,
        });
        if self.inner.fail_publish.load(Ordering::SeqCst) {
            return Err(SessionError::PublishRejected(Box::new(std::io::Error::other(
                "Mock publish rejection",
            ))));
        }
        Ok(())
    }
}

pub type RecordedMessage = (Vec<u8>, Vec<u8>);

/// Consumer that copies every message it receives
#[derive(Debug, Clone, Default)]
pub struct RecordingConsumer {
    messages: Arc<Mutex<Vec<RecordedMessage>>>,
}

impl RecordingConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<RecordedMessage> {
        lock(&self.messages).clone()
    }
}

impl MessageConsumer for RecordingConsumer {
    fn on_message(&self, message: &InboundMessage<'_>) {
        lock(&self.messages).push((message.topic.to_vec(), message.payload.to_vec()));
    }
}
