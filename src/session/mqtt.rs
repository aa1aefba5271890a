//! MQTT v5 session transport on rumqttc
//!
//! Pure pieces (option building, endpoint parsing, event routing, backoff) sit
//! next to the one impure piece: the event pump task that polls the rumqttc
//! `EventLoop` and forwards routed events to the supervisor.

use super::transport::{SessionError, SessionEvent, SessionTransport};
use crate::config::SessionSection;
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, Event, EventLoop, MqttOptions};
use rumqttc::Transport as RumqttcTransport;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

/// Capacity of the rumqttc request channel
const REQUEST_QUEUE_DEPTH: usize = 10;

/// Delay pattern applied between polls after a transport error
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delays in milliseconds for consecutive failures
    pub backoff_pattern: Vec<u64>,
    /// Delay used once the pattern is exhausted
    pub sustained_delay: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            backoff_pattern: vec![25, 50, 100, 250],
            sustained_delay: 250,
        }
    }
}

impl ReconnectConfig {
    /// Delay before poll number `attempt` (1-based) after consecutive errors
    pub fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay)
    }
}

/// Broker host, port and whether TLS is required
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl BrokerEndpoint {
    /// Parse a broker URI: `mqtt://` or `tcp://` (1883), `mqtts://` or `ssl://` (8883)
    pub fn parse(broker_url: &str) -> Result<Self, SessionError> {
        let invalid = || SessionError::InvalidBrokerUrl(broker_url.to_string());
        let url = Url::parse(broker_url).map_err(|_| invalid())?;

        let tls = match url.scheme() {
            "mqtt" | "tcp" => false,
            "mqtts" | "ssl" => true,
            _ => return Err(invalid()),
        };
        let host = url.host_str().filter(|h| !h.is_empty()).ok_or_else(invalid)?;
        let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });

        Ok(Self {
            host: host.to_string(),
            port,
            tls,
        })
    }

    /// `host:port` form usable with socket connects
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Build MQTT options from the session section (pure function)
pub fn configure_mqtt_options(section: &SessionSection) -> Result<MqttOptions, SessionError> {
    let endpoint = BrokerEndpoint::parse(&section.broker_url)?;

    let client_id = section.client_id.clone().unwrap_or_else(|| {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("stationlink-{}", &suffix[..12])
    });
    // IPv6 literals come back bracketed from the URL parser
    let host = endpoint.host.trim_start_matches('[').trim_end_matches(']');
    let mut mqtt_options = MqttOptions::new(client_id, host, endpoint.port);

    if endpoint.tls {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some(username) = &section.username {
        let password = section.password.clone().unwrap_or_default();
        mqtt_options.set_credentials(username, &password);
    }

    mqtt_options.set_keep_alive(section.keep_alive());
    mqtt_options.set_clean_start(true);

    Ok(mqtt_options)
}

/// Map a rumqttc event to a session event (pure routing decision)
pub fn route_mqtt_event(event: &Event) -> Option<SessionEvent> {
    match event {
        Event::Incoming(incoming) => match incoming {
            Packet::ConnAck(_) => Some(SessionEvent::Established),
            Packet::Disconnect(_) => Some(SessionEvent::Lost),
            Packet::Publish(publish) => Some(SessionEvent::MessageArrived {
                topic: publish.topic.clone(),
                payload: publish.payload.clone(),
            }),
            Packet::SubAck(ack) => Some(SessionEvent::SubscribeAcked { pkid: ack.pkid }),
            Packet::UnsubAck(ack) => Some(SessionEvent::UnsubscribeAcked { pkid: ack.pkid }),
            Packet::PubAck(ack) => Some(SessionEvent::PublishAcked { pkid: ack.pkid }),
            Packet::PubComp(ack) => Some(SessionEvent::PublishAcked { pkid: ack.pkid }),
            _ => None,
        },
        Event::Outgoing(_) => None,
    }
}

struct ActiveSession {
    client: AsyncClient,
    pump: JoinHandle<()>,
}

/// rumqttc-backed [`SessionTransport`]
pub struct MqttSessionTransport {
    options: MqttOptions,
    connect_timeout: Duration,
    reconnect_config: ReconnectConfig,
    active: Mutex<Option<ActiveSession>>,
}

impl MqttSessionTransport {
    /// Validate the broker profile and prepare options; no network I/O happens here
    pub fn new(section: &SessionSection) -> Result<Self, SessionError> {
        let options = configure_mqtt_options(section)?;
        info!(
            broker = %section.broker_url,
            client_id = %options.client_id(),
            "MQTT session transport configured"
        );
        Ok(Self {
            options,
            connect_timeout: section.connect_timeout(),
            reconnect_config: ReconnectConfig::default(),
            active: Mutex::new(None),
        })
    }

    fn client(&self) -> Result<AsyncClient, SessionError> {
        let guard = self
            .active
            .lock()
            .map_err(|_| SessionError::TransportInit("session lock poisoned".to_string()))?;
        guard
            .as_ref()
            .map(|active| active.client.clone())
            .ok_or(SessionError::NotStarted)
    }
}

#[async_trait]
impl SessionTransport for MqttSessionTransport {
    async fn start(&self, events: mpsc::Sender<SessionEvent>) -> Result<(), SessionError> {
        let mut guard = self
            .active
            .lock()
            .map_err(|_| SessionError::TransportInit("session lock poisoned".to_string()))?;
        if guard.is_some() {
            debug!("MQTT session transport already running");
            return Ok(());
        }

        let (client, event_loop) = AsyncClient::new(self.options.clone(), REQUEST_QUEUE_DEPTH);
        let pump = tokio::spawn(run_event_pump(
            event_loop,
            events,
            self.connect_timeout,
            self.reconnect_config.clone(),
        ));
        *guard = Some(ActiveSession { client, pump });
        info!("MQTT session transport started");
        Ok(())
    }

    async fn stop(&self) {
        let active = match self.active.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(active) = active {
            // Best effort; the link under us is usually already gone
            let _ = active.client.try_disconnect();
            active.pump.abort();
            info!("MQTT session transport stopped");
        }
    }

    fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), SessionError> {
        self.client()?
            .try_subscribe(topic, qos)
            .map_err(|e| SessionError::SubscribeRejected(Box::new(e)))
    }

    fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), SessionError> {
        self.client()?
            .try_publish(topic, qos, retain, payload.to_vec())
            .map_err(|e| SessionError::PublishRejected(Box::new(e)))
    }
}

impl Drop for MqttSessionTransport {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.active.lock() {
            if let Some(active) = guard.take() {
                active.pump.abort();
            }
        }
    }
}

/// Poll the event loop forever, forwarding routed events
///
/// After an error the next poll makes rumqttc reconnect; the delay between
/// polls follows `reconnect_config`. Polls made while no session is up are
/// bounded by `connect_timeout`.
async fn run_event_pump(
    mut event_loop: EventLoop,
    events: mpsc::Sender<SessionEvent>,
    connect_timeout: Duration,
    reconnect_config: ReconnectConfig,
) {
    let mut connected = false;
    let mut failures = 0u32;

    loop {
        let polled = if connected {
            event_loop.poll().await.map_err(|e| e.to_string())
        } else {
            match tokio::time::timeout(connect_timeout, event_loop.poll()).await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(_) => Err(format!(
                    "no session established within {}ms",
                    connect_timeout.as_millis()
                )),
            }
        };

        match polled {
            Ok(event) => {
                let Some(session_event) = route_mqtt_event(&event) else {
                    continue;
                };
                match session_event {
                    SessionEvent::Established => {
                        connected = true;
                        failures = 0;
                    }
                    SessionEvent::Lost => connected = false,
                    _ => {}
                }
                if events.send(session_event).await.is_err() {
                    break;
                }
            }
            Err(reason) => {
                error!("MQTT event loop error: {}", reason);
                if connected {
                    connected = false;
                    if events.send(SessionEvent::Lost).await.is_err() {
                        break;
                    }
                }
                if events
                    .send(SessionEvent::TransportError(reason))
                    .await
                    .is_err()
                {
                    break;
                }

                failures = failures.saturating_add(1);
                let delay_ms = reconnect_config.calculate_backoff_delay(failures);
                debug!(failures, delay_ms, "Polling MQTT event loop again after delay");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
    warn!("MQTT event pump stopped: session supervisor is gone");
}
