//! Broker session supervision
//!
//! Runs an MQTT session only while the station link is up, re-subscribes the
//! configured topics on every establishment and hands inbound messages to a
//! registered consumer.
//!
//! - [`state`] - session state and its atomic snapshot
//! - [`topics`] - topic list parsing and filter validation
//! - [`transport`] - the transport capability and its events
//! - [`mqtt`] - rumqttc-backed transport
//! - [`supervisor`] - the event loop and caller handle
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stationlink::config::StationConfig;
//! use stationlink::link::{LinkSupervisor, ProbeLinkDriver};
//! use stationlink::session::{InboundMessage, MqttSessionTransport, SessionSupervisor};
//!
//! # tokio_test::block_on(async {
//! let config = StationConfig::load_from_file("stationlink.toml".as_ref())?;
//! let driver = ProbeLinkDriver::from_section(&config.link, "localhost:1883");
//! let link = LinkSupervisor::start(&config.link, driver).await?;
//!
//! let transport = Arc::new(MqttSessionTransport::new(&config.session)?);
//! let session = SessionSupervisor::start(
//!     &config.session,
//!     transport,
//!     link.subscribe(),
//!     |message: &InboundMessage<'_>| {
//!         println!("{} bytes on {}", message.payload_len(), message.topic_str())
//!     },
//! )?;
//!
//! if session.is_connected() {
//!     session.publish("devices/press-04/status", b"online")?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod mqtt;
pub mod state;
pub mod supervisor;
pub mod topics;
pub mod transport;

pub use mqtt::{configure_mqtt_options, route_mqtt_event, BrokerEndpoint, MqttSessionTransport};
pub use state::{SessionState, SessionStatus};
pub use supervisor::{InboundMessage, MessageConsumer, SessionHandle, SessionSupervisor};
pub use topics::{TopicError, TopicSet};
pub use transport::{SessionError, SessionEvent, SessionTransport};
