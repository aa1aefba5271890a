//! stationlink - station link and broker session supervision
//!
//! Two cooperating supervisors keep a device online:
//!
//! - [`link`] keeps the network association up, retrying immediately a fixed
//!   number of times and then waiting out a cooldown before the next round.
//! - [`session`] runs an MQTT session only while the link is up, re-subscribes
//!   the configured topics on every establishment, hands inbound messages to a
//!   consumer and offers a fail-fast publish.
//!
//! Both expose lock-free status snapshots readable from any thread. Each
//! processes its events on its own task, one at a time.
//!
//! # Quick Start
//!
//! ```rust
//! use stationlink::config::StationConfig;
//! use stationlink::session::TopicSet;
//!
//! let config = StationConfig::from_toml_str(r#"
//! [link]
//! ssid = "plant-floor"
//! passphrase = "hunter22"
//!
//! [session]
//! broker_url = "mqtt://broker.local:1883"
//! topics = "sensors/temp;actuators/+/set"
//! "#).unwrap();
//!
//! let topics: TopicSet = config.session.topic_set().unwrap();
//! assert_eq!(topics.iter().collect::<Vec<_>>(), ["sensors/temp", "actuators/+/set"]);
//! assert_eq!(config.link.max_retries, 5);
//! ```

pub mod config;
pub mod error;
pub mod link;
pub mod observability;
pub mod session;
pub mod testing;

pub use config::{ConfigError, StationConfig};
pub use error::{SupervisorError, SupervisorResult};
pub use link::{LinkHandle, LinkState, LinkSupervisor};
pub use session::{SessionHandle, SessionState, SessionSupervisor};
