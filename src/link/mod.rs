//! Station link supervision
//!
//! Keeps the network association up: issues association attempts, retries
//! immediately up to a fixed budget, then backs off to a timed cooldown.
//!
//! - [`state`] - link state, atomic status snapshot and the pure retry policy
//! - [`driver`] - the driver capability the supervisor calls into
//! - [`timer`] - single-shot cooldown timer
//! - [`supervisor`] - the event loop tying them together
//! - [`probe`] - host driver using TCP reachability probes
//!
//! # Usage
//!
//! ```rust,no_run
//! use stationlink::config::StationConfig;
//! use stationlink::link::{LinkState, LinkSupervisor, ProbeLinkDriver};
//!
//! # tokio_test::block_on(async {
//! let config = StationConfig::load_from_file("stationlink.toml".as_ref())?;
//! let driver = ProbeLinkDriver::from_section(&config.link, "localhost:1883");
//! let link = LinkSupervisor::start(&config.link, driver).await?;
//!
//! let mut changes = link.subscribe();
//! while changes.changed().await.is_ok() {
//!     if *changes.borrow() == LinkState::Connected {
//!         break;
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod driver;
pub mod probe;
pub mod state;
pub mod supervisor;
pub mod timer;

pub use driver::{LinkDriver, LinkError, LinkEvent, StationProfile};
pub use probe::ProbeLinkDriver;
pub use state::{LinkAction, LinkPolicy, LinkState, LinkStatus, LinkTransition};
pub use supervisor::{LinkHandle, LinkSupervisor};
pub use timer::ReconnectTimer;
