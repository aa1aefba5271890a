//! Link state, lock-free status snapshot, and the pure retry/cooldown policy
//!
//! [`LinkPolicy::next`] is the whole transition table of the link layer. It has
//! no I/O, so the supervisor only executes the [`LinkAction`] it returns.

use super::driver::LinkEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Station link connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LinkState {
    /// Driver not started yet
    Idle = 0,
    /// Association attempt in flight
    Connecting = 1,
    /// Associated with the access point
    Connected = 2,
    /// Association failed, immediate retry in flight
    FailedRetrying = 3,
    /// Retry budget exhausted, waiting for the cooldown timer
    Cooldown = 4,
}

impl LinkState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => LinkState::Connecting,
            2 => LinkState::Connected,
            3 => LinkState::FailedRetrying,
            4 => LinkState::Cooldown,
            _ => LinkState::Idle,
        }
    }
}

/// Atomic snapshot of link state and consecutive-failure counter
///
/// Both live in one word, so a reader never sees a state paired with another
/// transition's counter. Written only by the supervisor's event loop; read from
/// any thread.
#[derive(Debug)]
pub struct LinkStatus {
    packed: AtomicU64,
}

impl LinkStatus {
    pub fn new() -> Self {
        Self {
            packed: AtomicU64::new(pack(LinkState::Idle, 0)),
        }
    }

    /// State and failure counter from the same transition
    pub fn snapshot(&self) -> (LinkState, u32) {
        unpack(self.packed.load(Ordering::Acquire))
    }

    pub fn state(&self) -> LinkState {
        self.snapshot().0
    }

    pub fn failures(&self) -> u32 {
        self.snapshot().1
    }

    pub(crate) fn store(&self, state: LinkState, failures: u32) {
        self.packed.store(pack(state, failures), Ordering::Release);
    }
}

fn pack(state: LinkState, failures: u32) -> u64 {
    (u64::from(failures) << 32) | u64::from(state as u8)
}

fn unpack(packed: u64) -> (LinkState, u32) {
    (LinkState::from_u8(packed as u8), (packed >> 32) as u32)
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Side effect the supervisor must perform after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    None,
    /// Issue an association attempt
    Connect,
    /// Arm (or rearm) the single-shot cooldown timer
    ArmCooldown,
    /// Drop any pending cooldown deadline
    CancelCooldown,
}

/// Result of applying one event to the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTransition {
    pub state: LinkState,
    pub failures: u32,
    pub action: LinkAction,
}

/// Linear-threshold retry policy: `max_retries` immediate attempts, then a fixed cooldown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkPolicy {
    pub max_retries: u32,
    pub cooldown: Duration,
}

impl LinkPolicy {
    pub fn new(max_retries: u32, cooldown: Duration) -> Self {
        Self {
            max_retries,
            cooldown,
        }
    }

    /// Apply `event` to `(state, failures)` (pure function)
    pub fn next(&self, state: LinkState, failures: u32, event: &LinkEvent) -> LinkTransition {
        let unchanged = LinkTransition {
            state,
            failures,
            action: LinkAction::None,
        };

        match (event, state) {
            (LinkEvent::DriverStarted, LinkState::Idle) => LinkTransition {
                state: LinkState::Connecting,
                failures,
                action: LinkAction::Connect,
            },
            (LinkEvent::DriverStarted, _) => {
                debug!(?state, "Ignoring driver start outside idle state");
                unchanged
            }

            (LinkEvent::Associated, LinkState::Idle) => {
                debug!("Ignoring association before any attempt was issued");
                unchanged
            }
            (LinkEvent::Associated, LinkState::Cooldown) => LinkTransition {
                state: LinkState::Connected,
                failures: 0,
                action: LinkAction::CancelCooldown,
            },
            (LinkEvent::Associated, _) => LinkTransition {
                state: LinkState::Connected,
                failures: 0,
                action: LinkAction::None,
            },

            (LinkEvent::Disassociated { .. }, LinkState::Idle) => unchanged,
            (LinkEvent::Disassociated { .. }, LinkState::Cooldown) => LinkTransition {
                state: LinkState::Cooldown,
                failures,
                action: LinkAction::ArmCooldown,
            },
            (LinkEvent::Disassociated { .. }, _) if failures < self.max_retries => LinkTransition {
                state: LinkState::FailedRetrying,
                failures: failures + 1,
                action: LinkAction::Connect,
            },
            (LinkEvent::Disassociated { .. }, _) => LinkTransition {
                state: LinkState::Cooldown,
                failures,
                action: LinkAction::ArmCooldown,
            },

            (LinkEvent::CooldownElapsed { .. }, LinkState::Cooldown) => LinkTransition {
                state: LinkState::Connecting,
                failures: 0,
                action: LinkAction::Connect,
            },
            (LinkEvent::CooldownElapsed { .. }, _) => {
                debug!(?state, "Ignoring cooldown expiry outside cooldown state");
                unchanged
            }
        }
    }

    /// Log a state transition (pure logging function)
    pub fn log_transition(&self, from: LinkState, to: &LinkTransition) {
        match (from, to.state) {
            (_, LinkState::Connected) if from != LinkState::Connected => {
                info!("Station link associated");
            }
            (_, LinkState::FailedRetrying) => {
                info!(
                    attempt = to.failures,
                    max_retries = self.max_retries,
                    "Retrying association"
                );
            }
            (LinkState::Cooldown, LinkState::Connecting) => {
                info!("Cooldown elapsed, trying to reconnect to the access point");
            }
            (_, LinkState::Cooldown) => {
                warn!(
                    cooldown_secs = self.cooldown.as_secs(),
                    "Retry budget exhausted, waiting for the next reconnection attempt"
                );
            }
            _ if from != to.state => {
                info!("Link state: {:?} -> {:?}", from, to.state);
            }
            _ => {}
        }
    }
}
