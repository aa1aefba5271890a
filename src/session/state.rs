//! Broker session state and its lock-free snapshot

use std::sync::atomic::{AtomicU8, Ordering};

/// Broker session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionState {
    /// Supervisor not initialized yet
    Uninitialized = 0,
    /// No session, either never established or lost
    Disconnected = 1,
    /// Session established and topics (re)subscribed
    Connected = 2,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionState::Disconnected,
            2 => SessionState::Connected,
            _ => SessionState::Uninitialized,
        }
    }
}

/// Atomic session state cell, written by the supervisor and read from anywhere
#[derive(Debug)]
pub struct SessionStatus(AtomicU8);

impl SessionStatus {
    pub fn new() -> Self {
        Self(AtomicU8::new(SessionState::Uninitialized as u8))
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Store `state`, returning the previous one
    pub(crate) fn swap(&self, state: SessionState) -> SessionState {
        SessionState::from_u8(self.0.swap(state as u8, Ordering::AcqRel))
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        let status = SessionStatus::new();
        assert_eq!(status.state(), SessionState::Uninitialized);
        assert!(!status.is_connected());

        assert_eq!(status.swap(SessionState::Connected), SessionState::Uninitialized);
        assert!(status.is_connected());

        assert_eq!(status.swap(SessionState::Disconnected), SessionState::Connected);
        assert!(!status.is_connected());
    }
}
