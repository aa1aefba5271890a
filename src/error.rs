//! Top-level error type
//!
//! Everything `run` can fail with during startup. These failures are fatal and
//! end the process; publish failures stay [`SessionError`] for the caller.

use crate::config::ConfigError;
use crate::link::LinkError;
use crate::session::SessionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Signal handler setup failed: {0}")]
    Signal(#[from] std::io::Error),
}

/// Result type for supervisor operations
pub type SupervisorResult<T> = Result<T, SupervisorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_conversions() {
        let error: SupervisorError = LinkError::DriverInit("radio missing".to_string()).into();
        assert!(matches!(error, SupervisorError::Link(_)));
        assert_eq!(
            error.to_string(),
            "Link error: Link driver initialization failed: radio missing"
        );

        let error: SupervisorError = ConfigError::InvalidConfig("bad".to_string()).into();
        assert!(matches!(error, SupervisorError::Config(_)));

        let error: SupervisorError =
            SessionError::InvalidBrokerUrl("ftp://nope".to_string()).into();
        assert!(matches!(error, SupervisorError::Session(_)));

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no signals");
        let error: SupervisorError = io.into();
        assert!(matches!(error, SupervisorError::Signal(_)));
    }

    #[test]
    fn test_source_chain_preserved() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let error: SupervisorError = ConfigError::FileRead(io).into();
        assert!(error.source().is_some());
    }
}
