//! Link capability boundary
//!
//! The radio/driver stack is an external collaborator. It is started once with
//! a [`StationProfile`], receives association requests through [`LinkDriver::connect`],
//! and reports asynchronously by sending [`LinkEvent`]s on the channel it was given.

use crate::config::{AuthMode, LinkSection, SaeMode};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

/// Notifications delivered to the link supervisor, processed strictly in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Driver finished starting in station mode
    DriverStarted,
    /// Associated with the access point
    Associated,
    /// Association attempt failed or an established association dropped
    Disassociated { reason: Option<String> },
    /// Cooldown deadline reached; `generation` identifies which arming fired
    CooldownElapsed { generation: u64 },
}

/// Link layer errors
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Link driver initialization failed: {0}")]
    DriverInit(String),
    #[error("Association request failed: {0}")]
    Connect(String),
    #[error("Invalid station profile: {0}")]
    InvalidProfile(String),
}

/// Fixed network profile handed to the driver at start
#[derive(Clone, PartialEq, Eq)]
pub struct StationProfile {
    pub ssid: String,
    pub passphrase: Option<String>,
    pub auth_mode: AuthMode,
    pub sae_mode: Option<SaeMode>,
    pub sae_h2e_identifier: Option<String>,
}

impl StationProfile {
    pub fn from_section(section: &LinkSection) -> Self {
        Self {
            ssid: section.ssid.clone(),
            passphrase: section.passphrase.clone(),
            auth_mode: section.auth_mode,
            sae_mode: section.sae_mode,
            sae_h2e_identifier: section.sae_h2e_identifier.clone(),
        }
    }

    /// Check the limits a station driver enforces on the profile
    pub fn validate(&self) -> Result<(), LinkError> {
        if self.ssid.is_empty() || self.ssid.len() > 32 {
            return Err(LinkError::InvalidProfile(format!(
                "ssid must be 1 to 32 bytes, got {}",
                self.ssid.len()
            )));
        }
        let passphrase_len = self.passphrase.as_ref().map_or(0, String::len);
        if passphrase_len > 64 {
            return Err(LinkError::InvalidProfile(
                "passphrase must be at most 64 bytes".to_string(),
            ));
        }
        if passphrase_len == 0 && !self.auth_mode.is_open() {
            return Err(LinkError::InvalidProfile(format!(
                "auth mode {:?} requires a passphrase",
                self.auth_mode
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for StationProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StationProfile")
            .field("ssid", &self.ssid)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "***"))
            .field("auth_mode", &self.auth_mode)
            .field("sae_mode", &self.sae_mode)
            .field("sae_h2e_identifier", &self.sae_h2e_identifier)
            .finish()
    }
}

/// Station-mode network driver
#[async_trait]
pub trait LinkDriver: Send + 'static {
    /// Configure station mode with `profile` and start the driver
    ///
    /// The driver must send [`LinkEvent::DriverStarted`] on `events` once it is
    /// ready to accept association requests. An error here is unrecoverable.
    async fn start(
        &mut self,
        profile: &StationProfile,
        events: mpsc::Sender<LinkEvent>,
    ) -> Result<(), LinkError>;

    /// Issue one association attempt; the outcome arrives later as an event
    async fn connect(&mut self) -> Result<(), LinkError>;
}
