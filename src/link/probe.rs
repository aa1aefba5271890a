//! Host link driver backed by TCP reachability probes
//!
//! A host has no station radio to drive, so an "association attempt" is a
//! bounded TCP connect to a fixed address (normally the broker). Once the probe
//! succeeds the driver keeps re-probing and reports the first failure as a
//! disassociation, which hands control back to the supervisor's retry policy.

use super::driver::{LinkDriver, LinkError, LinkEvent, StationProfile};
use crate::config::LinkSection;
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub struct ProbeLinkDriver {
    target: String,
    timeout: Duration,
    interval: Duration,
    events: Option<mpsc::Sender<LinkEvent>>,
    task: Option<JoinHandle<()>>,
}

impl ProbeLinkDriver {
    pub fn new(target: impl Into<String>, timeout: Duration, interval: Duration) -> Self {
        Self {
            target: target.into(),
            timeout,
            interval,
            events: None,
            task: None,
        }
    }

    /// Build from config, probing `fallback_target` unless `probe_address` is set
    pub fn from_section(section: &LinkSection, fallback_target: &str) -> Self {
        let target = section
            .probe_address
            .clone()
            .unwrap_or_else(|| fallback_target.to_string());
        Self::new(target, section.probe_timeout(), section.probe_interval())
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

/// Check `host:port` shape without resolving the host
fn validate_target(target: &str) -> Result<(), LinkError> {
    let (host, port) = target
        .rsplit_once(':')
        .ok_or_else(|| LinkError::DriverInit(format!("probe address {target:?} has no port")))?;
    if host.is_empty() || port.parse::<u16>().is_err() {
        return Err(LinkError::DriverInit(format!(
            "probe address {target:?} must be host:port"
        )));
    }
    Ok(())
}

async fn probe(target: &str, timeout: Duration) -> Result<(), String> {
    match tokio::time::timeout(timeout, TcpStream::connect(target)).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("probe timed out after {}ms", timeout.as_millis())),
    }
}

#[async_trait]
impl LinkDriver for ProbeLinkDriver {
    async fn start(
        &mut self,
        profile: &StationProfile,
        events: mpsc::Sender<LinkEvent>,
    ) -> Result<(), LinkError> {
        validate_target(&self.target)?;
        debug!(
            ssid = %profile.ssid,
            probe_target = %self.target,
            "Host driver probes reachability instead of associating"
        );

        events
            .send(LinkEvent::DriverStarted)
            .await
            .map_err(|e| LinkError::DriverInit(e.to_string()))?;
        self.events = Some(events);
        info!(probe_target = %self.target, "Probe link driver started");
        Ok(())
    }

    async fn connect(&mut self) -> Result<(), LinkError> {
        let events = self
            .events
            .clone()
            .ok_or_else(|| LinkError::Connect("driver not started".to_string()))?;
        if let Some(task) = self.task.take() {
            task.abort();
        }

        let target = self.target.clone();
        let timeout = self.timeout;
        let interval = self.interval;
        self.task = Some(tokio::spawn(async move {
            if let Err(reason) = probe(&target, timeout).await {
                let _ = events
                    .send(LinkEvent::Disassociated {
                        reason: Some(reason),
                    })
                    .await;
                return;
            }
            if events.send(LinkEvent::Associated).await.is_err() {
                return;
            }

            loop {
                tokio::time::sleep(interval).await;
                if let Err(reason) = probe(&target, timeout).await {
                    let _ = events
                        .send(LinkEvent::Disassociated {
                            reason: Some(reason),
                        })
                        .await;
                    return;
                }
            }
        }));
        Ok(())
    }
}

impl Drop for ProbeLinkDriver {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
