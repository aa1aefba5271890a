//! Link supervisor event loop
//!
//! Owns the driver, the retry policy and the reconnect timer. Every driver
//! notification and timer fire is consumed from one channel, one at a time,
//! so the state needs no locking beyond the atomic snapshot published for readers.

use super::driver::{LinkDriver, LinkError, LinkEvent, StationProfile};
use super::state::{LinkAction, LinkPolicy, LinkState, LinkStatus, LinkTransition};
use super::timer::ReconnectTimer;
use crate::config::LinkSection;
use crate::link_span;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

/// Depth of the inbound driver/timer event queue
pub const LINK_EVENT_QUEUE_DEPTH: usize = 32;

pub struct LinkSupervisor<D: LinkDriver> {
    driver: D,
    policy: LinkPolicy,
    status: Arc<LinkStatus>,
    state_tx: watch::Sender<LinkState>,
    events_rx: mpsc::Receiver<LinkEvent>,
    timer: ReconnectTimer,
}

impl<D: LinkDriver> LinkSupervisor<D> {
    /// Start the driver in station mode and spawn the supervisor event loop
    ///
    /// An invalid profile or a driver start failure is returned and never retried.
    /// The first association attempt is issued once the driver reports it has started.
    pub async fn start(section: &LinkSection, mut driver: D) -> Result<LinkHandle, LinkError> {
        let profile = StationProfile::from_section(section);
        profile.validate()?;
        info!(ssid = %profile.ssid, auth_mode = ?profile.auth_mode, "Starting station link");

        let (events_tx, events_rx) = mpsc::channel(LINK_EVENT_QUEUE_DEPTH);
        driver.start(&profile, events_tx.clone()).await?;

        let policy = LinkPolicy::new(section.max_retries, section.cooldown());
        let (supervisor, state_rx) = Self::new(driver, policy, events_tx, events_rx);
        let status = supervisor.status.clone();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(
            supervisor
                .run(shutdown_rx)
                .instrument(link_span!(ssid = %profile.ssid)),
        );

        Ok(LinkHandle {
            status,
            state_rx,
            shutdown_tx,
            task: Some(task),
        })
    }

    fn new(
        driver: D,
        policy: LinkPolicy,
        events_tx: mpsc::Sender<LinkEvent>,
        events_rx: mpsc::Receiver<LinkEvent>,
    ) -> (Self, watch::Receiver<LinkState>) {
        let (state_tx, state_rx) = watch::channel(LinkState::Idle);
        let supervisor = Self {
            driver,
            policy,
            status: Arc::new(LinkStatus::new()),
            state_tx,
            events_rx,
            timer: ReconnectTimer::new(events_tx),
        };
        (supervisor, state_rx)
    }

    async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping link supervisor");
                        break;
                    }
                }
                event = self.events_rx.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        warn!("Link event channel closed");
                        break;
                    }
                }
            }
        }
        self.timer.cancel();
    }

    /// Apply one event and execute the resulting action
    async fn handle_event(&mut self, event: LinkEvent) {
        let mut pending = Some(event);

        while let Some(event) = pending.take() {
            if let LinkEvent::CooldownElapsed { generation } = event {
                if !self.timer.accept_fire(generation) {
                    continue;
                }
            }
            if let LinkEvent::Disassociated {
                reason: Some(reason),
            } = &event
            {
                debug!(%reason, "Disassociated from access point");
            }

            let (from, failures) = self.status.snapshot();
            let transition = self.policy.next(from, failures, &event);
            self.policy.log_transition(from, &transition);
            self.publish(&transition);

            match transition.action {
                LinkAction::Connect => {
                    if let Err(e) = self.driver.connect().await {
                        // A rejected request counts as a failed attempt
                        warn!("Association request rejected by driver: {}", e);
                        pending = Some(LinkEvent::Disassociated {
                            reason: Some(e.to_string()),
                        });
                        // Let other tasks run between re-fed failures
                        tokio::task::yield_now().await;
                    }
                }
                LinkAction::ArmCooldown => {
                    self.timer.arm(self.policy.cooldown);
                }
                LinkAction::CancelCooldown => self.timer.cancel(),
                LinkAction::None => {}
            }
        }
    }

    fn publish(&self, transition: &LinkTransition) {
        self.status.store(transition.state, transition.failures);
        self.state_tx.send_if_modified(|current| {
            if *current != transition.state {
                *current = transition.state;
                true
            } else {
                false
            }
        });
    }
}

/// Caller-side handle to a running link supervisor
///
/// Dropping the handle stops the supervisor.
pub struct LinkHandle {
    status: Arc<LinkStatus>,
    state_rx: watch::Receiver<LinkState>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl LinkHandle {
    /// Non-blocking snapshot of the link state
    pub fn current_link_state(&self) -> LinkState {
        self.status.state()
    }

    /// Non-blocking snapshot of the consecutive-failure counter
    pub fn failure_count(&self) -> u32 {
        self.status.failures()
    }

    /// Shared status cell for readers on other tasks or threads
    pub fn status(&self) -> Arc<LinkStatus> {
        self.status.clone()
    }

    /// Receiver notified on every link state change
    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.state_rx.clone()
    }

    /// Stop the event loop and wait briefly for it to finish
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            match tokio::time::timeout(Duration::from_secs(2), task).await {
                Ok(Ok(())) => info!("Link supervisor shut down gracefully"),
                Ok(Err(e)) if !e.is_cancelled() => {
                    warn!("Link supervisor ended with error: {}", e)
                }
                Err(_) => warn!("Link supervisor didn't shut down in time"),
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_RETRIES_LIMIT;
    use crate::testing::mocks::MockLinkDriver;

    fn supervisor(
        max_retries: u32,
        driver: MockLinkDriver,
    ) -> (LinkSupervisor<MockLinkDriver>, watch::Receiver<LinkState>) {
        let (events_tx, events_rx) = mpsc::channel(LINK_EVENT_QUEUE_DEPTH);
        LinkSupervisor::new(
            driver,
            LinkPolicy::new(max_retries, Duration::from_secs(60)),
            events_tx,
            events_rx,
        )
    }

    fn disassociated() -> LinkEvent {
        LinkEvent::Disassociated { reason: None }
    }

    #[tokio::test]
    async fn test_driver_start_issues_one_attempt() {
        let driver = MockLinkDriver::new();
        let (mut sup, state_rx) = supervisor(3, driver.clone());

        sup.handle_event(LinkEvent::DriverStarted).await;

        assert_eq!(sup.status.state(), LinkState::Connecting);
        assert_eq!(*state_rx.borrow(), LinkState::Connecting);
        assert_eq!(driver.connect_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_counter_climbs_then_cooldown() {
        let driver = MockLinkDriver::new();
        let (mut sup, _state_rx) = supervisor(3, driver.clone());
        sup.handle_event(LinkEvent::DriverStarted).await;

        let mut observed = Vec::new();
        for _ in 0..4 {
            sup.handle_event(disassociated()).await;
            observed.push((sup.status.state(), sup.status.failures()));
        }

        assert_eq!(
            observed,
            vec![
                (LinkState::FailedRetrying, 1),
                (LinkState::FailedRetrying, 2),
                (LinkState::FailedRetrying, 3),
                (LinkState::Cooldown, 3),
            ]
        );
        // One initial attempt plus three immediate retries
        assert_eq!(driver.connect_calls(), 4);
        assert!(sup.timer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_fire_reconnects_exactly_once() {
        let driver = MockLinkDriver::new();
        let (mut sup, _state_rx) = supervisor(1, driver.clone());
        sup.handle_event(LinkEvent::DriverStarted).await;
        sup.handle_event(disassociated()).await;
        sup.handle_event(disassociated()).await;
        assert_eq!(sup.status.state(), LinkState::Cooldown);
        let calls_before = driver.connect_calls();

        let fired = sup.events_rx.recv().await.unwrap();
        sup.handle_event(fired.clone()).await;
        assert_eq!(sup.status.state(), LinkState::Connecting);
        assert_eq!(sup.status.failures(), 0);
        assert_eq!(driver.connect_calls(), calls_before + 1);

        // Replaying the same fire is stale and does nothing
        sup.handle_event(fired).await;
        assert_eq!(driver.connect_calls(), calls_before + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_in_cooldown_yields_single_fire() {
        let driver = MockLinkDriver::new();
        let (mut sup, _state_rx) = supervisor(0, driver.clone());
        sup.handle_event(LinkEvent::DriverStarted).await;
        sup.handle_event(disassociated()).await;
        assert_eq!(sup.status.state(), LinkState::Cooldown);

        tokio::time::sleep(Duration::from_secs(30)).await;
        sup.handle_event(disassociated()).await;
        assert_eq!(sup.status.state(), LinkState::Cooldown);

        tokio::time::sleep(Duration::from_secs(120)).await;
        let fired = sup.events_rx.recv().await.unwrap();
        assert!(matches!(fired, LinkEvent::CooldownElapsed { generation: 2 }));
        assert!(sup.events_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_associated_resets_counter() {
        let driver = MockLinkDriver::new();
        let (mut sup, state_rx) = supervisor(5, driver);
        sup.handle_event(LinkEvent::DriverStarted).await;
        sup.handle_event(disassociated()).await;
        sup.handle_event(disassociated()).await;
        assert_eq!(sup.status.failures(), 2);

        sup.handle_event(LinkEvent::Associated).await;
        assert_eq!(sup.status.state(), LinkState::Connected);
        assert_eq!(sup.status.failures(), 0);
        assert_eq!(*state_rx.borrow(), LinkState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_connect_counts_as_failure() {
        let driver = MockLinkDriver::new();
        driver.fail_connects(true);
        let (mut sup, _state_rx) = supervisor(2, driver.clone());

        sup.handle_event(LinkEvent::DriverStarted).await;

        // Initial attempt and two retries are all rejected, then cooldown
        assert_eq!(sup.status.state(), LinkState::Cooldown);
        assert_eq!(driver.connect_calls(), 3);
        assert!(sup.timer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejecting_driver_bounded_by_retry_limit() {
        let driver = MockLinkDriver::new();
        driver.fail_connects(true);
        let (mut sup, _state_rx) = supervisor(MAX_RETRIES_LIMIT, driver.clone());

        sup.handle_event(LinkEvent::DriverStarted).await;

        assert_eq!(sup.status.state(), LinkState::Cooldown);
        assert_eq!(sup.status.failures(), MAX_RETRIES_LIMIT);
        assert_eq!(driver.connect_calls(), MAX_RETRIES_LIMIT + 1);
    }
}
