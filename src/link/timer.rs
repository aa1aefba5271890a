//! Single-shot reconnect timer
//!
//! At most one deadline is ever outstanding. Arming aborts the previous task and
//! bumps a generation counter; each fire carries its generation, so a deadline
//! that reached the event queue before being superseded is recognised as stale.

use super::driver::LinkEvent;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

pub struct ReconnectTimer {
    events: mpsc::Sender<LinkEvent>,
    task: Option<JoinHandle<()>>,
    generation: u64,
    armed: Option<u64>,
}

impl ReconnectTimer {
    /// Create an unarmed timer that fires into `events`
    pub fn new(events: mpsc::Sender<LinkEvent>) -> Self {
        Self {
            events,
            task: None,
            generation: 0,
            armed: None,
        }
    }

    /// Arm a fresh deadline, cancelling any pending one; returns its generation
    pub fn arm(&mut self, delay: Duration) -> u64 {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        self.armed = Some(generation);

        let events = self.events.clone();
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver gone means the supervisor stopped
            let _ = events.send(LinkEvent::CooldownElapsed { generation }).await;
        }));

        debug!(generation, delay_ms = delay.as_millis() as u64, "Reconnect timer armed");
        generation
    }

    /// Drop the pending deadline, if any
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(generation) = self.armed.take() {
            debug!(generation, "Reconnect timer cancelled");
        }
    }

    /// Consume a fire event; true only for the currently armed generation
    pub fn accept_fire(&mut self, generation: u64) -> bool {
        if self.armed == Some(generation) {
            self.armed = None;
            self.task = None;
            true
        } else {
            debug!(generation, armed = ?self.armed, "Discarding stale reconnect timer fire");
            false
        }
    }

    pub fn is_pending(&self) -> bool {
        self.armed.is_some()
    }
}

impl Drop for ReconnectTimer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_delay() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut timer = ReconnectTimer::new(tx);

        let generation = timer.arm(Duration::from_secs(60));
        assert!(timer.is_pending());

        let event = rx.recv().await.unwrap();
        assert_eq!(event, LinkEvent::CooldownElapsed { generation });
        assert!(timer.accept_fire(generation));
        assert!(!timer.is_pending());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_leaves_single_deadline() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut timer = ReconnectTimer::new(tx);

        let first = timer.arm(Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(5)).await;
        let second = timer.arm(Duration::from_secs(10));
        assert_ne!(first, second);

        // The first deadline would have fired at t=10; only the second fires, at t=15
        tokio::time::sleep(Duration::from_secs(30)).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event, LinkEvent::CooldownElapsed { generation: second });
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_fire_is_rejected() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut timer = ReconnectTimer::new(tx);

        let first = timer.arm(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(2)).await;
        // Fire is queued but not yet processed when the timer is rearmed
        let second = timer.arm(Duration::from_secs(1));

        let queued = rx.recv().await.unwrap();
        assert_eq!(queued, LinkEvent::CooldownElapsed { generation: first });
        assert!(!timer.accept_fire(first));
        assert!(timer.is_pending());

        let fresh = rx.recv().await.unwrap();
        assert_eq!(fresh, LinkEvent::CooldownElapsed { generation: second });
        assert!(timer.accept_fire(second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut timer = ReconnectTimer::new(tx);

        timer.arm(Duration::from_secs(1));
        timer.cancel();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
        assert!(!timer.is_pending());
    }
}
