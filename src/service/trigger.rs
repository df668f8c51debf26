//! Coalescing trigger for GC passes
//!
//! Requests from startup, the interval timer and SIGUSR1 all land in a channel
//! with room for one signal. Requests made while a run is already pending are
//! dropped, so any burst turns into at most one extra pass.

use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// Receiving end drained by the GC worker
pub type GcSignals = mpsc::Receiver<()>;

/// Cloneable handle used to request a GC pass
#[derive(Debug, Clone)]
pub struct GcTrigger {
    tx: mpsc::Sender<()>,
}

impl GcTrigger {
    /// Creates a trigger and the single receiver for it
    pub fn channel() -> (Self, GcSignals) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    /// Requests a pass without waiting. Returns false if a pass was already
    /// pending or the worker has gone away.
    pub fn request_run(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => {
                debug!("GC run already pending");
                false
            }
            Err(TrySendError::Closed(())) => {
                warn!("GC worker is not running; request dropped");
                false
            }
        }
    }
}

/// Requests a pass every `period`. A zero period disables the timer.
pub fn spawn_interval(trigger: GcTrigger, period: Duration) -> Option<JoinHandle<()>> {
    if period.is_zero() {
        info!("Periodic GC disabled");
        return None;
    }
    info!("GC runs every {}s", period.as_secs_f64());

    Some(tokio::spawn(async move {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; startup requests its own run
        interval.tick().await;
        loop {
            interval.tick().await;
            trigger.request_run();
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    #[tokio::test]
    async fn test_requests_coalesce_into_one() {
        let (trigger, mut signals) = GcTrigger::channel();

        assert!(trigger.request_run());
        for _ in 0..10 {
            assert!(!trigger.request_run());
        }

        assert!(signals.try_recv().is_ok());
        assert_eq!(signals.try_recv(), Err(TryRecvError::Empty));

        // Draining frees the slot again
        assert!(trigger.request_run());
    }

    #[tokio::test]
    async fn test_concurrent_requests_coalesce() {
        let (trigger, mut signals) = GcTrigger::channel();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let trigger = trigger.clone();
                tokio::spawn(async move { trigger.request_run() })
            })
            .collect();
        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 1);
        assert!(signals.try_recv().is_ok());
        assert!(signals.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_worker_drops_request() {
        let (trigger, signals) = GcTrigger::channel();
        drop(signals);
        assert!(!trigger.request_run());
    }

    #[tokio::test]
    async fn test_interval_requests_runs() {
        let (trigger, mut signals) = GcTrigger::channel();
        let handle = spawn_interval(trigger, Duration::from_millis(20)).unwrap();

        let received = time::timeout(Duration::from_secs(2), signals.recv()).await;
        assert_eq!(received.unwrap(), Some(()));
        handle.abort();
    }

    #[tokio::test]
    async fn test_zero_interval_is_disabled() {
        let (trigger, _signals) = GcTrigger::channel();
        assert!(spawn_interval(trigger, Duration::ZERO).is_none());
    }
}
