//! Long-poll status watcher.
//!
//! Combines a [`LongPoll`] coordinator with its own [`KnitClient`]. The first
//! cycle of a session fetches `status` without waiting; later cycles wait a
//! short, interruptible interval and then issue `statuswait` with a fixed
//! bound, so the controller's own long-poll sets the steady cadence.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, trace};

use super::client::KnitClient;
use super::error::{LastError, TransportError};
use super::longpoll::{Interrupter, LongPoll, PollPhase, WaitOutcome};
use crate::config::ClientConfig;

/// Where the watcher is in its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cycle {
    /// Nothing fetched yet
    Fresh,
    /// Last fetch succeeded
    Steady,
    /// Last fetch failed; back off before reconnecting
    Recovering,
}

/// Status loop for one session (e.g. one UI websocket).
#[derive(Debug)]
pub struct StatusWatcher {
    client: KnitClient,
    poll: LongPoll,
    cycle: Cycle,
    status_wait_ms: u64,
    poll_interval: Duration,
    retry_delay: Duration,
}

impl StatusWatcher {
    /// Build a watcher with its own connection, listening on `interrupter`.
    pub fn new(config: &ClientConfig, interrupter: Interrupter) -> Self {
        Self {
            client: KnitClient::from_config(config),
            poll: LongPoll::with_interrupter(interrupter, config.min_poll_interval()),
            cycle: Cycle::Fresh,
            status_wait_ms: config.status_wait_ms,
            poll_interval: config.min_poll_interval(),
            retry_delay: config.retry_delay(),
        }
    }

    /// Handle that cuts the current wait short.
    pub fn interrupter(&self) -> Interrupter {
        self.poll.interrupter()
    }

    pub fn phase(&self) -> PollPhase {
        self.poll.phase()
    }

    /// Whether a local change is waiting to cut this watcher's next wait short.
    pub fn is_pending(&self) -> bool {
        self.poll.is_pending()
    }

    pub fn last_error(&self) -> Option<&LastError> {
        self.client.last_error()
    }

    /// Run one cycle: local wait, then a status round-trip.
    ///
    /// # Errors
    ///
    /// Returns the transport or protocol failure of the round-trip. The next
    /// call starts a fresh cycle after the retry delay.
    pub async fn next_status(&mut self) -> Result<Value, TransportError> {
        let (local_wait, wait_ms) = match self.cycle {
            Cycle::Fresh => (Duration::ZERO, 0),
            Cycle::Steady => (self.poll_interval, self.status_wait_ms),
            Cycle::Recovering => (self.retry_delay, 0),
        };

        let outcome = self.poll.wait_cycle(local_wait).await;
        if outcome == WaitOutcome::Woken {
            debug!("Status wait interrupted by local change");
        }
        trace!(?outcome, wait_ms, "Requesting status");

        match self.client.get_status(wait_ms).await {
            Ok(status) => {
                self.cycle = Cycle::Steady;
                Ok(status)
            }
            Err(e) => {
                self.cycle = Cycle::Recovering;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::error::ErrorKind;

    #[tokio::test]
    async fn test_failed_cycle_returns_to_idle() {
        let mut config = ClientConfig::for_socket("/tmp/nonexistent-knitpi-watcher-test.sock");
        config.retry_delay_ms = 5000;
        let mut watcher = StatusWatcher::new(&config, Interrupter::default());

        let err = watcher.next_status().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectFailed);
        assert_eq!(watcher.phase(), PollPhase::Idle);
        assert_eq!(watcher.cycle, Cycle::Recovering);
        assert!(watcher.last_error().is_some());

        // Retry delay is interruptible
        watcher.interrupter().interrupt();
        let start = tokio::time::Instant::now();
        assert!(watcher.next_status().await.is_err());
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
