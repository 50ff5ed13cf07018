//! Interruptible wait between status polls.
//!
//! A status watcher waits a short, bounded time between `statuswait`
//! round-trips. Any task holding an [`Interrupter`] can cut that wait short,
//! so a local change (a new row, a new pattern) is reflected without waiting
//! out the full interval.
//!
//! ```text
//!            wait_cycle(bound)
//!   Idle ───────────────────────► Waiting
//!    ▲                              │
//!    │        interrupt()           ├──► Woken ────┐
//!    │        bound elapsed         └──► TimedOut ─┤
//!    └─────────────────────────────────────────────┘
//! ```
//!
//! An interrupt bumps a generation counter shared by every coordinator
//! listening on the same handle. Each coordinator remembers the last
//! generation it has seen, so every one of them observes each interrupt
//! exactly once: raised while a coordinator is not waiting, it makes that
//! coordinator's next wait return `Woken` immediately.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::trace;

/// Smallest wait between two steady-state polls.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct Signal {
    generation: AtomicU64,
    notify: Notify,
}

/// Cloneable handle that wakes the current or next wait of every coordinator
/// listening on it.
#[derive(Debug, Clone, Default)]
pub struct Interrupter {
    signal: Arc<Signal>,
}

impl Interrupter {
    /// Wake the current waits, or make the next ones return immediately.
    pub fn interrupt(&self) {
        self.signal.generation.fetch_add(1, Ordering::AcqRel);
        self.signal.notify.notify_waiters();
    }

    fn generation(&self) -> u64 {
        self.signal.generation.load(Ordering::Acquire)
    }
}

/// Coordinator phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    Idle,
    Waiting,
}

/// How a wait cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// An interrupt arrived before the deadline.
    Woken,
    /// The bound elapsed without an interrupt.
    TimedOut,
}

/// Owns the interrupt signal and runs one wait at a time.
#[derive(Debug)]
pub struct LongPoll {
    interrupter: Interrupter,
    phase: PollPhase,
    min_interval: Duration,
    last_bound: Option<Duration>,
    /// Interrupt generation consumed by the most recent wait
    seen: u64,
}

impl Default for LongPoll {
    fn default() -> Self {
        Self::new(MIN_POLL_INTERVAL)
    }
}

impl LongPoll {
    /// Create a coordinator; non-zero bounds below `min_interval` are raised.
    pub fn new(min_interval: Duration) -> Self {
        Self::with_interrupter(Interrupter::default(), min_interval)
    }

    /// Create a coordinator listening on an existing interrupt handle.
    ///
    /// Interrupts raised before this call are not seen by the new coordinator.
    pub fn with_interrupter(interrupter: Interrupter, min_interval: Duration) -> Self {
        Self {
            seen: interrupter.generation(),
            interrupter,
            phase: PollPhase::Idle,
            min_interval,
            last_bound: None,
        }
    }

    /// Handle for other tasks to cut the wait short.
    pub fn interrupter(&self) -> Interrupter {
        self.interrupter.clone()
    }

    pub fn phase(&self) -> PollPhase {
        self.phase
    }

    /// Whether an interrupt arrived that this coordinator has not consumed.
    pub fn is_pending(&self) -> bool {
        self.interrupter.generation() != self.seen
    }

    /// Bound used by the most recent wait, after clamping.
    pub fn last_bound(&self) -> Option<Duration> {
        self.last_bound
    }

    /// Clamp a requested bound. Zero stays zero (first cycle of a session).
    pub fn effective_bound(&self, requested: Duration) -> Duration {
        if requested.is_zero() {
            Duration::ZERO
        } else {
            requested.max(self.min_interval)
        }
    }

    /// Wait up to `bound` (clamped) or until interrupted.
    ///
    /// A zero bound returns `TimedOut` at once unless an interrupt is pending.
    pub async fn wait_cycle(&mut self, bound: Duration) -> WaitOutcome {
        let bound = self.effective_bound(bound);
        self.last_bound = Some(bound);
        self.phase = PollPhase::Waiting;
        trace!(?bound, "Long-poll waiting");

        let signal = Arc::clone(&self.interrupter.signal);
        let notified = signal.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so an interrupt in between is not lost
        notified.as_mut().enable();

        let current = signal.generation.load(Ordering::Acquire);
        let outcome = if current != self.seen {
            self.seen = current;
            WaitOutcome::Woken
        } else if bound.is_zero() {
            WaitOutcome::TimedOut
        } else {
            match tokio::time::timeout(bound, notified).await {
                Ok(()) => {
                    self.seen = signal.generation.load(Ordering::Acquire);
                    WaitOutcome::Woken
                }
                Err(_) => WaitOutcome::TimedOut,
            }
        };

        self.phase = PollPhase::Idle;
        trace!(?outcome, "Long-poll finished waiting");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[test]
    fn test_effective_bound() {
        let poll = LongPoll::new(Duration::from_millis(100));
        assert_eq!(poll.effective_bound(Duration::ZERO), Duration::ZERO);
        assert_eq!(
            poll.effective_bound(Duration::from_millis(5)),
            Duration::from_millis(100)
        );
        assert_eq!(
            poll.effective_bound(Duration::from_millis(1000)),
            Duration::from_millis(1000)
        );
    }

    #[tokio::test]
    async fn test_wait_times_out_not_before_deadline() {
        let mut poll = LongPoll::new(Duration::from_millis(100));
        let start = Instant::now();

        let outcome = poll.wait_cycle(Duration::from_millis(150)).await;

        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(150));
        assert_eq!(poll.phase(), PollPhase::Idle);
        assert_eq!(poll.last_bound(), Some(Duration::from_millis(150)));
    }

    #[tokio::test]
    async fn test_interrupt_wakes_waiting_cycle() {
        let mut poll = LongPoll::new(Duration::from_millis(100));
        let interrupter = poll.interrupter();

        let waker = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            interrupter.interrupt();
        });

        let start = Instant::now();
        let outcome = poll.wait_cycle(Duration::from_secs(5)).await;

        assert_eq!(outcome, WaitOutcome::Woken);
        assert!(start.elapsed() < Duration::from_secs(5));
        waker.await.expect("waker task");
    }

    #[tokio::test]
    async fn test_pending_interrupt_skips_next_wait() {
        let mut poll = LongPoll::new(Duration::from_millis(100));
        let interrupter = poll.interrupter();

        interrupter.interrupt();
        assert!(poll.is_pending());

        let start = Instant::now();
        assert_eq!(poll.wait_cycle(Duration::from_secs(5)).await, WaitOutcome::Woken);
        assert!(start.elapsed() < Duration::from_secs(1));

        // Consumed exactly once
        assert!(!poll.is_pending());
        assert_eq!(
            poll.wait_cycle(Duration::from_millis(100)).await,
            WaitOutcome::TimedOut
        );
    }

    #[tokio::test]
    async fn test_interrupt_reaches_every_coordinator() {
        let interrupter = Interrupter::default();
        let mut waiting = LongPoll::with_interrupter(interrupter.clone(), Duration::from_millis(100));
        let mut busy = LongPoll::with_interrupter(interrupter.clone(), Duration::from_millis(100));

        let waker = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            interrupter.interrupt();
        });

        // The first coordinator is woken while waiting
        let start = Instant::now();
        assert_eq!(waiting.wait_cycle(Duration::from_secs(5)).await, WaitOutcome::Woken);
        assert!(start.elapsed() < Duration::from_secs(1));
        waker.await.expect("waker task");

        // The second was not waiting, and still sees the same interrupt once
        assert!(busy.is_pending());
        let start = Instant::now();
        assert_eq!(busy.wait_cycle(Duration::from_secs(5)).await, WaitOutcome::Woken);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(
            busy.wait_cycle(Duration::from_millis(100)).await,
            WaitOutcome::TimedOut
        );
    }

    #[tokio::test]
    async fn test_interrupt_before_creation_is_not_seen() {
        let interrupter = Interrupter::default();
        interrupter.interrupt();

        let poll = LongPoll::with_interrupter(interrupter, Duration::from_millis(100));
        assert!(!poll.is_pending());
    }

    #[tokio::test]
    async fn test_zero_bound_returns_immediately() {
        let mut poll = LongPoll::default();
        let start = Instant::now();
        assert_eq!(poll.wait_cycle(Duration::ZERO).await, WaitOutcome::TimedOut);
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
