use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use web_time::Instant;

/// A fixed point in wall-clock time after which work must stop.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn has_expired(&self) -> bool {
        Instant::now() >= self.at
    }
}

/// Cooperative stop signal shared by a search coordinator, its workers and the
/// oracle they call.
///
/// Cloning is cheap and every clone observes the same cancellation.
#[derive(Clone, Debug)]
pub struct StopToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Deadline>,
}

impl StopToken {
    /// A token that only stops when cancelled.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    pub fn with_deadline(deadline: Deadline) -> Self {
        Self {
            deadline: Some(deadline),
            ..Self::new()
        }
    }

    pub fn deadline(&self) -> Option<Deadline> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn has_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| deadline.has_expired())
    }

    /// Polled between units of work.
    pub fn should_stop(&self) -> bool {
        self.is_cancelled() || self.has_expired()
    }
}

impl Default for StopToken {
    fn default() -> Self {
        Self::new()
    }
}
