use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Closes once the configured duration has elapsed since the run start.
///
/// Only new iteration starts consult the gate; an iteration already running is never cut.
#[derive(Debug)]
pub struct IterationGate {
    duration: Duration,
    deadline: OnceLock<Instant>,
}

impl IterationGate {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            deadline: OnceLock::new(),
        }
    }

    pub fn start_at(&self, started: Instant) {
        let _ = self.deadline.set(started + self.duration);
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn next(&self) -> bool {
        self.next_at(Instant::now())
    }

    fn next_at(&self, now: Instant) -> bool {
        // Lazily start on first use when the runner did not.
        let deadline = *self.deadline.get_or_init(|| now + self.duration);
        now < deadline
    }
}
