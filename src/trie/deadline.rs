use std::time::{Duration, Instant};

/// Number of DP cells computed between two clock reads
pub const CHECK_TIME_COUNT: u64 = 50_000;

/// Per-call search context carrying the deadline
///
/// The context lives on the stack of the caller and is threaded through the
/// recursive searches, so concurrent searches never share a counter.
#[derive(Debug, Clone)]
pub struct SearchCtx {
    deadline: Option<Instant>,
    cells: u64,
    dead: bool,
}
impl Default for SearchCtx {
    fn default() -> Self {
        Self::unbounded()
    }
}
impl SearchCtx {
    /// A context that never expires
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            deadline: None,
            cells: 0,
            dead: false,
        }
    }

    /// A context expiring `timeout` from now
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A context expiring at an absolute instant
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cells: 0,
            dead: false,
        }
    }

    /// Accounts for `cells` units of work; returns `false` once the deadline has passed
    pub fn tick(&mut self, cells: u64) -> bool {
        if self.dead {
            return false;
        }
        self.cells += cells;
        if self.cells >= CHECK_TIME_COUNT {
            self.cells = 0;
            self.check_now();
        }
        !self.dead
    }

    /// Reads the clock immediately
    pub fn check_now(&mut self) -> bool {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                self.dead = true;
            }
        }
        !self.dead
    }

    /// Whether the deadline elapsed during a search
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.dead
    }
}
