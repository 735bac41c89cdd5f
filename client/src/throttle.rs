use std::time::{Duration, Instant};

use tracing::debug;

/// Caller-side limit on snapshot fetches: one in flight, and a minimum gap
/// between starts. Redundant requests are dropped, not deferred; the next
/// push or explicit refresh catches up.
#[derive(Debug)]
pub struct FetchThrottle {
    min_interval: Duration,
    in_flight: bool,
    last_start: Option<Instant>,
}

impl FetchThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval, in_flight: false, last_start: None }
    }

    pub fn try_start(&mut self, now: Instant) -> bool {
        if self.in_flight {
            debug!("fetch skipped, one already in flight");
            return false;
        }
        if let Some(last) = self.last_start {
            if now.saturating_duration_since(last) < self.min_interval {
                debug!("fetch skipped, too soon after the last one");
                return false;
            }
        }
        self.in_flight = true;
        self.last_start = Some(now);
        true
    }

    pub fn finish(&mut self) {
        self.in_flight = false;
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }
}
