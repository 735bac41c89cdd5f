use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::reconcile::RowView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Informational countdown fed by the server's `countdown` seconds.
    TurnCountdown,
    /// Row-collection prompt; expiry picks a row for the user.
    RowSelection,
    /// Bounded wait for an answer to a played card.
    PlayWatchdog,
    /// Delay between "everyone committed" and flipping the cards face up.
    BoardReveal,
}

/// Deadlines for every pending timer, one per kind. Re-arming a kind
/// replaces its deadline; nothing fires unless the owner polls
/// [`Timers::expired`], so dropping or clearing this leaves no tick behind.
#[derive(Debug, Default)]
pub struct Timers {
    deadlines: HashMap<TimerKind, Instant>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, kind: TimerKind, now: Instant, after: Duration) {
        debug!(?kind, ?after, "timer armed");
        self.deadlines.insert(kind, now + after);
    }

    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        self.deadlines.remove(&kind).is_some()
    }

    pub fn cancel_all(&mut self) {
        self.deadlines.clear();
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.deadlines.contains_key(&kind)
    }

    pub fn remaining(&self, kind: TimerKind, now: Instant) -> Option<Duration> {
        self.deadlines
            .get(&kind)
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    /// Removes and returns every timer due at `now`, earliest first.
    pub fn expired(&mut self, now: Instant) -> Vec<TimerKind> {
        let mut due: Vec<(Instant, TimerKind)> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(kind, deadline)| (*deadline, *kind))
            .collect();
        due.sort_by_key(|(deadline, _)| *deadline);
        for (_, kind) in &due {
            self.deadlines.remove(kind);
        }
        due.into_iter().map(|(_, kind)| kind).collect()
    }
}

/// The automatic row choice: lowest penalty, lowest index on ties.
pub fn lowest_penalty_row(board: &[RowView]) -> Option<usize> {
    board
        .iter()
        .enumerate()
        .min_by_key(|(i, row)| (row.penalty, *i))
        .map(|(i, _)| i)
}
