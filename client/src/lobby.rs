use std::ops::RangeInclusive;

use take6_protocol::{Phase, PlayerRecord, Roster};

use crate::reconcile::PlayerView;

/// Round limit shown in the room view when the backend omits it.
pub const ROOM_DEFAULT_MAX_ROUNDS: u32 = 3;
pub const DEFAULT_TARGET_SCORE: i64 = 66;
pub const MIN_PLAYERS: usize = 2;

/// The host is the first record flagged `isHost`. Backends that never send
/// the flag get the first roster entry, unless that entry explicitly says
/// it is not the host.
pub fn infer_host(roster: &Roster) -> Option<usize> {
    roster
        .records()
        .position(|r| r.is_host == Some(true))
        .or_else(|| roster.get(0).filter(|r| r.is_host != Some(false)).map(|_| 0))
}

/// Explicit `isReady` wins. Otherwise the host and bots count as ready.
pub fn infer_ready(record: &PlayerRecord, is_host: bool) -> bool {
    record.is_ready.unwrap_or(is_host || record.is_robot)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LobbyView {
    pub host_index: Option<usize>,
    pub player_count: usize,
    pub ready_count: usize,
    pub is_me_host: bool,
    pub is_me_ready: bool,
    pub can_ready: bool,
    pub can_start_game: bool,
    /// Display names of everyone still not ready.
    pub not_ready: Vec<String>,
    pub max_players: usize,
    pub open_seats: usize,
    pub max_rounds: u32,
    pub target_score: i64,
}

impl LobbyView {
    pub fn derive(
        phase: Phase,
        players: &[PlayerView],
        host_index: Option<usize>,
        max_players: usize,
        max_rounds: Option<u32>,
        target_score: Option<i64>,
    ) -> Self {
        let me = players.iter().find(|p| p.is_me);
        let ready_count = players.iter().filter(|p| p.is_ready).count();
        let not_ready: Vec<String> = players
            .iter()
            .filter(|p| !p.is_ready)
            .map(|p| p.name.clone())
            .collect();

        LobbyView {
            host_index,
            player_count: players.len(),
            ready_count,
            is_me_host: me.is_some_and(|p| p.is_host),
            is_me_ready: me.is_some_and(|p| p.is_ready),
            can_ready: phase == Phase::Waiting,
            can_start_game: players.len() >= MIN_PLAYERS && not_ready.is_empty(),
            not_ready,
            max_players,
            open_seats: max_players.saturating_sub(players.len()),
            max_rounds: max_rounds.filter(|r| *r > 0).unwrap_or(ROOM_DEFAULT_MAX_ROUNDS),
            target_score: target_score.filter(|s| *s > 0).unwrap_or(DEFAULT_TARGET_SCORE),
        }
    }

    pub fn rules_summary(&self) -> String {
        format!(
            "{} players · {} rounds · {} points",
            self.max_players, self.max_rounds, self.target_score
        )
    }

    /// How many bots the host may add right now. Empty when the room is full.
    pub fn bot_choices(&self) -> RangeInclusive<usize> {
        1..=self.open_seats
    }
}
