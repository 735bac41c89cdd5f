use take6_protocol::{Card, Phase, PlayerRecord, RoomSnapshot, Row, UserId};

use crate::identity::{self, LocalIdentity};
use crate::lobby::{self, LobbyView};

/// A row holding this many cards takes the next card as a penalty.
pub const DANGER_ROW_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    Played,
    /// Local player with a card selected but not yet sent.
    Locked,
    Thinking,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerView {
    pub key: String,
    pub user_id: Option<UserId>,
    pub name: String,
    pub avatar_url: Option<String>,
    pub score: i64,
    pub status: PlayerStatus,
    pub is_me: bool,
    pub is_host: bool,
    pub is_ready: bool,
    pub is_robot: bool,
    pub is_auto_play: bool,
    pub played_card: Option<Card>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Seat(PlayerView),
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowView {
    pub cards: Vec<Card>,
    pub penalty: u32,
    pub is_danger: bool,
}

impl From<&Row> for RowView {
    fn from(row: &Row) -> Self {
        RowView {
            cards: row.cards.clone(),
            penalty: row.penalty(),
            is_danger: row.cards.len() >= DANGER_ROW_LEN,
        }
    }
}

/// The client's projection of the last good snapshot plus UI-only flags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalViewState {
    pub room_id: Option<String>,
    pub room_name: Option<String>,
    pub phase: Option<Phase>,
    pub round: u32,
    pub turn: u32,
    pub countdown_secs: Option<u32>,
    pub players: Vec<PlayerView>,
    /// `players` padded with empty seats to the room size.
    pub slots: Vec<Slot>,
    pub me_index: Option<usize>,
    pub hand: Vec<Card>,
    pub board: Vec<RowView>,
    /// Every card committed this turn, ascending.
    pub revealed: Vec<Card>,
    pub has_played: bool,
    pub can_act: bool,
    pub all_committed: bool,
    pub my_score: i64,
    pub other_scores: Vec<(String, i64)>,
    pub lobby: LobbyView,

    pub is_processing_action: bool,
    pub selected_card: Option<u32>,
    pub is_auto_play: bool,
    /// Optimistic ready flag sent but not yet confirmed by a snapshot.
    pub pending_ready: Option<bool>,
    pub row_prompt_open: bool,
}

impl LocalViewState {
    pub fn me(&self) -> Option<&PlayerView> {
        self.me_index.and_then(|i| self.players.get(i))
    }

    pub fn in_hand(&self, card_number: u32) -> bool {
        self.hand.iter().any(|c| c.number == card_number)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub view: LocalViewState,
    /// Rising edge of "everyone committed"; the caller schedules the reveal.
    pub reveal: bool,
}

/// Merges a snapshot into the current view. Pure: the same inputs always
/// give the same output, and reapplying a snapshot to its own result
/// changes nothing.
///
/// Hand and board never regress to empty. An empty hand or board in the
/// snapshot keeps the previous one unless the room went back to WAITING.
pub fn reconcile(
    prev: &LocalViewState,
    snap: &RoomSnapshot,
    me: &LocalIdentity,
    default_slots: usize,
) -> Reconciled {
    let resolved = identity::resolve(me, &snap.roster);
    let me_index = resolved.map(|r| r.index);
    let my_record = resolved.map(|r| r.record);
    let phase = snap.phase;
    let phase_reset = prev.phase.is_some_and(|p| p != phase) && phase == Phase::Waiting;

    let incoming_hand = my_record.map(|r| r.hand.as_slice()).unwrap_or_default();
    let hand = if !incoming_hand.is_empty() {
        let mut hand = incoming_hand.to_vec();
        hand.sort_by_key(|c| c.number);
        hand
    } else if phase_reset {
        Vec::new()
    } else {
        prev.hand.clone()
    };

    let board = if !snap.board.is_empty() {
        snap.board.iter().map(RowView::from).collect()
    } else if phase_reset {
        Vec::new()
    } else {
        prev.board.clone()
    };

    let has_played = my_record.is_some_and(|r| r.has_played);
    let selected_card = prev
        .selected_card
        .filter(|n| !has_played && hand.iter().any(|c| c.number == *n));

    let host_index = lobby::infer_host(&snap.roster);
    let confirmed_ready = my_record.map(|r| lobby::infer_ready(r, me_index == host_index));
    let pending_ready = prev
        .pending_ready
        .filter(|p| phase == Phase::Waiting && confirmed_ready != Some(*p));

    let players: Vec<PlayerView> = snap
        .roster
        .entries()
        .enumerate()
        .map(|(i, (key, record))| {
            let is_me = me_index == Some(i);
            let is_host = host_index == Some(i);
            let inferred_ready = lobby::infer_ready(record, is_host);
            let status = if record.has_played {
                PlayerStatus::Played
            } else if is_me && selected_card.is_some() {
                PlayerStatus::Locked
            } else {
                PlayerStatus::Thinking
            };
            PlayerView {
                key: key.to_string(),
                user_id: record.primary_ids().next().cloned(),
                name: record
                    .name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Player {}", i + 1)),
                avatar_url: record.avatar_url.clone(),
                score: record.score,
                status,
                is_me,
                is_host,
                is_ready: if is_me { pending_ready.unwrap_or(inferred_ready) } else { inferred_ready },
                is_robot: record.is_robot,
                is_auto_play: record.is_auto_play,
                played_card: played_card(snap, key, record),
            }
        })
        .collect();

    let can_act = phase == Phase::Playing
        && my_record.is_some_and(|r| !r.has_played && !r.is_auto_play)
        && !prev.is_auto_play;

    // an empty roster mid-phase says nothing about who has committed
    let roster_gap = snap.roster.is_empty() && prev.phase == Some(phase);
    let all_committed = if roster_gap { prev.all_committed } else { snap.all_committed() };
    let reveal = all_committed && !prev.all_committed;

    let revealed = if roster_gap && snap.played_this_turn.is_empty() {
        prev.revealed.clone()
    } else {
        let mut revealed: Vec<Card> = snap.played_this_turn.values().copied().collect();
        revealed.sort_by_key(|c| c.number);
        revealed
    };

    let max_players = snap
        .max_players
        .filter(|n| *n > 0)
        .unwrap_or(default_slots)
        .max(players.len());
    let slots = players
        .iter()
        .cloned()
        .map(Slot::Seat)
        .chain(std::iter::repeat(Slot::Empty))
        .take(max_players)
        .collect();

    let lobby = LobbyView::derive(
        phase,
        &players,
        host_index,
        max_players,
        snap.max_rounds,
        snap.target_score,
    );
    let turn_info = snap.turn_info();

    let view = LocalViewState {
        room_id: snap.room_id().or_else(|| prev.room_id.clone()),
        room_name: snap.room_name.clone().or_else(|| prev.room_name.clone()),
        phase: Some(phase),
        round: turn_info.round,
        turn: turn_info.turn,
        countdown_secs: turn_info.countdown_secs,
        my_score: my_record.map(|r| r.score).unwrap_or_default(),
        other_scores: players
            .iter()
            .filter(|p| !p.is_me)
            .map(|p| (p.name.clone(), p.score))
            .collect(),
        slots,
        players,
        me_index,
        hand,
        board,
        revealed,
        has_played,
        can_act,
        all_committed,
        lobby,
        // any snapshot counts as an answer to an in-flight play
        is_processing_action: false,
        selected_card,
        is_auto_play: prev.is_auto_play,
        pending_ready,
        row_prompt_open: prev.row_prompt_open && phase == Phase::Playing,
    };

    Reconciled { view, reveal }
}

fn played_card(snap: &RoomSnapshot, slot_key: &str, record: &PlayerRecord) -> Option<Card> {
    record
        .primary_ids()
        .map(ToString::to_string)
        .chain(record.session_id.clone())
        .chain(std::iter::once(slot_key.to_string()))
        .find_map(|k| snap.played_this_turn.get(&k).copied())
}
