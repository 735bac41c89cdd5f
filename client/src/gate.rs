use take6_protocol::Phase;

use crate::connection::ConnectionState;
use crate::error::GateRejection;
use crate::reconcile::LocalViewState;

/// May the local player commit `card_number` right now?
pub fn check_play(
    view: &LocalViewState,
    connection: ConnectionState,
    card_number: u32,
) -> Result<(), GateRejection> {
    if view.phase != Some(Phase::Playing) || view.me_index.is_none() {
        return Err(GateRejection::NotMyTurn);
    }
    if view.has_played {
        return Err(GateRejection::AlreadyCommitted);
    }
    if view.is_auto_play || view.me().is_some_and(|p| p.is_auto_play) {
        return Err(GateRejection::AutoPlayActive);
    }
    if view.is_processing_action {
        return Err(GateRejection::ActionInProgress);
    }
    if !connection.is_open() {
        return Err(GateRejection::ConnectionNotOpen);
    }
    if !view.can_act {
        return Err(GateRejection::NotMyTurn);
    }
    if !view.in_hand(card_number) {
        return Err(GateRejection::CardNotInHand(card_number));
    }
    Ok(())
}

/// Row choice is only legal while the server's prompt is open. A socket
/// that is still connecting queues the choice.
pub fn check_select_row(
    view: &LocalViewState,
    connection: ConnectionState,
    row_index: usize,
) -> Result<(), GateRejection> {
    if !view.row_prompt_open {
        return Err(GateRejection::NoRowPrompt);
    }
    if connection.is_closed() {
        return Err(GateRejection::ConnectionNotOpen);
    }
    if !view.board.is_empty() && row_index >= view.board.len() {
        return Err(GateRejection::RowOutOfRange(row_index));
    }
    Ok(())
}

pub fn check_ready(view: &LocalViewState) -> Result<(), GateRejection> {
    if view.me_index.is_none() {
        return Err(GateRejection::NoRoom);
    }
    if !view.lobby.can_ready {
        return Err(GateRejection::NotWaiting);
    }
    Ok(())
}

pub fn check_start(view: &LocalViewState) -> Result<(), GateRejection> {
    check_ready(view)?;
    let lobby = &view.lobby;
    if !lobby.is_me_host {
        return Err(GateRejection::NotHost);
    }
    if lobby.player_count < crate::lobby::MIN_PLAYERS {
        return Err(GateRejection::NotEnoughPlayers);
    }
    if !lobby.not_ready.is_empty() {
        return Err(GateRejection::PlayersNotReady(lobby.not_ready.join(", ")));
    }
    Ok(())
}
