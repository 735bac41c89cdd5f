use take6_protocol::Phase;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Close room-setup prompts and move the socket to the game scope.
    EnterGame,
    RoundEnded,
    GameOver,
}

/// Phase transition table. `from` is `None` before the first snapshot.
/// Repeating a phase is never a transition, which keeps terminal
/// navigation one-shot.
pub fn route(from: Option<Phase>, to: Phase) -> Option<Transition> {
    use Phase::*;

    if from == Some(to) {
        return None;
    }
    let transition = match (from, to) {
        (_, Playing) => Some(Transition::EnterGame),
        (None | Some(Playing), RoundEnd) => Some(Transition::RoundEnded),
        (None | Some(Playing | RoundEnd), GameOver) => Some(Transition::GameOver),
        (_, Waiting) => {
            debug!(?from, "room back to waiting");
            return None;
        }
        _ => None,
    };
    match transition {
        Some(t) => info!(?from, ?to, transition = ?t, "phase transition"),
        None => warn!(?from, ?to, "ignoring phase change outside the transition table"),
    }
    transition
}
