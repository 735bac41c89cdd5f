use crate::config::ClientConfig;
use crate::connection::{ConnectionState, Scope, ScopeKind};
use crate::error::{ApiError, GateRejection, SessionError};
use crate::identity::LocalIdentity;
use crate::session::{Effect, Session, UiEvent};
use crate::store::{CurrentRoom, MemoryStore, SessionStore};
use crate::timers::TimerKind;
use chrono::Utc;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

#[cfg(test)]
mod session_tests {
    use super::*;

    const ROOM_WS: &str = "ws://room.test/ws";
    const GAME_WS: &str = "ws://game.test/ws";

    fn config() -> ClientConfig {
        ClientConfig::default()
            .with_ws_url(ROOM_WS)
            .with_game_ws_url(GAME_WS)
    }

    /// Creates a session for user 1 ("me") backed by `store`
    fn session_with(store: &MemoryStore) -> Session {
        let me = LocalIdentity::with_id(1).named("me");
        Session::new(config(), me, Box::new(store.clone())).unwrap()
    }

    /// Mounts room r1 in `kind` scope and opens the socket, discarding setup effects
    fn joined(kind: ScopeKind, now: Instant) -> (Session, MemoryStore) {
        let store = MemoryStore::new();
        let mut session = session_with(&store);
        session.mount("r1", kind, now);
        session.on_open(now);
        session.take_effects();
        (session, store)
    }

    fn state_frame(room_state: Value) -> String {
        json!({ "type": "gameStateUpdate", "roomState": room_state }).to_string()
    }

    /// Two players mid-turn; rows carry 7, 3 and 3 penalty points
    fn playing_state() -> Value {
        json!({
            "roomId": "r1",
            "gameState": "PLAYING",
            "players": [
                {"id": 1, "nickname": "me", "hand": [{"number": 55, "bullheads": 7}, {"number": 12, "bullheads": 1}]},
                {"id": 2, "nickname": "bob"}
            ],
            "rows": [
                {"cards": [{"number": 3, "bullheads": 7}]},
                {"cards": [{"number": 20, "bullheads": 3}]},
                {"cards": [{"number": 30, "bullheads": 3}]}
            ]
        })
    }

    fn committed_state() -> Value {
        json!({
            "roomId": "r1",
            "gameState": "PLAYING",
            "players": [
                {"id": 1, "nickname": "me", "hasPlayed": true, "hand": [{"number": 55, "bullheads": 7}]},
                {"id": 2, "nickname": "bob", "hasPlayed": true}
            ],
            "playedCardsThisTurn": {
                "1": {"cardNumber": 12, "bullheads": 1},
                "2": {"cardNumber": 40, "bullheads": 3}
            }
        })
    }

    fn lobby_state() -> Value {
        json!({
            "roomId": "r1",
            "gameState": "WAITING",
            "players": [{"id": 2, "nickname": "bob"}, {"id": 1, "nickname": "me"}]
        })
    }

    fn sent(effects: &[Effect]) -> Vec<Value> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Send(text) => Some(serde_json::from_str(text).unwrap()),
                _ => None,
            })
            .collect()
    }

    fn count(effects: &[Effect], pred: impl Fn(&UiEvent) -> bool) -> usize {
        effects
            .iter()
            .filter(|e| matches!(e, Effect::Ui(ev) if pred(ev)))
            .count()
    }

    #[test]
    fn test_duplicate_connect_joins_once() {
        let now = Instant::now();
        let store = MemoryStore::new();
        let mut session = session_with(&store);
        session.mount("r1", ScopeKind::Room, now);
        assert_eq!(session.connection_state(), ConnectionState::Connecting);
        assert!(!session.reconnect(now));

        let mut effects = session.take_effects();
        let opens = effects.iter().filter(|e| matches!(e, Effect::Open { .. })).count();
        assert_eq!(opens, 1);

        session.on_open(now);
        session.on_open(now);
        effects.extend(session.take_effects());
        let joins: Vec<Value> = sent(&effects)
            .into_iter()
            .filter(|f| f["type"] == "joinRoom")
            .collect();
        assert_eq!(joins.len(), 1);
        assert_eq!(joins[0]["roomId"], "r1");
        assert_eq!(joins[0]["userIdentifier"], 1);
    }

    #[test]
    fn test_dropped_socket_waits_for_manual_reconnect() {
        let now = Instant::now();
        let (mut session, _) = joined(ScopeKind::Room, now);

        session.on_closed(now);
        let effects = session.take_effects();
        assert!(effects.iter().all(|e| !matches!(e, Effect::Open { .. })));
        assert_eq!(
            count(&effects, |ev| matches!(ev, UiEvent::Notice(SessionError::Connection(_)))),
            1
        );
        assert_eq!(session.connection_state(), ConnectionState::Closed);

        assert!(session.reconnect(now));
        let effects = session.take_effects();
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::Open { url } if url.starts_with(ROOM_WS))));
    }

    #[test]
    fn test_play_card_then_commit() {
        let now = Instant::now();
        let (mut session, _) = joined(ScopeKind::Game, now);
        session.on_frame(&state_frame(playing_state()), now);
        session.take_effects();
        assert!(session.view().can_act);
        assert_eq!(session.view().hand[0].number, 12);

        assert_eq!(session.attempt_play(12, now), Ok(()));
        let frames = sent(&session.take_effects());
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "playCard");
        assert_eq!(frames[0]["cardNumber"], 12);
        assert_eq!(frames[0]["data"]["cardNumber"], 12);
        assert!(session.view().is_processing_action);
        assert_eq!(session.attempt_play(55, now), Err(GateRejection::ActionInProgress));

        session.on_frame(&state_frame(committed_state()), now);
        assert!(!session.view().is_processing_action);
        assert!(session.remaining(TimerKind::PlayWatchdog, now).is_none());
        session.take_effects();

        assert_eq!(session.attempt_play(55, now), Err(GateRejection::AlreadyCommitted));
        assert!(sent(&session.take_effects()).is_empty());
    }

    #[test]
    fn test_unanswered_play_times_out() {
        let now = Instant::now();
        let (mut session, _) = joined(ScopeKind::Game, now);
        session.on_frame(&state_frame(playing_state()), now);
        session.attempt_play(12, now).unwrap();
        session.take_effects();

        session.advance(now + Duration::from_secs(5));
        assert!(session.view().is_processing_action);

        session.advance(now + Duration::from_secs(6));
        let effects = session.take_effects();
        assert_eq!(
            count(&effects, |ev| matches!(ev, UiEvent::Notice(SessionError::Timeout(_)))),
            1
        );
        assert!(!session.view().is_processing_action);
        assert_eq!(session.attempt_play(12, now), Ok(()));
    }

    #[test]
    fn test_server_rejection_cancels_watchdog() {
        let now = Instant::now();
        let (mut session, _) = joined(ScopeKind::Game, now);
        session.on_frame(&state_frame(playing_state()), now);
        session.attempt_play(12, now).unwrap();
        session.take_effects();

        session.on_frame(r#"{"type": "error", "message": "card rejected"}"#, now);
        assert!(!session.view().is_processing_action);
        let effects = session.take_effects();
        assert_eq!(
            count(&effects, |ev| matches!(
                ev,
                UiEvent::Notice(SessionError::ServerRejection(m)) if m == "card rejected"
            )),
            1
        );

        session.advance(now + Duration::from_secs(10));
        let late = session.take_effects();
        assert_eq!(count(&late, |ev| matches!(ev, UiEvent::Notice(_))), 0);
    }

    #[test]
    fn test_local_actions_publish_the_view() {
        let now = Instant::now();
        let (mut session, _) = joined(ScopeKind::Game, now);
        session.on_frame(&state_frame(playing_state()), now);
        session.take_effects();
        let updates = |effects: &[Effect]| count(effects, |ev| matches!(ev, UiEvent::ViewUpdated));

        session.select_card(55).unwrap();
        assert_eq!(updates(&session.take_effects()), 1);
        session.clear_selection();
        assert_eq!(updates(&session.take_effects()), 1);

        session.attempt_play(12, now).unwrap();
        let effects = session.take_effects();
        assert_eq!(updates(&effects), 1);
        assert!(session.view().is_processing_action);

        session.on_error("reset by peer", now);
        let effects = session.take_effects();
        assert_eq!(updates(&effects), 1);
        let last_update = effects
            .iter()
            .rposition(|e| matches!(e, Effect::Ui(UiEvent::ViewUpdated)))
            .unwrap();
        let last_state = effects
            .iter()
            .rposition(|e| matches!(e, Effect::Ui(UiEvent::Connection(_))))
            .unwrap();
        assert!(last_state < last_update);
        assert!(!session.view().is_processing_action);
    }

    #[test]
    fn test_close_releases_processing_lock() {
        let now = Instant::now();
        let (mut session, _) = joined(ScopeKind::Game, now);
        session.on_frame(&state_frame(playing_state()), now);
        session.attempt_play(12, now).unwrap();

        session.on_error("reset by peer", now);
        assert!(!session.view().is_processing_action);
        session.take_effects();
        session.advance(now + Duration::from_secs(10));
        let effects = session.take_effects();
        assert_eq!(
            count(&effects, |ev| matches!(ev, UiEvent::Notice(SessionError::Timeout(_)))),
            0
        );
    }

    #[test]
    fn test_row_prompt_expiry_picks_lowest_penalty() {
        let now = Instant::now();
        let (mut session, _) = joined(ScopeKind::Game, now);
        session.on_frame(&state_frame(playing_state()), now);
        session.on_frame(r#"{"type": "needSelectRow"}"#, now);
        let effects = session.take_effects();
        assert_eq!(count(&effects, |ev| matches!(ev, UiEvent::RowPromptOpened { .. })), 1);
        assert!(session.view().row_prompt_open);

        session.advance(now + Duration::from_secs(29));
        assert!(sent(&session.take_effects()).is_empty());

        session.advance(now + Duration::from_secs(30));
        let effects = session.take_effects();
        let frames = sent(&effects);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "selectRow");
        assert_eq!(frames[0]["rowIndex"], 1);
        assert_eq!(count(&effects, |ev| matches!(ev, UiEvent::RowPromptClosed)), 1);
        assert!(!session.view().row_prompt_open);
        assert_eq!(session.remaining(TimerKind::RowSelection, now), None);
    }

    #[test]
    fn test_user_row_choice_cancels_countdown() {
        let now = Instant::now();
        let (mut session, _) = joined(ScopeKind::Game, now);
        session.on_frame(&state_frame(playing_state()), now);
        assert_eq!(
            session.attempt_select_row(2, now),
            Err(GateRejection::NoRowPrompt)
        );

        session.on_frame(r#"{"type": "selectRow"}"#, now);
        session.take_effects();
        assert_eq!(session.attempt_select_row(2, now), Ok(()));
        assert_eq!(sent(&session.take_effects())[0]["rowIndex"], 2);

        session.advance(now + Duration::from_secs(60));
        assert!(sent(&session.take_effects()).is_empty());

        session.on_frame(r#"{"type": "rowSelected", "rowIndex": 2}"#, now);
        let effects = session.take_effects();
        assert_eq!(
            count(&effects, |ev| matches!(ev, UiEvent::RowCollected { row_index: Some(2) })),
            1
        );
    }

    #[test]
    fn test_round_end_closes_row_prompt_and_countdown() {
        let now = Instant::now();
        let (mut session, _) = joined(ScopeKind::Game, now);
        let mut state = playing_state();
        state["countdown"] = json!(20);
        session.on_frame(&state_frame(state), now);
        session.on_frame(r#"{"type": "needSelectRow"}"#, now);
        assert!(session.remaining(TimerKind::RowSelection, now).is_some());
        assert!(session.remaining(TimerKind::TurnCountdown, now).is_some());
        session.take_effects();

        session.on_frame(
            &state_frame(json!({"roomId": "r1", "gameState": "ROUND_END", "players": [{"id": 1}, {"id": 2}]})),
            now,
        );
        let effects = session.take_effects();
        assert_eq!(count(&effects, |ev| matches!(ev, UiEvent::RowPromptClosed)), 1);
        assert!(!session.view().row_prompt_open);
        assert_eq!(session.remaining(TimerKind::RowSelection, now), None);
        assert_eq!(session.remaining(TimerKind::TurnCountdown, now), None);

        session.advance(now + Duration::from_secs(30));
        let effects = session.take_effects();
        assert!(sent(&effects).is_empty());
        assert_eq!(count(&effects, |ev| matches!(ev, UiEvent::TurnCountdownElapsed)), 0);
    }

    #[test]
    fn test_reveal_fires_once_per_commit() {
        let t0 = Instant::now();
        let (mut session, _) = joined(ScopeKind::Game, t0);
        session.on_frame(&state_frame(playing_state()), t0);
        let mut reveals = 0;

        for step in 0..4u64 {
            let now = t0 + Duration::from_millis(200 * step);
            session.on_frame(&state_frame(committed_state()), now);
            session.advance(now);
            reveals += count(&session.take_effects(), |ev| matches!(ev, UiEvent::RevealBoard));
        }
        session.advance(t0 + Duration::from_secs(5));
        reveals += count(&session.take_effects(), |ev| matches!(ev, UiEvent::RevealBoard));

        assert_eq!(reveals, 1);
        let revealed: Vec<u32> = session.view().revealed.iter().map(|c| c.number).collect();
        assert_eq!(revealed, vec![12, 40]);
    }

    #[test]
    fn test_empty_roster_push_does_not_repeat_reveal() {
        let t0 = Instant::now();
        let (mut session, _) = joined(ScopeKind::Game, t0);
        session.on_frame(&state_frame(playing_state()), t0);
        session.take_effects();
        let frames = [
            committed_state(),
            json!({"roomId": "r1", "gameState": "PLAYING", "players": {}}),
            committed_state(),
        ];
        let mut reveals = 0;

        let mut now = t0;
        for frame in frames {
            session.on_frame(&state_frame(frame), now);
            now += Duration::from_millis(600);
            session.advance(now);
            reveals += count(&session.take_effects(), |ev| matches!(ev, UiEvent::RevealBoard));
        }

        assert_eq!(reveals, 1);
        assert!(session.view().all_committed);
    }

    #[test]
    fn test_partial_push_keeps_hand_and_board() {
        let now = Instant::now();
        let (mut session, _) = joined(ScopeKind::Game, now);
        session.on_frame(&state_frame(playing_state()), now);
        session.on_frame(
            &state_frame(json!({"roomId": "r1", "gameState": "PLAYING", "players": [{"id": 1}, {"id": 2}], "rows": []})),
            now,
        );
        assert_eq!(session.view().hand.len(), 2);
        assert_eq!(session.view().board.len(), 3);
    }

    #[test]
    fn test_game_over_navigates_once() {
        let now = Instant::now();
        let (mut session, store) = joined(ScopeKind::Game, now);
        session.on_frame(&state_frame(playing_state()), now);
        session.take_effects();
        assert!(store.load_current_room().unwrap().is_some());

        let over = json!({
            "roomId": "r1",
            "gameState": "FINISHED",
            "currentRound": 4,
            "players": [
                {"id": 1, "nickname": "me", "score": 30},
                {"id": 2, "nickname": "bob", "score": 70}
            ]
        });
        session.on_frame(&state_frame(over.clone()), now);
        let effects = session.take_effects();
        let results: Vec<_> = effects
            .iter()
            .filter_map(|e| match e {
                Effect::Ui(UiEvent::Navigate(result)) => Some(result),
                _ => None,
            })
            .collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_game_over);
        assert_eq!(results[0].standings[0].name, "me");
        assert!(results[0].standings[0].is_me);

        session.on_frame(&state_frame(over), now);
        let effects = session.take_effects();
        assert_eq!(count(&effects, |ev| matches!(ev, UiEvent::Navigate(_))), 0);

        assert!(store.load_result().unwrap().unwrap().is_game_over);
        assert!(store.load_current_room().unwrap().is_none());
        assert_eq!(session.next_deadline(), None);
    }

    #[test]
    fn test_round_end_keeps_resume_pointer() {
        let now = Instant::now();
        let (mut session, store) = joined(ScopeKind::Game, now);
        session.on_frame(&state_frame(playing_state()), now);
        session.on_frame(
            &state_frame(json!({"roomId": "r1", "gameState": "ROUND_END", "players": [{"id": 1}, {"id": 2}]})),
            now,
        );
        let effects = session.take_effects();
        assert_eq!(
            count(&effects, |ev| matches!(ev, UiEvent::Navigate(r) if !r.is_game_over)),
            1
        );
        assert!(store.load_current_room().unwrap().is_some());
    }

    #[test]
    fn test_game_start_moves_socket_to_game_scope() {
        let now = Instant::now();
        let (mut session, _) = joined(ScopeKind::Room, now);
        session.on_frame(&state_frame(lobby_state()), now);
        assert_eq!(count(&session.take_effects(), |ev| matches!(ev, UiEvent::EnterGame)), 0);

        session.on_frame(&state_frame(playing_state()), now);
        let effects = session.take_effects();
        assert_eq!(count(&effects, |ev| matches!(ev, UiEvent::EnterGame)), 1);
        assert!(effects.iter().any(|e| matches!(e, Effect::Close)));
        assert!(effects.iter().all(|e| !matches!(e, Effect::Open { .. })));

        session.on_closed(now);
        let effects = session.take_effects();
        assert_eq!(count(&effects, |ev| matches!(ev, UiEvent::Notice(_))), 0);
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Open { url } if url == "ws://game.test/ws?roomId=r1&userIdentifier=1"
        )));
        assert_eq!(session.scope(), Some(&Scope::game("r1")));

        session.on_open(now);
        let joins = sent(&session.take_effects());
        assert_eq!(joins.len(), 1);
        assert_eq!(joins[0]["type"], "joinRoom");
    }

    #[test]
    fn test_ready_toggle_rolls_back_on_error() {
        let now = Instant::now();
        let (mut session, _) = joined(ScopeKind::Room, now);
        session.on_frame(&state_frame(lobby_state()), now);
        session.take_effects();
        assert!(!session.view().lobby.is_me_ready);
        assert_eq!(session.start_game(), Err(GateRejection::NotHost));

        assert_eq!(session.toggle_ready(), Ok(true));
        let frames = sent(&session.take_effects());
        assert_eq!(frames[0]["type"], "playerReady");
        assert_eq!(frames[0]["isReady"], true);
        assert!(session.view().lobby.is_me_ready);

        // a stale push does not undo the optimistic flag
        session.on_frame(&state_frame(lobby_state()), now);
        assert!(session.view().lobby.is_me_ready);

        session.on_frame(r#"{"type": "error", "data": "room closed"}"#, now);
        assert!(!session.view().lobby.is_me_ready);
        assert_eq!(session.view().pending_ready, None);
    }

    #[test]
    fn test_host_starts_when_everyone_ready() {
        let now = Instant::now();
        let (mut session, _) = joined(ScopeKind::Room, now);
        session.on_frame(
            &state_frame(json!({
                "roomId": "r1",
                "gameState": "WAITING",
                "players": [{"id": 1, "nickname": "me"}, {"id": 2, "nickname": "bob"}]
            })),
            now,
        );
        assert_eq!(
            session.start_game(),
            Err(GateRejection::PlayersNotReady("bob".into()))
        );

        session.on_frame(
            &state_frame(json!({
                "roomId": "r1",
                "gameState": "WAITING",
                "players": [{"id": 1, "nickname": "me"}, {"id": 2, "nickname": "bob", "isRobot": true}]
            })),
            now,
        );
        session.take_effects();
        assert_eq!(session.start_game(), Ok(()));
        assert_eq!(sent(&session.take_effects())[0]["type"], "startGame");
    }

    #[test]
    fn test_leave_tears_everything_down() {
        let now = Instant::now();
        let (mut session, store) = joined(ScopeKind::Game, now);
        let mut state = playing_state();
        state["countdown"] = json!(20);
        session.on_frame(&state_frame(state), now);
        assert!(session.next_deadline().is_some());
        session.take_effects();

        session.leave();
        let effects = session.take_effects();
        assert_eq!(sent(&effects)[0]["type"], "leaveRoom");
        let close_at = effects.iter().position(|e| matches!(e, Effect::Close)).unwrap();
        let send_at = effects.iter().position(|e| matches!(e, Effect::Send(_))).unwrap();
        assert!(send_at < close_at);
        assert_eq!(count(&effects, |ev| matches!(ev, UiEvent::Left)), 1);

        assert_eq!(session.next_deadline(), None);
        assert_eq!(session.room_id(), None);
        assert!(store.load_current_room().unwrap().is_none());
    }

    #[test]
    fn test_leave_before_socket_opens_goes_over_rest() {
        let now = Instant::now();
        let store = MemoryStore::new();
        let mut session = session_with(&store);
        session.mount("r1", ScopeKind::Room, now);
        assert_eq!(session.connection_state(), ConnectionState::Connecting);
        session.take_effects();

        session.leave();
        let effects = session.take_effects();
        assert!(sent(&effects).is_empty());
        let rest_at = effects
            .iter()
            .position(|e| matches!(e, Effect::LeaveRoom { room_id } if room_id == "r1"))
            .unwrap();
        let close_at = effects.iter().position(|e| matches!(e, Effect::Close)).unwrap();
        assert!(rest_at < close_at);
        assert_eq!(count(&effects, |ev| matches!(ev, UiEvent::Left)), 1);
        assert_eq!(session.room_id(), None);
    }

    #[test]
    fn test_auto_play_needs_open_socket() {
        let now = Instant::now();
        let store = MemoryStore::new();
        let mut session = session_with(&store);
        session.mount("r1", ScopeKind::Game, now);
        assert_eq!(session.toggle_auto_play(now), Err(GateRejection::ConnectionNotOpen));
        assert!(!session.view().is_auto_play);

        session.on_open(now);
        session.on_frame(&state_frame(playing_state()), now);
        session.take_effects();
        assert_eq!(session.toggle_auto_play(now), Ok(true));
        let frames = sent(&session.take_effects());
        assert_eq!(frames[0]["type"], "toggleHosting");
        assert_eq!(frames[0]["isHosting"], true);
        assert!(!session.view().can_act);
        assert_eq!(session.attempt_play(12, now), Err(GateRejection::AutoPlayActive));

        assert_eq!(session.toggle_auto_play(now), Ok(false));
        assert!(session.view().can_act);
    }

    #[test]
    fn test_mount_restores_saved_game() {
        let now = Instant::now();
        let mut store = MemoryStore::new();
        store
            .save_current_room(&CurrentRoom {
                scope: Scope::game("r1"),
                snapshot: Some(serde_json::from_value(playing_state()).unwrap()),
                saved_at: Utc::now(),
            })
            .unwrap();

        let mut session = session_with(&store);
        session.mount("r1", ScopeKind::Room, now);
        let effects = session.take_effects();
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::Open { url } if url.starts_with(GAME_WS))));
        assert!(effects.iter().any(|e| matches!(e, Effect::FetchSnapshot { room_id } if room_id == "r1")));
        assert_eq!(session.view().hand.len(), 2);
    }

    #[test]
    fn test_saved_room_for_other_room_is_ignored() {
        let now = Instant::now();
        let mut store = MemoryStore::new();
        store
            .save_current_room(&CurrentRoom {
                scope: Scope::game("r9"),
                snapshot: Some(serde_json::from_value(playing_state()).unwrap()),
                saved_at: Utc::now(),
            })
            .unwrap();
        let mut session = session_with(&store);
        session.mount("r1", ScopeKind::Room, now);
        assert!(session.view().hand.is_empty());
        assert_eq!(session.scope(), Some(&Scope::room("r1")));
    }

    #[test]
    fn test_fetches_are_throttled() {
        let t0 = Instant::now();
        let store = MemoryStore::new();
        let mut session = session_with(&store);
        session.mount("r1", ScopeKind::Room, t0);
        let effects = session.take_effects();
        assert_eq!(
            effects.iter().filter(|e| matches!(e, Effect::FetchSnapshot { .. })).count(),
            1
        );
        assert!(!session.refresh(t0));

        session.on_fetched(Err(ApiError::EmptyData), t0 + Duration::from_millis(100));
        let effects = session.take_effects();
        assert_eq!(
            count(&effects, |ev| matches!(ev, UiEvent::Notice(SessionError::Fetch(_)))),
            1
        );
        assert!(!session.refresh(t0 + Duration::from_millis(500)));
        assert!(session.refresh(t0 + Duration::from_millis(800)));
    }

    #[test]
    fn test_fetched_snapshot_is_reconciled() {
        let now = Instant::now();
        let (mut session, _) = joined(ScopeKind::Game, now);
        let snapshot = serde_json::from_value(playing_state()).unwrap();
        session.on_fetched(Ok(snapshot), now);
        assert!(session.view().can_act);
    }

    #[test]
    fn test_garbage_and_foreign_frames_are_dropped() {
        let now = Instant::now();
        let (mut session, _) = joined(ScopeKind::Game, now);
        session.on_frame("{not json", now);
        session.on_frame(r#"{"type": "gameStateUpdate"}"#, now);
        assert!(session.take_effects().is_empty());

        let mut other = playing_state();
        other["roomId"] = json!("r2");
        session.on_frame(&state_frame(other), now);
        assert!(session.take_effects().is_empty());
        assert_eq!(session.view().phase, None);
    }

    #[test]
    fn test_chat_resolves_sender() {
        let now = Instant::now();
        let (mut session, _) = joined(ScopeKind::Room, now);
        session.on_frame(&state_frame(lobby_state()), now);
        session.take_effects();

        session.on_frame(r#"{"type": "chat", "data": {"sender": 2, "text": "hello"}}"#, now);
        let effects = session.take_effects();
        assert_eq!(
            count(&effects, |ev| matches!(ev, UiEvent::ChatReceived(e) if e.sender == "bob" && !e.is_me)),
            1
        );

        assert_eq!(session.send_chat("   "), Err(GateRejection::EmptyMessage));
        assert_eq!(session.send_chat("  gg  "), Ok(()));
        let frames = sent(&session.take_effects());
        assert_eq!(frames[0]["data"]["text"], "gg");
        assert_eq!(session.chat().len(), 1);
    }

    #[test]
    fn test_teardown_cancels_all_timers() {
        let now = Instant::now();
        let (mut session, _) = joined(ScopeKind::Game, now);
        let mut state = playing_state();
        state["countdown"] = json!(15);
        session.on_frame(&state_frame(state), now);
        session.on_frame(r#"{"type": "needSelectRow"}"#, now);
        session.attempt_play(12, now).unwrap();
        assert!(session.remaining(TimerKind::TurnCountdown, now).is_some());

        session.teardown();
        assert_eq!(session.next_deadline(), None);
        session.take_effects();
        session.advance(now + Duration::from_secs(120));
        assert!(session.take_effects().is_empty());
    }
}
