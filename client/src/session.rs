use std::time::{Duration, Instant};

use chrono::Utc;
use take6_protocol::{
    decode_server_message, ChatBody, ClientToServer, Phase, RoomSnapshot, ServerToClient,
};
use tracing::{debug, info, warn};

use crate::chat::{ChatEntry, ChatLog};
use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, ConnectionState, Scope, ScopeKind, Transport};
use crate::error::{ApiError, GateRejection, SessionError};
use crate::gate;
use crate::identity::LocalIdentity;
use crate::reconcile::{reconcile, LocalViewState, PlayerStatus, Reconciled, Slot};
use crate::router::{route, Transition};
use crate::store::{CurrentRoom, GameResult, SessionStore};
use crate::throttle::FetchThrottle;
use crate::timers::{lowest_penalty_row, TimerKind, Timers};

/// Something the front-end should show or do.
#[derive(Debug)]
pub enum UiEvent {
    Notice(SessionError),
    ViewUpdated,
    Connection(ConnectionState),
    /// Room-setup prompts should close; the game view takes over.
    EnterGame,
    RevealBoard,
    CardsPlaced,
    RowPromptOpened { timeout: Duration },
    RowPromptClosed,
    RowCollected { row_index: Option<usize> },
    ChatReceived(ChatEntry),
    TurnCountdownElapsed,
    Navigate(Box<GameResult>),
    Left,
}

/// Work produced by the engine for the driver to carry out, in order.
#[derive(Debug)]
pub enum Effect {
    Open { url: String },
    Close,
    Send(String),
    FetchSnapshot { room_id: String },
    /// REST fallback for a leave that cannot go over the socket.
    LeaveRoom { room_id: String },
    Ui(UiEvent),
}

impl From<Transport> for Effect {
    fn from(t: Transport) -> Self {
        match t {
            Transport::Open { url } => Effect::Open { url },
            Transport::Close => Effect::Close,
            Transport::Send(text) => Effect::Send(text),
        }
    }
}

/// The session synchronization engine for one room or game view.
///
/// Sans-IO: callers feed socket events, fetch results and the current time,
/// then drain [`Session::take_effects`]. Every timer lives in one [`Timers`]
/// table, so [`Session::teardown`] cancels all of them at once.
pub struct Session {
    config: ClientConfig,
    identity: LocalIdentity,
    connection: ConnectionManager,
    view: LocalViewState,
    snapshot: Option<RoomSnapshot>,
    timers: Timers,
    throttle: FetchThrottle,
    chat: ChatLog,
    store: Box<dyn SessionStore>,
    room_id: Option<String>,
    effects: Vec<Effect>,
}

impl Session {
    pub fn new(
        config: ClientConfig,
        identity: LocalIdentity,
        store: Box<dyn SessionStore>,
    ) -> Result<Self, SessionError> {
        let connection = ConnectionManager::new(
            config.endpoint(ScopeKind::Room)?,
            config.endpoint(ScopeKind::Game)?,
            identity.user_identifier(),
        );
        Ok(Self {
            throttle: FetchThrottle::new(config.fetch_min_interval),
            chat: ChatLog::new(config.chat_history),
            config,
            identity,
            connection,
            view: LocalViewState::default(),
            snapshot: None,
            timers: Timers::new(),
            store,
            room_id: None,
            effects: Vec::new(),
        })
    }

    // ---- Accessors ----

    pub fn view(&self) -> &LocalViewState {
        &self.view
    }

    pub fn snapshot(&self) -> Option<&RoomSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn chat(&self) -> &ChatLog {
        &self.chat
    }

    pub fn identity(&self) -> &LocalIdentity {
        &self.identity
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn scope(&self) -> Option<&Scope> {
        self.connection.scope()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn remaining(&self, kind: TimerKind, now: Instant) -> Option<Duration> {
        self.timers.remaining(kind, now)
    }

    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    // ---- Lifecycle ----

    /// Starts the view for `room_id`: connects, restores a stored in-game
    /// snapshot for the same room so the view is not blank, and asks for a
    /// fresh one.
    pub fn mount(&mut self, room_id: impl Into<String>, kind: ScopeKind, now: Instant) {
        let room_id = room_id.into();
        if self.room_id.is_some() {
            self.teardown();
        }
        info!(%room_id, ?kind, "mounting session");
        self.room_id = Some(room_id.clone());

        let restored = match self.store.load_current_room() {
            Ok(Some(saved)) if saved.scope.room_id == room_id => {
                saved.snapshot.filter(|s| s.phase == Phase::Playing)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "could not read saved room");
                None
            }
        };
        let kind = if restored.is_some() { ScopeKind::Game } else { kind };
        self.connect(Scope { kind, room_id });
        if let Some(snapshot) = restored {
            debug!("restoring saved in-game snapshot");
            self.apply_snapshot(snapshot, now);
        }
        self.persist();
        self.request_fetch(now);
    }

    /// View shown again. Refreshes when the socket is still up; a dropped
    /// socket stays down until [`Session::reconnect`].
    pub fn resume(&mut self, now: Instant) {
        if self.connection.state().is_open() {
            self.request_fetch(now);
        }
    }

    pub fn reconnect(&mut self, now: Instant) -> bool {
        let Some(room_id) = self.room_id.clone() else {
            return false;
        };
        if !self.connection.state().is_closed() {
            return false;
        }
        let scope = self
            .connection
            .scope()
            .cloned()
            .unwrap_or_else(|| Scope::room(room_id));
        self.connect(scope);
        self.request_fetch(now);
        true
    }

    pub fn refresh(&mut self, now: Instant) -> bool {
        self.request_fetch(now)
    }

    /// Cancels every timer, drops the connection and forgets the view.
    pub fn teardown(&mut self) {
        debug!(room = ?self.room_id, "tearing down session");
        self.timers.cancel_all();
        let transports = self.connection.close();
        self.push_transports(transports);
        self.view = LocalViewState::default();
        self.snapshot = None;
        self.chat.clear();
        self.throttle = FetchThrottle::new(self.config.fetch_min_interval);
        self.room_id = None;
    }

    // ---- Connection events ----

    pub fn on_open(&mut self, now: Instant) {
        let transports = self.connection.on_open();
        if transports.is_empty() {
            return;
        }
        self.push_transports(transports);
        self.emit(UiEvent::Connection(ConnectionState::Open));
        self.request_fetch(now);
    }

    pub fn on_closed(&mut self, _now: Instant) {
        self.handle_close(None);
    }

    pub fn on_error(&mut self, reason: impl Into<String>, _now: Instant) {
        self.handle_close(Some(reason.into()));
    }

    fn handle_close(&mut self, error: Option<String>) {
        let closed = self.connection.on_closed();
        self.release_pending_play();
        match error {
            Some(reason) => {
                warn!(%reason, "connection failed");
                self.emit(UiEvent::Notice(SessionError::Connection(reason)));
            }
            None if !closed.requested => {
                self.emit(UiEvent::Notice(SessionError::Connection("connection closed".into())));
            }
            None => {}
        }
        self.push_transports(closed.follow_up);
        self.emit(UiEvent::Connection(self.connection.state()));
        self.emit(UiEvent::ViewUpdated);
    }

    pub fn on_frame(&mut self, text: &str, now: Instant) {
        match decode_server_message(text) {
            Ok(message) => self.handle_message(message, now),
            Err(e) => warn!(error = %e, "dropping undecodable frame"),
        }
    }

    pub fn on_fetched(&mut self, result: Result<RoomSnapshot, ApiError>, now: Instant) {
        self.throttle.finish();
        match result {
            Ok(snapshot) => self.apply_snapshot(snapshot, now),
            Err(e) => {
                warn!(error = %e, "snapshot fetch failed");
                self.emit(UiEvent::Notice(SessionError::Fetch(e.to_string())));
            }
        }
    }

    /// Fires every timer due at `now`.
    pub fn advance(&mut self, now: Instant) {
        for kind in self.timers.expired(now) {
            match kind {
                TimerKind::TurnCountdown => self.emit(UiEvent::TurnCountdownElapsed),
                TimerKind::RowSelection => self.auto_select_row(now),
                TimerKind::PlayWatchdog => {
                    if self.view.is_processing_action {
                        warn!("no answer to played card");
                        self.view.is_processing_action = false;
                        let waited = self.config.play_ack_timeout;
                        self.emit(UiEvent::Notice(SessionError::Timeout(waited)));
                        self.emit(UiEvent::ViewUpdated);
                    }
                }
                TimerKind::BoardReveal => self.emit(UiEvent::RevealBoard),
            }
        }
    }

    // ---- User actions ----

    pub fn select_card(&mut self, card_number: u32) -> Result<(), GateRejection> {
        if self.view.has_played {
            return Err(GateRejection::AlreadyCommitted);
        }
        if !self.view.in_hand(card_number) {
            return Err(GateRejection::CardNotInHand(card_number));
        }
        self.view.selected_card = Some(card_number);
        self.refresh_my_status();
        self.emit(UiEvent::ViewUpdated);
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.view.selected_card = None;
        self.refresh_my_status();
        self.emit(UiEvent::ViewUpdated);
    }

    pub fn attempt_play(&mut self, card_number: u32, now: Instant) -> Result<(), GateRejection> {
        if let Err(reason) = gate::check_play(&self.view, self.connection.state(), card_number) {
            debug!(card_number, %reason, "play rejected");
            return Err(reason);
        }
        info!(card_number, "playing card");
        self.view.selected_card = Some(card_number);
        self.view.is_processing_action = true;
        self.refresh_my_status();
        self.send(ClientToServer::PlayCard { card_number });
        self.timers.arm(TimerKind::PlayWatchdog, now, self.config.play_ack_timeout);
        self.emit(UiEvent::ViewUpdated);
        Ok(())
    }

    pub fn attempt_select_row(&mut self, row_index: usize, _now: Instant) -> Result<(), GateRejection> {
        gate::check_select_row(&self.view, self.connection.state(), row_index)?;
        info!(row_index, "collecting row");
        self.send(ClientToServer::SelectRow { row_index });
        self.close_row_prompt();
        self.emit(UiEvent::ViewUpdated);
        Ok(())
    }

    /// Flips local auto-play and tells the server. Rolled back when the
    /// socket is not open.
    pub fn toggle_auto_play(&mut self, _now: Instant) -> Result<bool, GateRejection> {
        if !self.connection.state().is_open() {
            return Err(GateRejection::ConnectionNotOpen);
        }
        let next = !self.view.is_auto_play;
        self.view.is_auto_play = next;
        self.rederive();
        if next {
            self.view.can_act = false;
        }
        self.send(ClientToServer::ToggleHosting { is_hosting: next });
        self.emit(UiEvent::ViewUpdated);
        Ok(next)
    }

    /// Optimistically flips the ready flag; a snapshot confirms it or a
    /// server error rolls it back.
    pub fn toggle_ready(&mut self) -> Result<bool, GateRejection> {
        gate::check_ready(&self.view)?;
        let next = !self.view.lobby.is_me_ready;
        self.view.pending_ready = Some(next);
        self.rederive();
        self.send(ClientToServer::PlayerReady { is_ready: next });
        self.emit(UiEvent::ViewUpdated);
        Ok(next)
    }

    pub fn start_game(&mut self) -> Result<(), GateRejection> {
        gate::check_start(&self.view)?;
        self.send(ClientToServer::StartGame);
        Ok(())
    }

    pub fn send_chat(&mut self, text: &str) -> Result<(), GateRejection> {
        let text = text.trim();
        if text.is_empty() {
            return Err(GateRejection::EmptyMessage);
        }
        if self.room_id.is_none() {
            return Err(GateRejection::NoRoom);
        }
        self.send(ClientToServer::Chat { data: ChatBody { text: text.to_string() } });
        Ok(())
    }

    /// Says goodbye over the socket when it is open, otherwise over REST,
    /// since closing drops anything still queued.
    pub fn leave(&mut self) {
        let Some(room_id) = self.room_id.clone() else {
            return;
        };
        info!(%room_id, "leaving room");
        if self.connection.state().is_open() {
            self.send(ClientToServer::LeaveRoom);
        } else {
            warn!(%room_id, state = ?self.connection.state(), "socket not open, leaving over REST");
            self.effects.push(Effect::LeaveRoom { room_id });
        }
        if let Err(e) = self.store.clear_current_room() {
            warn!(error = %e, "could not clear saved room");
        }
        self.teardown();
        self.emit(UiEvent::Left);
    }

    // ---- Inbound ----

    fn handle_message(&mut self, message: ServerToClient, now: Instant) {
        match message {
            ServerToClient::StateUpdate(snapshot) => self.apply_snapshot(*snapshot, now),
            ServerToClient::Chat(payload) => {
                if let Some(entry) =
                    self.chat.receive(payload, &self.view.players, &self.identity, Utc::now())
                {
                    self.emit(UiEvent::ChatReceived(entry));
                }
            }
            ServerToClient::Error { message } => {
                warn!(%message, "server rejected action");
                self.release_pending_play();
                if self.view.pending_ready.take().is_some() {
                    self.rederive();
                }
                self.emit(UiEvent::Notice(SessionError::ServerRejection(message)));
                self.emit(UiEvent::ViewUpdated);
            }
            ServerToClient::SelectRowPrompt => self.open_row_prompt(now),
            ServerToClient::RowSelected { row_index } => {
                self.close_row_prompt();
                self.emit(UiEvent::RowCollected { row_index });
            }
            ServerToClient::CardsPlaced => self.emit(UiEvent::CardsPlaced),
            ServerToClient::Other(kind) => debug!(%kind, "ignoring frame"),
        }
    }

    fn apply_snapshot(&mut self, snapshot: RoomSnapshot, now: Instant) {
        if let (Some(current), Some(incoming)) = (&self.room_id, snapshot.room_id()) {
            if *current != incoming {
                warn!(%current, %incoming, "dropping snapshot for another room");
                return;
            }
        }
        let from = self.view.phase;
        let had_prompt = self.view.row_prompt_open;
        let Reconciled { view, reveal } = reconcile(
            &self.view,
            &snapshot,
            &self.identity,
            self.config.default_max_players,
        );
        self.view = view;
        self.timers.cancel(TimerKind::PlayWatchdog);
        if reveal {
            self.timers.arm(TimerKind::BoardReveal, now, self.config.reveal_delay);
        }

        let phase = snapshot.phase;
        if phase == Phase::Playing {
            match self.view.countdown_secs {
                Some(secs) => self.timers.arm(
                    TimerKind::TurnCountdown,
                    now,
                    Duration::from_secs(u64::from(secs)),
                ),
                None => {
                    self.timers.cancel(TimerKind::TurnCountdown);
                }
            }
        } else {
            self.timers.cancel(TimerKind::TurnCountdown);
            self.timers.cancel(TimerKind::RowSelection);
            if had_prompt {
                self.emit(UiEvent::RowPromptClosed);
            }
        }

        self.snapshot = Some(snapshot);
        self.emit(UiEvent::ViewUpdated);
        if let Some(transition) = route(from, phase) {
            self.on_transition(transition);
        }
        self.persist();
    }

    fn on_transition(&mut self, transition: Transition) {
        let Some(room_id) = self.room_id.clone() else {
            return;
        };
        match transition {
            Transition::EnterGame => {
                self.emit(UiEvent::EnterGame);
                self.connect(Scope::game(room_id));
            }
            Transition::RoundEnded | Transition::GameOver => {
                let Some(snapshot) = self.snapshot.as_ref() else {
                    return;
                };
                let is_game_over = transition == Transition::GameOver;
                let result = GameResult::build(&room_id, &self.view, snapshot, is_game_over, Utc::now());
                if let Err(e) = self.store.save_result(&result) {
                    warn!(error = %e, "could not save result");
                }
                if is_game_over {
                    self.timers.cancel_all();
                    if let Err(e) = self.store.clear_current_room() {
                        warn!(error = %e, "could not clear saved room");
                    }
                }
                self.emit(UiEvent::Navigate(Box::new(result)));
            }
        }
    }

    fn open_row_prompt(&mut self, now: Instant) {
        let timeout = self.config.row_select_timeout;
        info!(?timeout, "row selection requested");
        self.view.row_prompt_open = true;
        self.timers.arm(TimerKind::RowSelection, now, timeout);
        self.emit(UiEvent::RowPromptOpened { timeout });
    }

    fn close_row_prompt(&mut self) {
        self.timers.cancel(TimerKind::RowSelection);
        if self.view.row_prompt_open {
            self.view.row_prompt_open = false;
            self.emit(UiEvent::RowPromptClosed);
        }
    }

    fn auto_select_row(&mut self, now: Instant) {
        if !self.view.row_prompt_open {
            return;
        }
        match lowest_penalty_row(&self.view.board) {
            Some(row_index) => {
                info!(row_index, "row prompt expired, choosing lowest penalty row");
                if let Err(reason) = self.attempt_select_row(row_index, now) {
                    warn!(%reason, "automatic row choice not sent");
                    self.close_row_prompt();
                }
            }
            None => {
                warn!("row prompt expired with no rows on the board");
                self.close_row_prompt();
            }
        }
    }

    // ---- Internals ----

    fn release_pending_play(&mut self) {
        self.timers.cancel(TimerKind::PlayWatchdog);
        self.view.is_processing_action = false;
    }

    /// Re-derives the view from the last snapshot after a local flag change.
    fn rederive(&mut self) {
        let Some(snapshot) = self.snapshot.as_ref() else {
            return;
        };
        let processing = self.view.is_processing_action;
        let Reconciled { view, .. } =
            reconcile(&self.view, snapshot, &self.identity, self.config.default_max_players);
        self.view = view;
        self.view.is_processing_action = processing;
    }

    fn refresh_my_status(&mut self) {
        let Some(index) = self.view.me_index else {
            return;
        };
        let status = if self.view.has_played {
            PlayerStatus::Played
        } else if self.view.selected_card.is_some() {
            PlayerStatus::Locked
        } else {
            PlayerStatus::Thinking
        };
        if let Some(me) = self.view.players.get_mut(index) {
            me.status = status;
        }
        if let Some(Slot::Seat(me)) = self.view.slots.get_mut(index) {
            me.status = status;
        }
    }

    fn request_fetch(&mut self, now: Instant) -> bool {
        let Some(room_id) = self.room_id.clone() else {
            return false;
        };
        if !self.throttle.try_start(now) {
            return false;
        }
        self.effects.push(Effect::FetchSnapshot { room_id });
        true
    }

    fn persist(&mut self) {
        if self.view.phase == Some(Phase::GameOver) {
            return;
        }
        let Some(scope) = self.connection.scope().cloned() else {
            return;
        };
        let room = CurrentRoom {
            scope,
            snapshot: self.snapshot.clone(),
            saved_at: Utc::now(),
        };
        if let Err(e) = self.store.save_current_room(&room) {
            warn!(error = %e, "could not save current room");
        }
    }

    fn connect(&mut self, scope: Scope) {
        let transports = self.connection.connect(scope);
        if !transports.is_empty() {
            self.push_transports(transports);
            self.emit(UiEvent::Connection(self.connection.state()));
        }
    }

    fn send(&mut self, command: ClientToServer) {
        let transports = self.connection.send(command);
        self.push_transports(transports);
    }

    fn push_transports(&mut self, transports: Vec<Transport>) {
        self.effects.extend(transports.into_iter().map(Effect::from));
    }

    fn emit(&mut self, event: UiEvent) {
        self.effects.push(Effect::Ui(event));
    }
}
