use serde::{Deserialize, Serialize};
use take6_protocol::{encode_command, ClientToServer, UserId};
use tracing::{debug, error, info};
use url::Url;

use crate::queue::OutboundQueue;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Closed,
    Connecting,
    Open,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::Connecting)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, ConnectionState::Closed)
    }
}

/// Rooms and running games may live behind different socket endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScopeKind {
    Room,
    Game,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub kind: ScopeKind,
    pub room_id: String,
}

impl Scope {
    pub fn room(room_id: impl Into<String>) -> Self {
        Self { kind: ScopeKind::Room, room_id: room_id.into() }
    }

    pub fn game(room_id: impl Into<String>) -> Self {
        Self { kind: ScopeKind::Game, room_id: room_id.into() }
    }
}

/// Socket-level work for the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Open { url: String },
    Close,
    Send(String),
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Closed {
    /// False when the socket dropped without us asking.
    pub requested: bool,
    pub follow_up: Vec<Transport>,
}

/// Owns the one physical connection a session may hold.
///
/// A second `connect` for the live scope is absorbed. Switching scope
/// requests a close and only opens the next socket once the close is
/// acknowledged through [`ConnectionManager::on_closed`]. Nothing here
/// reconnects on its own.
#[derive(Debug)]
pub struct ConnectionManager {
    state: ConnectionState,
    active: Option<Scope>,
    next: Option<Scope>,
    closing: bool,
    queue: OutboundQueue,
    user: Option<UserId>,
    room_endpoint: Url,
    game_endpoint: Url,
}

impl ConnectionManager {
    pub fn new(room_endpoint: Url, game_endpoint: Url, user: Option<UserId>) -> Self {
        Self {
            state: ConnectionState::Closed,
            active: None,
            next: None,
            closing: false,
            queue: OutboundQueue::new(),
            user,
            room_endpoint,
            game_endpoint,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn scope(&self) -> Option<&Scope> {
        self.active.as_ref()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn connect_url(&self, scope: &Scope) -> Url {
        let mut url = match scope.kind {
            ScopeKind::Room => self.room_endpoint.clone(),
            ScopeKind::Game => self.game_endpoint.clone(),
        };
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("roomId", &scope.room_id);
            if let Some(user) = &self.user {
                query.append_pair("userIdentifier", &user.to_string());
            }
        }
        url
    }

    pub fn connect(&mut self, scope: Scope) -> Vec<Transport> {
        if self.closing {
            debug!(?scope, "close in flight, deferring connect");
            self.next = Some(scope);
            return Vec::new();
        }
        match self.state {
            ConnectionState::Closed => {
                let url = self.connect_url(&scope);
                info!(%url, "connecting");
                self.state = ConnectionState::Connecting;
                self.active = Some(scope);
                vec![Transport::Open { url: url.into() }]
            }
            _ if self.active.as_ref() == Some(&scope) => {
                debug!(state = ?self.state, "connect ignored, already live for this scope");
                Vec::new()
            }
            _ => {
                info!(from = ?self.active, to = ?scope, "switching connection scope");
                self.next = Some(scope);
                self.closing = true;
                vec![Transport::Close]
            }
        }
    }

    pub fn on_open(&mut self) -> Vec<Transport> {
        if !self.state.is_connecting() || self.closing {
            debug!(state = ?self.state, "stale open ignored");
            return Vec::new();
        }
        self.state = ConnectionState::Open;
        let queued: Vec<ClientToServer> = self.queue.drain().collect();
        info!(flushed = queued.len(), "connection open");
        queued
            .iter()
            .chain(std::iter::once(&ClientToServer::JoinRoom))
            .filter_map(|cmd| self.encode(cmd))
            .map(Transport::Send)
            .collect()
    }

    pub fn on_closed(&mut self) -> Closed {
        let requested = self.closing;
        if !requested && !self.state.is_closed() {
            info!(scope = ?self.active, "connection dropped");
        }
        self.state = ConnectionState::Closed;
        self.closing = false;
        let follow_up = match self.next.take() {
            Some(scope) => self.connect(scope),
            None => Vec::new(),
        };
        Closed { requested, follow_up }
    }

    /// Sends immediately when open, otherwise queues for the next open.
    pub fn send(&mut self, command: ClientToServer) -> Vec<Transport> {
        if self.state.is_open() && !self.closing {
            self.encode(&command).map(Transport::Send).into_iter().collect()
        } else {
            debug!(kind = command.kind(), state = ?self.state, "queueing command");
            self.queue.push(command);
            Vec::new()
        }
    }

    /// Drops queued work and any pending scope switch, and asks the socket
    /// to close.
    pub fn close(&mut self) -> Vec<Transport> {
        self.queue.clear();
        self.next = None;
        if self.state.is_closed() || self.closing {
            return Vec::new();
        }
        self.closing = true;
        vec![Transport::Close]
    }

    fn encode(&self, command: &ClientToServer) -> Option<String> {
        let Some(scope) = self.active.as_ref() else {
            error!(kind = command.kind(), "no scope to address command to");
            return None;
        };
        match encode_command(&scope.room_id, self.user.as_ref(), command) {
            Ok(text) => Some(text),
            Err(e) => {
                error!(kind = command.kind(), error = %e, "failed to encode command");
                None
            }
        }
    }
}
