//! Client-side session synchronization for a Take-6 style card game.
//!
//! [`Session`] is the sans-IO engine; [`ws::spawn`] runs one on a tokio task
//! against a real websocket and the REST backend.

pub mod chat;
pub mod config;
pub mod connection;
pub mod error;
pub mod gate;
pub mod identity;
pub mod lobby;
pub mod queue;
pub mod reconcile;
pub mod rest;
pub mod router;
pub mod session;
pub mod store;
pub mod throttle;
pub mod timers;
pub mod ws;

#[cfg(test)]
mod tests;

pub use config::ClientConfig;
pub use connection::{ConnectionState, Scope, ScopeKind};
pub use error::{ApiError, GateRejection, SessionError, StoreError};
pub use identity::LocalIdentity;
pub use reconcile::{LocalViewState, PlayerStatus, PlayerView, RowView, Slot};
pub use rest::{CreateRoom, HttpRoomApi};
pub use session::{Effect, Session, UiEvent};
pub use store::{FileStore, GameResult, MemoryStore, SessionStore};
pub use timers::TimerKind;
pub use ws::{DriverEvent, SessionHandle, UserCommand};
