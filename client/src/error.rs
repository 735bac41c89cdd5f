use std::time::Duration;

use take6_protocol::DecodeError;
use thiserror::Error;

/// A local action attempted outside its allowed window. Never reaches the
/// network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateRejection {
    #[error("not yet my turn")]
    NotMyTurn,
    #[error("already committed a card this turn")]
    AlreadyCommitted,
    #[error("auto-play is on")]
    AutoPlayActive,
    #[error("previous action still processing")]
    ActionInProgress,
    #[error("connection not open")]
    ConnectionNotOpen,
    #[error("no row prompt active")]
    NoRowPrompt,
    #[error("card {0} is not in hand")]
    CardNotInHand(u32),
    #[error("row {0} does not exist")]
    RowOutOfRange(usize),
    #[error("not in a room")]
    NoRoom,
    #[error("room is not waiting for players")]
    NotWaiting,
    #[error("only the host can start the game")]
    NotHost,
    #[error("at least two players are needed")]
    NotEnoughPlayers,
    #[error("waiting for {0} to get ready")]
    PlayersNotReady(String),
    #[error("message is empty")]
    EmptyMessage,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error(transparent)]
    Protocol(#[from] DecodeError),
    #[error("{0}")]
    ServerRejection(String),
    #[error(transparent)]
    Gate(#[from] GateRejection),
    #[error("no response within {0:?}, please retry")]
    Timeout(Duration),
    #[error("could not refresh room state: {0}")]
    Fetch(String),
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("login required")]
    Unauthorized,
    #[error("server returned {code}: {message}")]
    Server { code: i64, message: String },
    #[error("response carried no data")]
    EmptyData,
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}
