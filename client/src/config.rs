use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::connection::ScopeKind;

pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8080/ws";
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_STATE_DIR: &str = ".take6";

/// How long a played card may stay "processing" without a server reply.
pub const PLAY_ACK_TIMEOUT: Duration = Duration::from_secs(6);
/// Row-selection prompt lifetime before the client picks for the user.
pub const ROW_SELECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const REVEAL_DELAY: Duration = Duration::from_millis(500);
pub const FETCH_MIN_INTERVAL: Duration = Duration::from_millis(800);
pub const DEFAULT_MAX_PLAYERS: usize = 10;
pub const CHAT_HISTORY: usize = 200;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub ws_url: String,
    /// Separate endpoint for the game scope; falls back to `ws_url`.
    pub game_ws_url: Option<String>,
    pub api_base_url: String,
    pub token: Option<String>,
    pub play_ack_timeout: Duration,
    pub row_select_timeout: Duration,
    pub reveal_delay: Duration,
    pub fetch_min_interval: Duration,
    pub default_max_players: usize,
    pub chat_history: usize,
    pub state_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            game_ws_url: None,
            api_base_url: DEFAULT_API_URL.to_string(),
            token: None,
            play_ack_timeout: PLAY_ACK_TIMEOUT,
            row_select_timeout: ROW_SELECT_TIMEOUT,
            reveal_delay: REVEAL_DELAY,
            fetch_min_interval: FETCH_MIN_INTERVAL,
            default_max_players: DEFAULT_MAX_PLAYERS,
            chat_history: CHAT_HISTORY,
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    #[must_use]
    pub fn with_game_ws_url(mut self, url: impl Into<String>) -> Self {
        self.game_ws_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    #[must_use]
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_play_ack_timeout(mut self, timeout: Duration) -> Self {
        self.play_ack_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_row_select_timeout(mut self, timeout: Duration) -> Self {
        self.row_select_timeout = timeout;
        self
    }

    /// Parsed websocket endpoint for a connection scope.
    pub fn endpoint(&self, kind: ScopeKind) -> Result<Url, url::ParseError> {
        let raw = match kind {
            ScopeKind::Room => self.ws_url.as_str(),
            ScopeKind::Game => self.game_ws_url.as_deref().unwrap_or(&self.ws_url),
        };
        Url::parse(raw)
    }

    /// REST paths are joined relative to this, so the path always ends in `/`.
    pub fn api_base(&self) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&self.api_base_url)?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }
}
