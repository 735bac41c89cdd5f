use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use take6_protocol::{RoomSnapshot, Roster};

use crate::connection::Scope;
use crate::error::StoreError;
use crate::reconcile::LocalViewState;

/// Used for the results screen when the backend omits the limits.
pub const RESULT_DEFAULT_MAX_ROUNDS: u32 = 10;
pub const RESULT_DEFAULT_TARGET_SCORE: i64 = 66;

const CURRENT_ROOM_FILE: &str = "current_room.json";
const GAME_RESULT_FILE: &str = "game_result.json";

/// The "current room" pointer used to resume after switching views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentRoom {
    pub scope: Scope,
    #[serde(default)]
    pub snapshot: Option<RoomSnapshot>,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Standing {
    pub rank: usize,
    pub name: String,
    pub score: i64,
    pub is_me: bool,
}

/// Handed to the results view when a round or the whole game ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameResult {
    pub room_id: String,
    pub room_name: Option<String>,
    pub current_round: u32,
    pub max_rounds: u32,
    pub remaining_rounds: u32,
    pub target_score: i64,
    pub players: Roster,
    /// Fewest penalty points first.
    pub standings: Vec<Standing>,
    pub is_game_over: bool,
    pub saved_at: DateTime<Utc>,
}

impl GameResult {
    pub fn build(
        room_id: &str,
        view: &LocalViewState,
        snapshot: &RoomSnapshot,
        is_game_over: bool,
        saved_at: DateTime<Utc>,
    ) -> Self {
        let max_rounds = snapshot
            .max_rounds
            .filter(|r| *r > 0)
            .unwrap_or(RESULT_DEFAULT_MAX_ROUNDS);
        let mut ranked: Vec<_> = view.players.iter().collect();
        ranked.sort_by_key(|p| p.score);
        let standings = ranked
            .into_iter()
            .enumerate()
            .map(|(i, p)| Standing {
                rank: i + 1,
                name: p.name.clone(),
                score: p.score,
                is_me: p.is_me,
            })
            .collect();

        GameResult {
            room_id: room_id.to_string(),
            room_name: view.room_name.clone(),
            current_round: view.round,
            max_rounds,
            remaining_rounds: max_rounds.saturating_sub(view.round),
            target_score: snapshot
                .target_score
                .filter(|s| *s > 0)
                .unwrap_or(RESULT_DEFAULT_TARGET_SCORE),
            players: snapshot.roster.clone(),
            standings,
            is_game_over,
            saved_at,
        }
    }

    pub fn winner(&self) -> Option<&Standing> {
        self.standings.first()
    }
}

/// Persistence collaborator for resume pointers and terminal results.
pub trait SessionStore: Send {
    fn load_current_room(&self) -> Result<Option<CurrentRoom>, StoreError>;
    fn save_current_room(&mut self, room: &CurrentRoom) -> Result<(), StoreError>;
    fn clear_current_room(&mut self) -> Result<(), StoreError>;
    fn save_result(&mut self, result: &GameResult) -> Result<(), StoreError>;
    fn load_result(&self) -> Result<Option<GameResult>, StoreError>;
}

/// One pretty-printed JSON file per record under `dir`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, StoreError> {
        match fs::read(self.dir.join(name)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write<T: Serialize>(&self, name: &str, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(value)?;
        fs::write(self.dir.join(name), json)?;
        Ok(())
    }
}

impl SessionStore for FileStore {
    fn load_current_room(&self) -> Result<Option<CurrentRoom>, StoreError> {
        self.read(CURRENT_ROOM_FILE)
    }

    fn save_current_room(&mut self, room: &CurrentRoom) -> Result<(), StoreError> {
        self.write(CURRENT_ROOM_FILE, room)
    }

    fn clear_current_room(&mut self) -> Result<(), StoreError> {
        match fs::remove_file(self.dir.join(CURRENT_ROOM_FILE)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn save_result(&mut self, result: &GameResult) -> Result<(), StoreError> {
        self.write(GAME_RESULT_FILE, result)
    }

    fn load_result(&self) -> Result<Option<GameResult>, StoreError> {
        self.read(GAME_RESULT_FILE)
    }
}

#[derive(Debug, Default)]
struct Memory {
    current_room: Option<CurrentRoom>,
    result: Option<GameResult>,
}

/// Shared in-memory store. Clones see the same data, so a caller can keep a
/// handle after boxing one into a session.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Memory>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn load_current_room(&self) -> Result<Option<CurrentRoom>, StoreError> {
        Ok(self.inner.lock().current_room.clone())
    }

    fn save_current_room(&mut self, room: &CurrentRoom) -> Result<(), StoreError> {
        self.inner.lock().current_room = Some(room.clone());
        Ok(())
    }

    fn clear_current_room(&mut self) -> Result<(), StoreError> {
        self.inner.lock().current_room = None;
        Ok(())
    }

    fn save_result(&mut self, result: &GameResult) -> Result<(), StoreError> {
        self.inner.lock().result = Some(result.clone());
        Ok(())
    }

    fn load_result(&self) -> Result<Option<GameResult>, StoreError> {
        Ok(self.inner.lock().result.clone())
    }
}
