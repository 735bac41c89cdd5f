use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// ---- Identifiers ----

/// A user or room identifier as the backend sends it: sometimes a JSON
/// number, sometimes a numeric string. Equality is string-coerced, so
/// `Number(7) == Text("7")`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Number(i64),
    Text(String),
}

impl UserId {
    /// Empty strings are treated the same as an absent id.
    pub fn is_blank(&self) -> bool {
        match self {
            UserId::Number(_) => false,
            UserId::Text(s) => s.trim().is_empty(),
        }
    }
}

impl PartialEq for UserId {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (UserId::Number(a), UserId::Number(b)) => a == b,
            _ => self.to_string() == other.to_string(),
        }
    }
}

impl Eq for UserId {}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Number(n) => write!(f, "{n}"),
            UserId::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for UserId {
    fn from(n: i64) -> Self {
        UserId::Number(n)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        UserId::Text(s.to_string())
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// ---- Cards ----
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "RawCard")]
pub struct Card {
    pub number: u32,
    pub bullheads: u32,
}

// Hands and board rows say `number`, played-this-turn entries say `cardNumber`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCard {
    #[serde(default)]
    number: Option<u32>,
    #[serde(default)]
    card_number: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    bullheads: u32,
}

impl From<RawCard> for Card {
    fn from(raw: RawCard) -> Self {
        Card {
            number: raw.number.or(raw.card_number).unwrap_or_default(),
            bullheads: raw.bullheads,
        }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}🐮)", self.number, self.bullheads)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Row {
    #[serde(default, deserialize_with = "null_as_default")]
    pub cards: Vec<Card>,
}

impl Row {
    /// Penalty points collected by whoever takes this row.
    pub fn penalty(&self) -> u32 {
        self.cards.iter().map(|c| c.bullheads).sum()
    }
}

/// ---- Phases ----
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    #[default]
    Waiting,
    Playing,
    RoundEnd,
    #[serde(alias = "FINISHED")]
    GameOver,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Waiting => write!(f, "WAITING"),
            Phase::Playing => write!(f, "PLAYING"),
            Phase::RoundEnd => write!(f, "ROUND_END"),
            Phase::GameOver => write!(f, "GAME_OVER"),
        }
    }
}

/// ---- Players ----
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Only populated on the record that belongs to the receiving user.
    #[serde(default, deserialize_with = "null_as_default")]
    pub hand: Vec<Card>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub has_played: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_host: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_ready: Option<bool>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_robot: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub score: i64,
    #[serde(
        default,
        alias = "isHosting",
        alias = "is托管",
        alias = "isTrustee",
        deserialize_with = "null_as_default"
    )]
    pub is_auto_play: bool,
}

impl PlayerRecord {
    /// Non-blank primary ids (`id`, then `userId`).
    pub fn primary_ids(&self) -> impl Iterator<Item = &UserId> {
        self.id
            .iter()
            .chain(self.user_id.iter())
            .filter(|id| !id.is_blank())
    }

    pub fn has_primary_id(&self) -> bool {
        self.primary_ids().next().is_some()
    }

    pub fn name(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .or(self.nickname.as_deref())
            .filter(|n| !n.is_empty())
    }

    /// The key the backend uses for this player in `playedCardsThisTurn`.
    pub fn played_key(&self) -> Option<String> {
        self.primary_ids()
            .next()
            .map(ToString::to_string)
            .or_else(|| self.session_id.clone().filter(|s| !s.is_empty()))
    }
}

/// Player records in the order the server listed them. The backend sends an
/// object keyed by an opaque slot key; older payloads send a plain array.
/// Order matters: the first entry is the inferred host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roster(Vec<(String, PlayerRecord)>);

impl Roster {
    pub fn from_records(records: Vec<PlayerRecord>) -> Self {
        Roster(
            records
                .into_iter()
                .enumerate()
                .map(|(i, r)| (i.to_string(), r))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &PlayerRecord)> {
        self.0.iter().map(|(k, r)| (k.as_str(), r))
    }

    pub fn records(&self) -> impl Iterator<Item = &PlayerRecord> {
        self.0.iter().map(|(_, r)| r)
    }

    pub fn get(&self, index: usize) -> Option<&PlayerRecord> {
        self.0.get(index).map(|(_, r)| r)
    }
}

impl Serialize for Roster {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, record) in &self.0 {
            map.serialize_entry(key, record)?;
        }
        map.end()
    }
}

struct RosterVisitor;

impl<'de> Visitor<'de> for RosterVisitor {
    type Value = Roster;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map or list of player records")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Roster, E> {
        Ok(Roster::default())
    }

    fn visit_none<E: de::Error>(self) -> Result<Roster, E> {
        Ok(Roster::default())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Roster, A::Error> {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, record)) = access.next_entry::<String, PlayerRecord>()? {
            entries.push((key, record));
        }
        Ok(Roster(entries))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut access: A) -> Result<Roster, A::Error> {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some(record) = access.next_element::<PlayerRecord>()? {
            entries.push((entries.len().to_string(), record));
        }
        Ok(Roster(entries))
    }
}

impl<'de> Deserialize<'de> for Roster {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RosterVisitor)
    }
}

/// ---- Snapshots ----

/// One complete server-pushed state of a room or game. Never a delta.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<UserId>,
    // REST room objects sometimes only carry `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_name: Option<String>,
    #[serde(rename = "gameState", alias = "phase", default, deserialize_with = "null_as_default")]
    pub phase: Phase,
    #[serde(rename = "players", default)]
    pub roster: Roster,
    #[serde(rename = "rows", default, deserialize_with = "null_as_default")]
    pub board: Vec<Row>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_round: Option<u32>,
    #[serde(rename = "currentTurnNumber", default, skip_serializing_if = "Option::is_none")]
    pub current_turn: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub countdown: Option<u32>,
    #[serde(rename = "playedCardsThisTurn", default, deserialize_with = "null_as_default")]
    pub played_this_turn: BTreeMap<String, Card>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_players: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rounds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_score: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnInfo {
    pub round: u32,
    pub turn: u32,
    pub countdown_secs: Option<u32>,
}

impl RoomSnapshot {
    pub fn room_id(&self) -> Option<String> {
        self.room_id
            .as_ref()
            .or(self.id.as_ref())
            .filter(|id| !id.is_blank())
            .map(ToString::to_string)
    }

    pub fn turn_info(&self) -> TurnInfo {
        TurnInfo {
            round: self.current_round.filter(|r| *r > 0).unwrap_or(1),
            turn: self.current_turn.filter(|t| *t > 0).unwrap_or(1),
            countdown_secs: self.countdown.filter(|s| *s > 0),
        }
    }

    /// True when the roster is non-empty and every player committed a card.
    pub fn all_committed(&self) -> bool {
        !self.roster.is_empty() && self.roster.records().all(|p| p.has_played)
    }
}

/// ---- Client → Server ----
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientToServer {
    JoinRoom,
    PlayCard {
        #[serde(rename = "cardNumber")]
        card_number: u32,
    },
    SelectRow {
        #[serde(rename = "rowIndex")]
        row_index: usize,
    },
    PlayerReady {
        #[serde(rename = "isReady")]
        is_ready: bool,
    },
    StartGame,
    LeaveRoom,
    Chat {
        data: ChatBody,
    },
    ToggleHosting {
        #[serde(rename = "isHosting")]
        is_hosting: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatBody {
    pub text: String,
}

impl ClientToServer {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientToServer::JoinRoom => "joinRoom",
            ClientToServer::PlayCard { .. } => "playCard",
            ClientToServer::SelectRow { .. } => "selectRow",
            ClientToServer::PlayerReady { .. } => "playerReady",
            ClientToServer::StartGame => "startGame",
            ClientToServer::LeaveRoom => "leaveRoom",
            ClientToServer::Chat { .. } => "chat",
            ClientToServer::ToggleHosting { .. } => "toggleHosting",
        }
    }
}

/// Wraps a command in the `{ type, roomId, userIdentifier, ... }` envelope.
///
/// `playCard` additionally mirrors its fields under `data`, since some
/// backend builds only read the nested payload.
pub fn encode_command(
    room_id: &str,
    user_identifier: Option<&UserId>,
    command: &ClientToServer,
) -> Result<String, serde_json::Error> {
    let mut value = serde_json::to_value(command)?;
    if let Value::Object(map) = &mut value {
        map.insert("roomId".into(), Value::String(room_id.to_string()));
        if let Some(user) = user_identifier {
            map.insert("userIdentifier".into(), serde_json::to_value(user)?);
        }
        if let ClientToServer::PlayCard { card_number } = command {
            let mut data = json!({ "roomId": room_id, "cardNumber": card_number });
            if let (Some(user), Value::Object(nested)) = (user_identifier, &mut data) {
                nested.insert("userIdentifier".into(), serde_json::to_value(user)?);
            }
            map.insert("data".into(), data);
        }
    }
    serde_json::to_string(&value)
}

/// ---- Server → Client ----
#[derive(Debug, Clone, PartialEq)]
pub enum ServerToClient {
    StateUpdate(Box<RoomSnapshot>),
    Chat(ChatPayload),
    Error { message: String },
    SelectRowPrompt,
    RowSelected { row_index: Option<usize> },
    CardsPlaced,
    Other(String),
}

/// A chat frame before sender resolution; the backend has used several
/// field layouts over time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatPayload {
    pub sender: Option<UserId>,
    pub text: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame has no `type` field")]
    MissingType,
    #[error("`{0}` frame carries no room state")]
    MissingState(String),
}

const UNKNOWN_SERVER_ERROR: &str = "unknown server error";

pub fn decode_server_message(text: &str) -> Result<ServerToClient, DecodeError> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(frame) = value else {
        return Err(DecodeError::MissingType);
    };
    let kind = frame
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingType)?
        .to_string();

    let msg = match kind.as_str() {
        "gameStateUpdate" | "roomStateUpdate" => {
            let state = frame
                .get("roomState")
                .or_else(|| frame.get("data"))
                .filter(|v| v.is_object())
                .ok_or_else(|| DecodeError::MissingState(kind.clone()))?;
            let snapshot = RoomSnapshot::deserialize(state)?;
            ServerToClient::StateUpdate(Box::new(snapshot))
        }
        "chat" | "chatMessage" => ServerToClient::Chat(chat_payload(&frame)),
        "error" => ServerToClient::Error {
            message: frame
                .get("data")
                .and_then(Value::as_str)
                .or_else(|| frame.get("message").and_then(Value::as_str))
                .filter(|m| !m.is_empty())
                .unwrap_or(UNKNOWN_SERVER_ERROR)
                .to_string(),
        },
        "selectRow" | "needSelectRow" => ServerToClient::SelectRowPrompt,
        "rowSelected" => ServerToClient::RowSelected {
            row_index: frame
                .get("rowIndex")
                .and_then(Value::as_u64)
                .and_then(|i| usize::try_from(i).ok()),
        },
        "cardsPlaced" | "roundSettlement" => ServerToClient::CardsPlaced,
        _ => ServerToClient::Other(kind),
    };
    Ok(msg)
}

fn chat_payload(frame: &Map<String, Value>) -> ChatPayload {
    let nested = frame.get("data").and_then(Value::as_object);
    let field = |names: &[&str]| -> Option<&Value> {
        names
            .iter()
            .find_map(|n| frame.get(*n).filter(|v| !v.is_null()))
            .or_else(|| nested.and_then(|d| names.iter().find_map(|n| d.get(*n).filter(|v| !v.is_null()))))
    };
    let as_id = |v: &Value| serde_json::from_value::<UserId>(v.clone()).ok();

    ChatPayload {
        sender: field(&["sender", "userIdentifier"]).and_then(as_id),
        text: field(&["text", "content"])
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}
