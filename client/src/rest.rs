use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use take6_protocol::RoomSnapshot;
use tracing::debug;
use url::Url;

use crate::config::ClientConfig;
use crate::error::ApiError;

const CODE_OK: i64 = 200;
const CODE_UNAUTHORIZED: i64 = 401;

/// `{code, message, data}` wrapper every REST response comes in.
#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Value,
}

impl Envelope {
    fn into_data(self) -> Result<Value, ApiError> {
        match self.code {
            CODE_OK => Ok(self.data),
            CODE_UNAUTHORIZED => Err(ApiError::Unauthorized),
            code => Err(ApiError::Server {
                code,
                message: self.message.unwrap_or_else(|| "request failed".into()),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoom {
    pub room_name: String,
    pub max_players: usize,
    pub is_private: bool,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_score: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rounds: Option<u32>,
}

/// REST collaborator for room setup and on-demand snapshots.
#[derive(Debug, Clone)]
pub struct HttpRoomApi {
    client: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl HttpRoomApi {
    pub fn new(base: Url, token: Option<String>) -> Self {
        Self { client: reqwest::Client::new(), base, token }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        Ok(Self::new(config.api_base()?, config.token.clone()))
    }

    /// Resolves `path` under the base, keeping any prefix the base carries.
    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base.join(path)?)
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        let url = self.endpoint(path)?;
        debug!(%url, "POST");
        let mut request = self.client.post(url).json(&body);
        if let Some(token) = &self.token {
            request = request.header("auth", token);
        }
        let envelope: Envelope = request.send().await?.json().await?;
        envelope.into_data()
    }

    pub async fn fetch_state(&self, room_id: &str) -> Result<RoomSnapshot, ApiError> {
        let data = self.post("api/game/state", json!({ "roomId": room_id })).await?;
        snapshot_from(data)
    }

    /// Returns the new room's id.
    pub async fn create_room(&self, room: &CreateRoom) -> Result<String, ApiError> {
        let data = self.post("api/room/create", serde_json::to_value(room)?).await?;
        room_id_from(&data).ok_or(ApiError::EmptyData)
    }

    pub async fn join_room(&self, room_id: &str, password: Option<&str>) -> Result<Value, ApiError> {
        let mut body = json!({ "roomId": room_id });
        if let Some(password) = password {
            body["password"] = Value::String(password.to_string());
        }
        self.post("api/room/join", body).await
    }

    pub async fn leave_room(&self, room_id: &str) -> Result<Value, ApiError> {
        self.post("api/room/leave", json!({ "roomId": room_id })).await
    }

    pub async fn set_ready(&self, room_id: &str, is_ready: bool) -> Result<Value, ApiError> {
        self.post("api/room/ready", json!({ "roomId": room_id, "isReady": is_ready }))
            .await
    }

    pub async fn start_game(&self, room_id: &str) -> Result<Value, ApiError> {
        self.post("api/room/start", json!({ "roomId": room_id })).await
    }

    pub async fn add_bots(&self, room_id: &str, count: usize) -> Result<Value, ApiError> {
        self.post("api/room/add-bots", json!({ "roomId": room_id, "count": count }))
            .await
    }
}

fn snapshot_from(data: Value) -> Result<RoomSnapshot, ApiError> {
    if data.is_null() {
        return Err(ApiError::EmptyData);
    }
    Ok(serde_json::from_value(data)?)
}

/// Create responses have carried `{roomId}`, `{id}` or the bare id.
fn room_id_from(data: &Value) -> Option<String> {
    let id = data
        .get("roomId")
        .or_else(|| data.get("id"))
        .unwrap_or(data);
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
