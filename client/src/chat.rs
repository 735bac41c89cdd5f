use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use take6_protocol::{ChatPayload, UserId};

use crate::identity::LocalIdentity;
use crate::reconcile::PlayerView;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
    pub sender_id: Option<UserId>,
    pub sender: String,
    pub text: String,
    pub is_me: bool,
    pub received_at: DateTime<Utc>,
}

/// Append-only room chat, oldest entries dropped past `capacity`.
#[derive(Debug)]
pub struct ChatLog {
    entries: VecDeque<ChatEntry>,
    capacity: usize,
}

impl ChatLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            capacity: capacity.max(1),
        }
    }

    /// Normalizes an inbound chat frame and appends it. Frames without text
    /// are dropped.
    pub fn receive(
        &mut self,
        payload: ChatPayload,
        players: &[PlayerView],
        me: &LocalIdentity,
        at: DateTime<Utc>,
    ) -> Option<ChatEntry> {
        let text = payload.text.filter(|t| !t.trim().is_empty())?;
        let sender_id = payload.sender;
        let sender = match &sender_id {
            None => "Unknown".to_string(),
            Some(id) => players
                .iter()
                .find(|p| p.user_id.as_ref() == Some(id))
                .map(|p| p.name.clone())
                .or_else(|| {
                    me.is(id)
                        .then(|| me.display_name.clone().unwrap_or_else(|| "me".into()))
                })
                .unwrap_or_else(|| format!("Player {id}")),
        };
        let is_me = sender_id.as_ref().is_some_and(|id| me.is(id));

        let entry = ChatEntry { sender_id, sender, text, is_me, received_at: at };
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry.clone());
        Some(entry)
    }

    pub fn entries(&self) -> impl Iterator<Item = &ChatEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
