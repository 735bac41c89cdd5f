use serde::{Deserialize, Serialize};
use take6_protocol::{PlayerRecord, Roster, UserId};
use tracing::warn;

/// Everything the client knows about the logged-in user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalIdentity {
    pub id: Option<UserId>,
    pub session_id: Option<String>,
    pub username: Option<String>,
    pub display_name: Option<String>,
}

impl LocalIdentity {
    pub fn with_id(id: impl Into<UserId>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    fn primary_id(&self) -> Option<&UserId> {
        self.id.as_ref().filter(|id| !id.is_blank())
    }

    /// Forwarded verbatim as `userIdentifier`: id, else username, else name.
    pub fn user_identifier(&self) -> Option<UserId> {
        self.primary_id().cloned().or_else(|| {
            self.username
                .as_deref()
                .or(self.display_name.as_deref())
                .filter(|s| !s.is_empty())
                .map(UserId::from)
        })
    }

    /// Does `sender` (a chat sender or similar raw id) refer to this user?
    pub fn is(&self, sender: &UserId) -> bool {
        self.primary_id().is_some_and(|id| id == sender)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchedBy {
    PrimaryId,
    SessionId,
    DisplayName,
}

#[derive(Debug, Clone, Copy)]
pub struct Resolved<'a> {
    pub index: usize,
    pub key: &'a str,
    pub record: &'a PlayerRecord,
    pub by: MatchedBy,
}

/// Finds the local user's record. Precedence is strict and applies across
/// the whole roster: any id match beats any session match, which beats any
/// name match. Names are only compared against records without an id.
pub fn resolve<'a>(me: &LocalIdentity, roster: &'a Roster) -> Option<Resolved<'a>> {
    let entries = || roster.entries().enumerate();
    let found = |by: MatchedBy, pred: &dyn Fn(&PlayerRecord) -> bool| {
        entries()
            .find(|(_, (_, record))| pred(record))
            .map(|(index, (key, record))| Resolved { index, key, record, by })
    };

    let hit = me
        .primary_id()
        .and_then(|id| found(MatchedBy::PrimaryId, &|r| r.primary_ids().any(|rid| rid == id)))
        .or_else(|| {
            let sid = me.session_id.as_deref().filter(|s| !s.is_empty())?;
            found(MatchedBy::SessionId, &|r| r.session_id.as_deref() == Some(sid))
        })
        .or_else(|| {
            let name = me.display_name.as_deref().filter(|s| !s.is_empty())?;
            found(MatchedBy::DisplayName, &|r| {
                !r.has_primary_id() && r.name() == Some(name)
            })
        });

    if hit.is_none() && !roster.is_empty() {
        let ids: Vec<String> = roster
            .records()
            .map(|r| {
                r.played_key()
                    .or_else(|| r.name().map(str::to_string))
                    .unwrap_or_else(|| "?".into())
            })
            .collect();
        warn!(me = ?me.user_identifier(), roster = ?ids, "local user not found in roster");
    }
    hit
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(json: &str) -> PlayerRecord {
        serde_json::from_str(json).unwrap()
    }

    fn roster(records: &[&str]) -> Roster {
        Roster::from_records(records.iter().map(|r| record(r)).collect())
    }

    #[test]
    fn numeric_and_string_ids_match() {
        let r = roster(&[r#"{"id": "8"}"#, r#"{"userId": 7}"#]);
        let hit = resolve(&LocalIdentity::with_id("7"), &r).unwrap();
        assert_eq!(hit.index, 1);
        assert_eq!(hit.by, MatchedBy::PrimaryId);
    }

    #[test]
    fn id_match_beats_earlier_name_match() {
        let r = roster(&[r#"{"nickname": "alice"}"#, r#"{"id": 3, "nickname": "someone"}"#]);
        let me = LocalIdentity::with_id(3).named("alice");
        let hit = resolve(&me, &r).unwrap();
        assert_eq!(hit.index, 1);
        assert_eq!(hit.by, MatchedBy::PrimaryId);
    }

    #[test]
    fn session_id_is_second_choice() {
        let r = roster(&[r#"{"id": 1}"#, r#"{"sessionId": "s-2"}"#]);
        let me = LocalIdentity::with_id(99).with_session("s-2");
        let hit = resolve(&me, &r).unwrap();
        assert_eq!((hit.index, hit.by), (1, MatchedBy::SessionId));
    }

    #[test]
    fn name_never_matches_a_record_with_an_id() {
        let r = roster(&[r#"{"id": 4, "displayName": "bob"}"#]);
        assert!(resolve(&LocalIdentity::default().named("bob"), &r).is_none());

        let r = roster(&[r#"{"displayName": "bob"}"#]);
        let hit = resolve(&LocalIdentity::default().named("bob"), &r).unwrap();
        assert_eq!(hit.by, MatchedBy::DisplayName);
    }

    #[test]
    fn no_match_is_not_position_zero() {
        let r = roster(&[r#"{"id": 1}"#, r#"{"id": 2}"#]);
        assert!(resolve(&LocalIdentity::with_id(5), &r).is_none());
    }

    #[test]
    fn user_identifier_prefers_id() {
        let mut me = LocalIdentity::default().named("nick");
        assert_eq!(me.user_identifier(), Some(UserId::from("nick")));
        me.username = Some("user".into());
        assert_eq!(me.user_identifier(), Some(UserId::from("user")));
        me.id = Some(UserId::Number(12));
        assert_eq!(me.user_identifier(), Some(UserId::Number(12)));
    }
}
