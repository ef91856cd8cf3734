//! Data model of the Lingr API.
//!
//! Field names follow the JSON the service sends. Everything that the
//! service may omit is defaulted so a sparse payload still decodes.

use serde::{Deserialize, Serialize};

/// A bot attached to a room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bot {
    pub id: String,
    pub name: String,
    pub icon_url: String,
    pub status: String,
}

/// A human member of a room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Member {
    pub username: String,
    /// Display name.
    pub name: String,
    pub icon_url: String,
    pub is_owner: bool,
    pub is_online: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Roster {
    pub members: Vec<Member>,
    pub bots: Vec<Bot>,
}

impl Roster {
    pub fn member(&self, username: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.username == username)
    }

    pub fn member_mut(&mut self, username: &str) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| m.username == username)
    }
}

/// Snapshot of a room as returned by `room/show`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub blurb: Option<serde_json::Value>,
    pub roster: Roster,
    /// Recent messages, oldest first.
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    pub id: String,
    pub room: String,
    pub public_session_id: String,
    pub icon_url: String,
    /// `"user"` for people, `"bot"` for automated speakers.
    #[serde(rename = "type")]
    pub kind: String,
    pub speaker_id: String,
    pub nickname: String,
    pub text: String,
    pub timestamp: String,
    /// Set locally when the message was posted by our own session.
    #[serde(skip)]
    pub mine: bool,
}

impl Message {
    pub fn is_bot(&self) -> bool {
        self.kind == "bot"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Presence {
    pub room: String,
    pub public_session_id: String,
    pub icon_url: String,
    pub username: String,
    pub nickname: String,
    pub timestamp: String,
    /// `"online"` or `"offline"`.
    pub status: String,
    pub text: String,
}

impl Presence {
    pub fn is_online(&self) -> bool {
        self.status != "offline"
    }
}

/// A roster change (ownership granted or revoked). Not a join/leave.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Membership {
    pub icon_url: String,
    pub username: String,
    pub name: String,
    pub is_owner: bool,
    pub is_online: bool,
    pub pokeable: bool,
    pub timestamp: String,
    pub action: String,
    pub room: String,
    pub text: String,
}

/// One entry of the `events` array, exactly as it appears on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawEvent {
    pub event_id: i64,
    pub message: Option<Message>,
    pub presence: Option<Presence>,
    pub membership: Option<Membership>,
}

/// A decoded stream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Message(Message),
    Presence(Presence),
    Membership(Membership),
}

impl Event {
    /// Id of the room this event belongs to.
    pub fn room_id(&self) -> &str {
        match self {
            Event::Message(m) => &m.room,
            Event::Presence(p) => &p.room,
            Event::Membership(m) => &m.room,
        }
    }
}

impl RawEvent {
    /// Collapse the wire shape into an [`Event`]. Events carrying none of
    /// the known payloads yield `None`.
    pub fn into_event(self) -> Option<Event> {
        if let Some(message) = self.message {
            Some(Event::Message(message))
        } else if let Some(presence) = self.presence {
            Some(Event::Presence(presence))
        } else {
            self.membership.map(Event::Membership)
        }
    }
}

/// Result of a single `event/observe` round trip.
#[derive(Debug, Clone, Default)]
pub struct Observation {
    pub events: Vec<Event>,
    /// Counter reported by the service; 0 means "unchanged".
    pub counter: i64,
}

/// Identity data handed back by `session/create`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    pub session: String,
    pub nickname: String,
    pub public_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_message_event() {
        let raw: RawEvent = serde_json::from_str(
            r#"{"event_id": 42, "message": {"id": "m1", "room": "vim", "type": "bot",
                "speaker_id": "bot1", "text": "hi", "public_session_id": "p"}}"#,
        )
        .unwrap();
        assert_eq!(raw.event_id, 42);
        let Some(Event::Message(m)) = raw.into_event() else {
            panic!("expected message");
        };
        assert_eq!(m.id, "m1");
        assert!(m.is_bot());
        assert!(!m.mine);
    }

    #[test]
    fn decodes_presence_and_membership() {
        let presence: RawEvent = serde_json::from_str(
            r#"{"event_id": 1, "presence": {"room": "r", "username": "bob", "status": "offline"}}"#,
        )
        .unwrap();
        match presence.into_event() {
            Some(Event::Presence(p)) => assert!(!p.is_online()),
            other => panic!("unexpected {other:?}"),
        }

        let membership: RawEvent = serde_json::from_str(
            r#"{"event_id": 2, "membership": {"room": "r", "username": "bob", "is_owner": true}}"#,
        )
        .unwrap();
        let event = membership.into_event().unwrap();
        assert_eq!(event.room_id(), "r");
        assert!(matches!(event, Event::Membership(ref m) if m.is_owner));
    }

    #[test]
    fn empty_event_is_dropped() {
        let raw: RawEvent = serde_json::from_str(r#"{"event_id": 3}"#).unwrap();
        assert!(raw.into_event().is_none());
    }

    #[test]
    fn room_with_null_blurb_and_sparse_roster() {
        let room: Room = serde_json::from_str(
            r#"{"id": "vim", "name": "Vim", "blurb": null,
                "roster": {"members": [{"username": "alice", "is_owner": true}]}}"#,
        )
        .unwrap();
        assert_eq!(room.roster.members.len(), 1);
        assert!(room.roster.member("alice").unwrap().is_owner);
        assert!(room.roster.bots.is_empty());
        assert!(room.messages.is_empty());
    }
}
