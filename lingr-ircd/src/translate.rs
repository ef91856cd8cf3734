//! Lingr ↔ IRC translation.
//!
//! Everything here is pure: functions take cached room data and return
//! the IRC lines (without CRLF) the client should see. The only state a
//! translator touches is the roster of the room it is handed, for
//! membership and presence changes.

use lingr_sdk::types::{Member, Membership, Message as LingrMessage, Presence, Room};

use crate::irc::{self, Message, mask};

/// Receives decoded stream events for a room the session is subscribed to.
pub trait EventHandler {
    fn on_message(&self, room: &Room, message: &LingrMessage) -> Vec<String>;
    fn on_presence(&self, room: &mut Room, presence: &Presence) -> Vec<String>;
    fn on_membership(&self, room: &mut Room, membership: &Membership) -> Vec<String>;
}

/// Split message text into wire-sized lines, trailing whitespace removed.
pub fn segments(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n').map(str::trim_end)
}

/// Room id without any leading channel markers.
pub fn room_id_of(channel: &str) -> &str {
    channel.trim_start_matches('#')
}

pub struct Translator {
    server_name: String,
    host: String,
    nick: String,
}

impl Translator {
    pub fn new(server_name: &str, host: &str, nick: &str) -> Self {
        Self {
            server_name: server_name.to_string(),
            host: host.to_string(),
            nick: nick.to_string(),
        }
    }

    pub fn nick(&self) -> &str {
        &self.nick
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn reply(&self, command: &str, params: Vec<&str>) -> String {
        Message::from_server(&self.server_name, command, params).to_string()
    }

    /// 001 and 376, sent once when the session becomes active.
    pub fn welcome(&self) -> Vec<String> {
        vec![
            self.reply(irc::RPL_WELCOME, vec![&self.nick, "Welcome to Lingr!"]),
            self.reply(irc::RPL_ENDOFMOTD, vec![&self.nick, "End of MOTD"]),
        ]
    }

    /// JOIN, topic and names for one room, followed by `backlog` as
    /// notices when given.
    pub fn announce_room(&self, room: &Room, backlog: Option<&[LingrMessage]>) -> Vec<String> {
        let channel = format!("#{}", room.id);
        let names = room
            .roster
            .members
            .iter()
            .map(|m| {
                if m.is_owner {
                    format!("@{}", m.username)
                } else {
                    m.username.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ");

        let mut lines = vec![
            format!(":{} JOIN {channel}", mask(&self.nick, &self.host)),
            self.reply(irc::RPL_TOPIC, vec![&self.nick, &channel, &room.name]),
            self.reply(irc::RPL_NAMREPLY, vec![&self.nick, "=", &channel, &names]),
            self.reply(irc::RPL_ENDOFNAMES, vec![&self.nick, &channel, "End of NAMES list."]),
        ];

        for message in backlog.unwrap_or_default() {
            let from = mask(&message.speaker_id, &self.host);
            for line in message.text.split('\n') {
                lines.push(format!(":{from} NOTICE {channel} :{}", line.trim()));
            }
        }
        lines
    }

    /// WHOIS lines for `target`, or nothing if no cached room lists them.
    pub fn whois<'a>(&self, rooms: impl IntoIterator<Item = &'a Room>, target: &str) -> Vec<String> {
        let mut member: Option<&Member> = None;
        let mut joined = Vec::new();
        for room in rooms {
            if let Some(m) = room.roster.member(target) {
                joined.push(if m.is_owner {
                    format!("@#{}", room.id)
                } else {
                    format!("#{}", room.id)
                });
                member = Some(m);
            }
        }
        let Some(member) = member else {
            return Vec::new();
        };

        let nick = self.nick.as_str();
        vec![
            self.reply(
                irc::RPL_WHOISUSER,
                vec![nick, target, target, &self.host, "*", &member.name],
            ),
            self.reply(irc::RPL_WHOISCHANNELS, vec![nick, target, &joined.join(" ")]),
            self.reply(
                irc::RPL_WHOISSERVER,
                vec![nick, target, &self.host, "San Francisco, US"],
            ),
            self.reply(irc::RPL_ENDOFWHOIS, vec![nick, target, "End of WHOIS list."]),
        ]
    }
}

/// Free-standing so it can be used before a translator exists.
pub fn closing_link(nick: &str, host: &str, reason: &str) -> String {
    format!("ERROR :Closing Link: {} ({reason})", mask(nick, host))
}

impl EventHandler for Translator {
    fn on_message(&self, room: &Room, message: &LingrMessage) -> Vec<String> {
        if message.mine {
            return Vec::new();
        }
        let command = if message.is_bot() { "NOTICE" } else { "PRIVMSG" };
        let from = mask(&message.speaker_id, &self.host);
        segments(&message.text)
            .map(|line| format!(":{from} {command} #{} :{line}", room.id))
            .collect()
    }

    fn on_presence(&self, room: &mut Room, presence: &Presence) -> Vec<String> {
        let online = presence.is_online();
        let Some(member) = room.roster.member_mut(&presence.username) else {
            return Vec::new();
        };
        member.is_online = online;

        let from = mask(&presence.username, &self.host);
        if !online {
            return vec![format!(":{from} PART #{}", room.id)];
        }
        let mut lines = vec![format!(":{from} JOIN #{}", room.id)];
        if member.is_owner {
            lines.push(format!(
                ":{from} MODE #{} +o {}",
                room.id, presence.username
            ));
        }
        lines
    }

    fn on_membership(&self, room: &mut Room, membership: &Membership) -> Vec<String> {
        match room.roster.member_mut(&membership.username) {
            Some(member) => member.is_owner = membership.is_owner,
            None => room.roster.members.push(Member {
                username: membership.username.clone(),
                name: membership.name.clone(),
                icon_url: membership.icon_url.clone(),
                is_owner: membership.is_owner,
                is_online: membership.is_online,
            }),
        }
        let mode = if membership.is_owner { "+o" } else { "-o" };
        vec![format!(
            ":{} MODE #{} {mode} {}",
            mask(&membership.username, &self.host),
            room.id,
            membership.username
        )]
    }
}
