//! Minimal IRC line codec and the numeric replies the gateway emits.

use std::fmt;

pub const RPL_WELCOME: &str = "001";
pub const RPL_WHOISUSER: &str = "311";
pub const RPL_WHOISSERVER: &str = "312";
pub const RPL_ENDOFWHOIS: &str = "318";
pub const RPL_WHOISCHANNELS: &str = "319";
pub const RPL_TOPIC: &str = "332";
pub const RPL_NAMREPLY: &str = "353";
pub const RPL_ENDOFNAMES: &str = "366";
pub const RPL_ENDOFMOTD: &str = "376";
pub const ERR_INPUTTOOLONG: &str = "417";
pub const ERR_NOTREGISTERED: &str = "451";
pub const ERR_NEEDMOREPARAMS: &str = "461";
pub const ERR_ALREADYREGISTERED: &str = "462";

/// One IRC protocol line.
///
/// Message tags are accepted on input and discarded; the gateway never
/// emits them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub prefix: Option<String>,
    /// Upper-cased command or three-digit numeric.
    pub command: String,
    pub params: Vec<String>,
}

impl Message {
    /// Parse a raw line (with or without the trailing CRLF).
    ///
    /// Returns `None` for blank lines and lines with no command.
    pub fn parse(line: &str) -> Option<Message> {
        let mut rest = line.trim_end_matches(['\r', '\n']).trim_start();
        if let Some(tagged) = rest.strip_prefix('@') {
            rest = tagged.split_once(' ').map(|(_, r)| r.trim_start())?;
        }
        let prefix = match rest.strip_prefix(':') {
            Some(p) => {
                let (prefix, r) = p.split_once(' ')?;
                rest = r.trim_start();
                Some(prefix.to_string())
            }
            None => None,
        };

        let (command, mut rest) = match rest.split_once(' ') {
            Some((c, r)) => (c, r),
            None => (rest, ""),
        };
        if command.is_empty() {
            return None;
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((p, r)) => {
                    params.push(p.to_string());
                    rest = r;
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        Some(Message {
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    /// A reply originating from the gateway itself.
    pub fn from_server(server_name: &str, command: &str, params: Vec<&str>) -> Message {
        Message {
            prefix: Some(server_name.to_string()),
            command: command.to_string(),
            params: params.into_iter().map(str::to_string).collect(),
        }
    }
}

/// Renders without CRLF. The last parameter is always written in
/// trailing form.
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref prefix) = self.prefix {
            write!(f, ":{prefix} ")?;
        }
        f.write_str(&self.command)?;
        if let Some((last, middle)) = self.params.split_last() {
            for p in middle {
                write!(f, " {p}")?;
            }
            write!(f, " :{last}")?;
        }
        Ok(())
    }
}

/// `name!name@host`: remote users have no separate user or host part.
pub fn mask(name: &str, host: &str) -> String {
    format!("{name}!{name}@{host}")
}
