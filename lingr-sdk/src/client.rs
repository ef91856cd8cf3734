//! HTTP/JSON client for the Lingr API.
//!
//! Every endpoint is a plain request/response pair; the only call that
//! blocks for long is [`LingrClient::observe`], which the service holds
//! open until new events arrive or its own idle timeout elapses.
//!
//! The client has no concurrency of its own. [`LingrClient::create_session`]
//! takes `&mut self`; every other call takes `&self`, so a client can be
//! shared behind an `Arc` once the session exists.

use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::{LingrError, Result};
use crate::types::{Message, Observation, RawEvent, Room, SessionInfo};

/// Public API endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://lingr.com/api/";

/// Long-poll calls are abandoned after this long even if the service
/// never answers.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// Credentials and transport options for a [`LingrClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL, with trailing slash.
    pub endpoint: String,
    pub user: String,
    pub password: String,
    pub api_key: String,
    /// Overall deadline for a single request.
    pub timeout: Duration,
    /// Log every response body before decoding.
    pub trace_bodies: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            user: String::new(),
            password: String::new(),
            api_key: String::new(),
            timeout: DEFAULT_TIMEOUT,
            trace_bodies: false,
        }
    }
}

#[derive(Deserialize)]
struct SessionReply {
    session: String,
    #[serde(default)]
    nickname: String,
    #[serde(default)]
    public_id: String,
}

#[derive(Deserialize)]
struct RoomIdsReply {
    #[serde(default)]
    rooms: Vec<String>,
}

#[derive(Deserialize)]
struct RoomsReply {
    #[serde(default)]
    rooms: Vec<Room>,
}

#[derive(Deserialize)]
struct SubscribeReply {
    #[serde(default)]
    counter: i64,
}

#[derive(Deserialize)]
struct ObserveReply {
    #[serde(default)]
    events: Vec<RawEvent>,
    #[serde(default)]
    counter: i64,
}

#[derive(Deserialize)]
struct ArchivesReply {
    #[serde(default)]
    messages: Vec<Message>,
}

#[derive(Deserialize)]
struct Empty {}

/// A Lingr API client bound to one user.
pub struct LingrClient {
    http: reqwest::Client,
    config: ClientConfig,
    session: Option<SessionInfo>,
}

impl LingrClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            config,
            session: None,
        })
    }

    /// Session established by the last successful [`create_session`](Self::create_session).
    pub fn session(&self) -> Option<&SessionInfo> {
        self.session.as_ref()
    }

    /// Public session id of our own identity; messages carrying it were
    /// posted by this client.
    pub fn public_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.public_id.as_str())
    }

    /// Authenticate and store the resulting session token.
    pub async fn create_session(&mut self) -> Result<&SessionInfo> {
        let form = [
            ("user", self.config.user.as_str()),
            ("password", self.config.password.as_str()),
            ("api_key", self.config.api_key.as_str()),
        ];
        let resp = self
            .http
            .post(self.url("session/create"))
            .form(&form)
            .send()
            .await?;
        let reply: SessionReply = self.decode("session/create", resp).await?;
        tracing::debug!(user = %self.config.user, nickname = %reply.nickname, "Lingr session created");
        Ok(self.session.insert(SessionInfo {
            session: reply.session,
            nickname: reply.nickname,
            public_id: reply.public_id,
        }))
    }

    /// Ids of every room the user belongs to, in service order.
    pub async fn get_rooms(&self) -> Result<Vec<String>> {
        let token = self.token()?;
        let reply: RoomIdsReply = self.get("user/get_rooms", &[("session", token)]).await?;
        Ok(reply.rooms)
    }

    /// Full snapshots (roster and recent messages) of the given rooms.
    pub async fn show_rooms(&self, room_ids: &[String]) -> Result<Vec<Room>> {
        let token = self.token()?;
        let rooms = room_ids.join(",");
        let reply: RoomsReply = self
            .get("room/show", &[("session", token), ("room", rooms.as_str())])
            .await?;
        Ok(reply.rooms)
    }

    /// Subscribe to the given rooms and return the stream counter to
    /// observe from. With `reset` the previous subscription is replaced.
    pub async fn subscribe(&self, room_ids: &[String], reset: bool) -> Result<i64> {
        let token = self.token()?;
        let rooms = room_ids.join(",");
        let reset = if reset { "true" } else { "false" };
        let reply: SubscribeReply = self
            .get(
                "room/subscribe",
                &[("session", token), ("room", rooms.as_str()), ("reset", reset)],
            )
            .await?;
        Ok(reply.counter)
    }

    pub async fn unsubscribe(&self, room_ids: &[String]) -> Result<()> {
        let token = self.token()?;
        let rooms = room_ids.join(",");
        let _: Empty = self
            .get("room/unsubscribe", &[("session", token), ("room", rooms.as_str())])
            .await?;
        Ok(())
    }

    /// Post `text` to a room under our remote nickname.
    pub async fn say(&self, room_id: &str, text: &str) -> Result<()> {
        let session = self.session.as_ref().ok_or(LingrError::NoSession)?;
        let _: Empty = self
            .get(
                "room/say",
                &[
                    ("session", session.session.as_str()),
                    ("room", room_id),
                    ("nickname", session.nickname.as_str()),
                    ("text", text),
                ],
            )
            .await?;
        Ok(())
    }

    /// Long-poll for events after `counter`.
    ///
    /// Messages posted by our own session come back with `mine` set.
    pub async fn observe(&self, counter: i64) -> Result<Observation> {
        let session = self.session.as_ref().ok_or(LingrError::NoSession)?;
        let counter_param = counter.to_string();
        let reply: ObserveReply = self
            .get(
                "event/observe",
                &[
                    ("session", session.session.as_str()),
                    ("counter", counter_param.as_str()),
                ],
            )
            .await?;
        let events = reply
            .events
            .into_iter()
            .filter_map(RawEvent::into_event)
            .map(|mut event| {
                if let crate::types::Event::Message(ref mut m) = event {
                    m.mine = !session.public_id.is_empty()
                        && m.public_session_id == session.public_id;
                }
                event
            })
            .collect();
        Ok(Observation {
            events,
            counter: reply.counter,
        })
    }

    /// Up to `limit` messages of a room older than `before` (a message id;
    /// empty for the most recent ones), oldest first.
    pub async fn get_archives(&self, room_id: &str, before: &str, limit: u32) -> Result<Vec<Message>> {
        let token = self.token()?;
        let limit = limit.to_string();
        let reply: ArchivesReply = self
            .get(
                "room/get_archives",
                &[
                    ("session", token),
                    ("room", room_id),
                    ("before", before),
                    ("limit", limit.as_str()),
                ],
            )
            .await?;
        Ok(reply.messages)
    }

    fn token(&self) -> Result<&str> {
        self.session
            .as_ref()
            .map(|s| s.session.as_str())
            .ok_or(LingrError::NoSession)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.endpoint)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, &str)]) -> Result<T> {
        let resp = self.http.get(self.url(path)).query(params).send().await?;
        self.decode(path, resp).await
    }

    /// Check HTTP and application status, then decode the body into `T`.
    async fn decode<T: DeserializeOwned>(&self, path: &str, resp: reqwest::Response) -> Result<T> {
        let resp = resp.error_for_status()?;
        let body = resp.text().await?;
        if self.config.trace_bodies {
            tracing::debug!(path, %body, "Lingr response");
        }
        let value: serde_json::Value = serde_json::from_str(&body)?;
        let status = value
            .get("status")
            .and_then(|s| s.as_str())
            .unwrap_or_default();
        if status != "ok" {
            let detail = value
                .get("detail")
                .or_else(|| value.get("code"))
                .and_then(|d| d.as_str())
                .unwrap_or_default()
                .to_string();
            return Err(LingrError::Status {
                status: status.to_string(),
                detail,
            });
        }
        Ok(serde_json::from_value(value)?)
    }
}
