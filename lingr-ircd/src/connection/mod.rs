//! Per-client session.
//!
//! Each TCP connection gets a [`Connection`] that manages:
//! - registration (NICK/PASS/USER) and Lingr authentication
//! - the subscribed room set and its poller
//! - translating client commands into Lingr calls
//!
//! Commands are handled strictly one at a time. Stream events arrive
//! concurrently from the poller and are written through the same
//! outbound queue.
//!
//! The handler is split into submodules:
//! - `registration`: USER handling, authentication with retry
//! - `channel`: JOIN, PART, subscription and room announcement
//! - `messaging`: PRIVMSG, NOTICE
//! - `queries`: WHOIS

mod channel;
mod messaging;
mod queries;
mod registration;

use std::ops::ControlFlow;
use std::sync::Arc;

use anyhow::Result;
use lingr_sdk::LingrClient;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::bridge::{BridgeState, SharedBridge};
use crate::error::GatewayError;
use crate::irc::{self, Message};
use crate::poller::{PollContext, Poller};
use crate::server::SharedState;
use crate::translate::{Translator, closing_link};

/// Inbound lines longer than this are dropped without being buffered.
const MAX_LINE_LEN: usize = 8192;

/// Lifecycle of a session. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Active,
    Closed,
}

/// Lingr-side handles that exist once the session is active.
pub(crate) struct Remote {
    pub(crate) client: Arc<LingrClient>,
    pub(crate) translator: Arc<Translator>,
    pub(crate) poller: Option<Poller>,
}

/// State of a single client connection.
pub struct Connection {
    pub id: String,
    pub nick: Option<String>,
    pub(crate) password: Option<String>,
    pub state: SessionState,
    /// Replay room backlogs on join.
    pub(crate) backlog: bool,
    /// Rooms whose backlog has already been replayed.
    pub(crate) backlog_sent: std::collections::HashSet<String>,
    pub(crate) bridge: SharedBridge,
    pub(crate) remote: Option<Remote>,
    out: mpsc::Sender<String>,
}

impl Connection {
    fn new(id: String, out: mpsc::Sender<String>) -> Self {
        Self {
            id,
            nick: None,
            password: None,
            state: SessionState::Unauthenticated,
            backlog: false,
            backlog_sent: Default::default(),
            bridge: BridgeState::shared(),
            remote: None,
            out,
        }
    }

    pub(crate) fn nick_or_star(&self) -> &str {
        self.nick.as_deref().unwrap_or("*")
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Queue a line (without CRLF) for the client. Returns `false` once
    /// the writer has gone away.
    pub(crate) async fn send(&self, line: String) -> bool {
        self.out.send(line).await.is_ok()
    }

    pub(crate) async fn send_all(&self, lines: Vec<String>) {
        for line in lines {
            if !self.send(line).await {
                return;
            }
        }
    }

    pub(crate) fn poll_context(&self, state: &SharedState) -> Option<PollContext> {
        let remote = self.remote.as_ref()?;
        Some(PollContext {
            client: Arc::clone(&remote.client),
            bridge: Arc::clone(&self.bridge),
            translator: Arc::clone(&remote.translator),
            out: self.out.clone(),
            transcript: state.transcript.clone(),
            retry: state.config.poll_retry(),
            session_id: self.id.clone(),
        })
    }

    /// Cancel the current poller generation and wait for it to exit.
    pub(crate) async fn stop_poller(&mut self) {
        if let Some(poller) = self.remote.as_mut().and_then(|r| r.poller.take()) {
            let generation = poller.generation();
            poller.stop().await;
            tracing::debug!(session_id = %self.id, generation, "Poller cancelled");
        }
    }

    async fn close(&mut self) {
        self.stop_poller().await;
        self.remote = None;
        self.state = SessionState::Closed;
    }

    async fn reply(&self, state: &SharedState, command: &str, params: Vec<&str>) {
        let msg = Message::from_server(&state.config.server_name, command, params);
        self.send(msg.to_string()).await;
    }

    async fn not_registered(&self, state: &SharedState) {
        self.reply(
            state,
            irc::ERR_NOTREGISTERED,
            vec![self.nick_or_star(), "You have not registered"],
        )
        .await;
    }
}

/// Handle a plain TCP connection.
pub async fn handle(stream: TcpStream, state: Arc<SharedState>) -> Result<()> {
    let peer = stream.peer_addr()?;
    let session_id = format!("{peer}");
    tracing::info!(%session_id, "New connection");
    let (reader, writer) = tokio::io::split(stream);
    handle_io(BufReader::new(reader), writer, session_id, state).await
}

async fn handle_io<R, W>(
    mut reader: BufReader<R>,
    writer: W,
    session_id: String,
    state: Arc<SharedState>,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<String>(4096);
    let mut conn = Connection::new(session_id.clone(), tx);

    let write_session_id = session_id.clone();
    let mut write_half = writer;
    let write_handle = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if let Err(e) = write_line(&mut write_half, &line).await {
                tracing::warn!(session_id = %write_session_id, "Write error: {e}");
                break;
            }
            // Drain whatever else is queued before flushing.
            let mut batch_count = 0;
            while let Ok(queued) = rx.try_recv() {
                if let Err(e) = write_line(&mut write_half, &queued).await {
                    tracing::warn!(session_id = %write_session_id, "Write error: {e}");
                    return;
                }
                batch_count += 1;
                if batch_count >= 64 {
                    break;
                }
            }
            if let Err(e) = write_half.flush().await {
                tracing::warn!(session_id = %write_session_id, "Flush error: {e}");
                break;
            }
        }
    });

    let mut line_buf = Vec::new();
    loop {
        line_buf.clear();
        let limit = MAX_LINE_LEN as u64 + 1;
        match (&mut reader).take(limit).read_until(b'\n', &mut line_buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(%session_id, "Read error: {e}");
                break;
            }
        }
        if line_buf.len() > MAX_LINE_LEN {
            tracing::warn!(%session_id, "Line too long, dropping");
            if !line_buf.ends_with(b"\n") {
                match discard_line(&mut reader).await {
                    Ok(true) => {}
                    Ok(false) | Err(_) => break,
                }
            }
            conn.reply(
                &state,
                irc::ERR_INPUTTOOLONG,
                vec![conn.nick_or_star(), "Input line was too long"],
            )
            .await;
            continue;
        }

        let line = String::from_utf8_lossy(&line_buf);
        let Some(msg) = Message::parse(&line) else {
            continue;
        };
        if msg.command != "PASS" {
            tracing::debug!(%session_id, "<- {}", line.trim());
        }

        if dispatch(&mut conn, &msg, &state).await.is_break() {
            break;
        }
    }

    conn.close().await;
    tracing::info!(
        %session_id,
        nick = conn.nick.as_deref().unwrap_or("-"),
        "Connection closed"
    );
    // Dropping the connection closes the queue; the writer flushes what
    // is left and exits.
    drop(conn);
    let _ = write_handle.await;
    Ok(())
}

/// Skip the rest of an over-long line. Returns `false` at EOF.
async fn discard_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> std::io::Result<bool> {
    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            return Ok(false);
        }
        let (used, done) = match chunk.iter().position(|&b| b == b'\n') {
            Some(i) => (i + 1, true),
            None => (chunk.len(), false),
        };
        reader.consume(used);
        if done {
            return Ok(true);
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(w: &mut W, line: &str) -> std::io::Result<()> {
    w.write_all(line.as_bytes()).await?;
    w.write_all(b"\r\n").await
}

/// Log and drop a malformed command.
fn ignore(conn: &Connection, command: &str, reason: &'static str) -> ControlFlow<()> {
    let e = GatewayError::Parse {
        command: command.to_string(),
        reason,
    };
    tracing::debug!(session_id = %conn.id, "Ignoring command: {e}");
    ControlFlow::Continue(())
}

async fn dispatch(conn: &mut Connection, msg: &Message, state: &SharedState) -> ControlFlow<()> {
    match msg.command.as_str() {
        "NICK" => {
            let Some(nick) = msg.params.first().filter(|n| !n.is_empty()) else {
                return ignore(conn, "NICK", "missing nickname");
            };
            conn.nick = Some(nick.clone());
        }
        "PASS" => {
            let Some(password) = msg.params.first() else {
                return ignore(conn, "PASS", "missing password");
            };
            conn.password = Some(password.clone());
        }
        "USER" => {
            if conn.state != SessionState::Unauthenticated {
                conn.reply(
                    state,
                    irc::ERR_ALREADYREGISTERED,
                    vec![conn.nick_or_star(), "You may not reregister"],
                )
                .await;
                return ControlFlow::Continue(());
            }
            if msg.params.is_empty() {
                return ignore(conn, "USER", "missing username");
            }
            if conn.nick.is_none() || conn.password.is_none() {
                conn.reply(
                    state,
                    irc::ERR_NEEDMOREPARAMS,
                    vec![conn.nick_or_star(), "USER", "NICK and PASS are required first"],
                )
                .await;
                return ControlFlow::Continue(());
            }
            let wants_backlog = msg
                .params
                .last()
                .is_some_and(|opt| opt.contains("backlog"));
            conn.backlog = state.config.backlog || wants_backlog;

            if let Err(e) = registration::register(conn, state).await {
                tracing::warn!(session_id = %conn.id, nick = conn.nick_or_star(), "{e}");
                let line = closing_link(
                    conn.nick_or_star(),
                    &state.config.service_host,
                    "Authentication failed",
                );
                conn.send(line).await;
                return ControlFlow::Break(());
            }
        }
        "JOIN" | "PART" => {
            if !conn.is_active() {
                conn.not_registered(state).await;
                return ControlFlow::Continue(());
            }
            let Some(list) = msg.params.first() else {
                return ignore(conn, &msg.command, "missing room list");
            };
            if msg.command == "JOIN" {
                channel::handle_join(conn, list, state).await;
            } else {
                channel::handle_part(conn, list, state).await;
            }
        }
        "PRIVMSG" | "NOTICE" => {
            if !conn.is_active() {
                conn.not_registered(state).await;
                return ControlFlow::Continue(());
            }
            let [target, text, ..] = msg.params.as_slice() else {
                return ignore(conn, &msg.command, "missing target or text");
            };
            messaging::handle_privmsg(conn, target, text).await;
        }
        "PING" => {
            let token = msg.params.first().map(String::as_str).unwrap_or("");
            let server_name = state.config.server_name.as_str();
            conn.reply(state, "PONG", vec![server_name, token]).await;
        }
        "WHOIS" => {
            if !conn.is_active() {
                conn.not_registered(state).await;
                return ControlFlow::Continue(());
            }
            // WHOIS [server] nick
            let Some(target) = msg.params.last() else {
                return ignore(conn, "WHOIS", "missing nickname");
            };
            queries::handle_whois(conn, target).await;
        }
        "QUIT" => {
            let line = closing_link(
                conn.nick_or_star(),
                &state.config.service_host,
                "\"Client quit\"",
            );
            conn.send(line).await;
            return ControlFlow::Break(());
        }
        other => {
            tracing::debug!(session_id = %conn.id, command = other, "Unsupported command");
        }
    }
    ControlFlow::Continue(())
}
