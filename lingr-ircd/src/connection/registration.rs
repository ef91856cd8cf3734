//! Registration: authenticate against Lingr and enter the active state.

use std::sync::Arc;

use lingr_sdk::client::ClientConfig;
use lingr_sdk::types::Room;
use lingr_sdk::{LingrClient, LingrError};

use super::{Connection, Remote, SessionState, channel};
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::server::SharedState;
use crate::translate::Translator;

/// Result of one successful authentication attempt.
struct Established {
    client: LingrClient,
    room_ids: Vec<String>,
    rooms: Vec<Room>,
    counter: i64,
}

/// Run authentication with retry, then announce the initial rooms and
/// start polling.
///
/// On error the session is `Closed` and the caller should drop the link.
pub(super) async fn register(conn: &mut Connection, state: &SharedState) -> Result<(), GatewayError> {
    let config = &state.config;
    let nick = conn.nick.clone().unwrap_or_default();
    let password = conn.password.clone().unwrap_or_default();
    conn.state = SessionState::Authenticating;
    tracing::info!(session_id = %conn.id, %nick, "Connecting to Lingr");

    let mut attempts = 0;
    let established = loop {
        attempts += 1;
        match attempt(config, &nick, &password).await {
            Ok(established) => break established,
            Err(source) => {
                tracing::warn!(session_id = %conn.id, %nick, attempts, "Lingr login failed: {source}");
                if attempts >= config.auth_attempts.max(1) {
                    conn.state = SessionState::Closed;
                    return Err(GatewayError::Auth { attempts, source });
                }
                tokio::time::sleep(config.auth_backoff()).await;
            }
        }
    };

    let Established {
        client,
        room_ids,
        rooms,
        counter,
    } = established;
    tracing::info!(session_id = %conn.id, %nick, rooms = room_ids.len(), "Connected to Lingr");

    let translator = Translator::new(&config.server_name, &config.service_host, &nick);
    conn.send_all(translator.welcome()).await;
    conn.bridge.lock().add_rooms(room_ids.iter().map(String::as_str));
    conn.remote = Some(Remote {
        client: Arc::new(client),
        translator: Arc::new(translator),
        poller: None,
    });
    conn.state = SessionState::Active;

    channel::announce_and_poll(conn, state, rooms, counter).await;
    Ok(())
}

/// Create a session, resolve the room list and subscribe to it.
async fn attempt(config: &GatewayConfig, nick: &str, password: &str) -> Result<Established, LingrError> {
    let mut client = LingrClient::new(ClientConfig {
        endpoint: config.endpoint.clone(),
        user: nick.to_string(),
        password: password.to_string(),
        api_key: config.api_key.clone(),
        timeout: config.request_timeout(),
        trace_bodies: config.debug,
    })?;
    client.create_session().await?;

    let fixed = config.fixed_rooms();
    let room_ids = if fixed.is_empty() {
        client.get_rooms().await?
    } else {
        fixed
    };
    let (rooms, counter) = channel::fetch_subscription(&client, &room_ids).await?;
    Ok(Established {
        client,
        room_ids,
        rooms,
        counter,
    })
}
