//! PRIVMSG and NOTICE: post client text to a Lingr room.

use super::Connection;
use crate::error::GatewayError;
use crate::translate::room_id_of;

pub(super) async fn handle_privmsg(conn: &Connection, target: &str, text: &str) {
    let Some(remote) = conn.remote.as_ref() else {
        return;
    };
    let room = room_id_of(target);
    let text = text.strip_prefix(':').unwrap_or(text);
    if room.is_empty() {
        tracing::debug!(session_id = %conn.id, "Message without a room, ignoring");
        return;
    }
    tracing::info!(session_id = %conn.id, %room, "Saying");
    if let Err(e) = remote.client.say(room, text).await {
        let e = GatewayError::Remote { op: "say", source: e };
        tracing::warn!(session_id = %conn.id, %room, "{e}");
    }
}
