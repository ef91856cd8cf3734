//! JOIN and PART: room-set changes, resubscription and announcement.

use std::collections::HashMap;

use lingr_sdk::LingrClient;
use lingr_sdk::types::{Message as LingrMessage, Room};

use super::Connection;
use crate::error::GatewayError;
use crate::poller::Poller;
use crate::server::SharedState;
use crate::translate::room_id_of;

fn room_ids(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(room_id_of).filter(|id| !id.is_empty())
}

pub(super) async fn handle_join(conn: &mut Connection, list: &str, state: &SharedState) {
    let previous = {
        let mut bridge = conn.bridge.lock();
        let previous = bridge.room_ids.clone();
        bridge.add_rooms(room_ids(list)).then_some(previous)
    };
    if let Some(previous) = previous {
        tracing::info!(session_id = %conn.id, rooms = list, "Subscribing");
        resubscribe(conn, state, previous).await;
    }
}

pub(super) async fn handle_part(conn: &mut Connection, list: &str, state: &SharedState) {
    let (previous, removed) = {
        let mut bridge = conn.bridge.lock();
        let previous = bridge.room_ids.clone();
        (previous, bridge.remove_rooms(room_ids(list)))
    };
    if removed.is_empty() {
        return;
    }
    tracing::info!(session_id = %conn.id, rooms = list, "Unsubscribing");
    if !resubscribe(conn, state, previous).await {
        return;
    }
    if let Some(remote) = conn.remote.as_ref()
        && let Err(e) = remote.client.unsubscribe(&removed).await
    {
        let e = GatewayError::Remote {
            op: "unsubscribe",
            source: e,
        };
        tracing::warn!(session_id = %conn.id, "{e}");
    }
}

/// Snapshot and subscribe to `room_ids`, resetting the stream counter.
///
/// An empty set still subscribes (dropping every previous subscription)
/// but skips the snapshot.
pub(super) async fn fetch_subscription(
    client: &LingrClient,
    room_ids: &[String],
) -> lingr_sdk::error::Result<(Vec<Room>, i64)> {
    let rooms = if room_ids.is_empty() {
        Vec::new()
    } else {
        client.show_rooms(room_ids).await?
    };
    let counter = client.subscribe(room_ids, true).await?;
    Ok((rooms, counter))
}

/// Replace the current subscription with one for the current room set.
///
/// On failure the room set goes back to `previous` and polling resumes on
/// the installed baseline, so the client sees no change at all. Returns
/// whether the new subscription took effect.
async fn resubscribe(conn: &mut Connection, state: &SharedState, previous: Vec<String>) -> bool {
    conn.stop_poller().await;
    let Some(client) = conn.remote.as_ref().map(|r| r.client.clone()) else {
        return false;
    };
    let ids = conn.bridge.lock().room_ids.clone();
    match fetch_subscription(&client, &ids).await {
        Ok((rooms, counter)) => {
            announce_and_poll(conn, state, rooms, counter).await;
            true
        }
        Err(e) => {
            let e = GatewayError::Remote {
                op: "subscribe",
                source: e,
            };
            tracing::warn!(session_id = %conn.id, "{e}");
            let generation = {
                let mut bridge = conn.bridge.lock();
                bridge.room_ids = previous;
                bridge.generation
            };
            start_poller(conn, state, generation);
            false
        }
    }
}

/// Install a new subscription baseline, announce every subscribed room
/// in join order, and start the poller generation for it.
pub(super) async fn announce_and_poll(conn: &mut Connection, state: &SharedState, rooms: Vec<Room>, counter: i64) {
    let Some(remote) = conn.remote.as_ref() else {
        return;
    };
    let translator = remote.translator.clone();
    let client = remote.client.clone();

    let mut backlogs: HashMap<String, Vec<LingrMessage>> = HashMap::new();
    if conn.backlog {
        for room in rooms.iter().filter(|r| !conn.backlog_sent.contains(&r.id)) {
            let messages = if room.messages.is_empty() {
                client
                    .get_archives(&room.id, "", state.config.backlog_limit)
                    .await
                    .unwrap_or_else(|e| {
                        tracing::warn!(session_id = %conn.id, room = %room.id, "Backlog fetch failed: {e}");
                        Vec::new()
                    })
            } else {
                room.messages.clone()
            };
            backlogs.insert(room.id.clone(), messages);
        }
    }

    let (generation, lines) = {
        let mut bridge = conn.bridge.lock();
        let generation = bridge.install(rooms, counter);
        let lines: Vec<String> = bridge
            .ordered_rooms()
            .flat_map(|room| {
                translator.announce_room(room, backlogs.get(&room.id).map(Vec::as_slice))
            })
            .collect();
        (generation, lines)
    };
    conn.backlog_sent.extend(backlogs.into_keys());
    conn.send_all(lines).await;

    start_poller(conn, state, generation);
}

/// Spawn a poller for `generation`. An empty room set is not polled.
fn start_poller(conn: &mut Connection, state: &SharedState, generation: u64) {
    if conn.bridge.lock().room_ids.is_empty() {
        return;
    }
    if let Some(ctx) = conn.poll_context(state)
        && let Some(remote) = conn.remote.as_mut()
    {
        remote.poller = Some(Poller::spawn(ctx, generation));
        tracing::debug!(session_id = %conn.id, generation, "Poller generation started");
    }
}
