//! WHOIS, answered from cached room rosters.

use super::Connection;

pub(super) async fn handle_whois(conn: &Connection, target: &str) {
    let Some(remote) = conn.remote.as_ref() else {
        return;
    };
    let lines = {
        let bridge = conn.bridge.lock();
        remote.translator.whois(bridge.ordered_rooms(), target)
    };
    conn.send_all(lines).await;
}
