//! State shared between a session's command loop and its poller.
//!
//! The command loop owns room-set changes; the poller advances the
//! counter, records seen message ids and edits cached rosters. Both go
//! through the one mutex in [`SharedBridge`], and neither holds it across
//! an `.await`.

use std::collections::VecDeque;
use std::sync::Arc;

use lingr_sdk::types::Room;
use parking_lot::Mutex;

/// Number of recent message ids remembered for duplicate suppression.
pub const DEDUP_CAPACITY: usize = 20;

pub type SharedBridge = Arc<Mutex<BridgeState>>;

/// Bounded recency set of message ids.
#[derive(Debug, Clone, Default)]
pub struct DedupWindow {
    ids: VecDeque<String>,
}

impl DedupWindow {
    /// Record `id`. Returns `false` if it was already in the window.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.ids.iter().any(|seen| seen == id) {
            return false;
        }
        if self.ids.len() == DEDUP_CAPACITY {
            self.ids.pop_front();
        }
        self.ids.push_back(id.to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct BridgeState {
    /// Subscribed room ids, in join order.
    pub room_ids: Vec<String>,
    /// Snapshots of the subscribed rooms, refreshed on every room-set change.
    pub rooms: Vec<Room>,
    /// Last observed position in the event stream.
    pub counter: i64,
    /// Bumped on every subscription; pollers from older generations must
    /// not touch this state.
    pub generation: u64,
    pub seen: DedupWindow,
}

impl BridgeState {
    pub fn shared() -> SharedBridge {
        Arc::new(Mutex::new(BridgeState::default()))
    }

    /// Add rooms not yet in the set. Returns whether anything was added.
    pub fn add_rooms<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) -> bool {
        let mut changed = false;
        for id in ids {
            if !id.is_empty() && !self.room_ids.iter().any(|r| r == id) {
                self.room_ids.push(id.to_string());
                changed = true;
            }
        }
        changed
    }

    /// Remove listed rooms. Returns the ids actually removed.
    pub fn remove_rooms<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let mut removed = Vec::new();
        for id in ids {
            if let Some(pos) = self.room_ids.iter().position(|r| r == id) {
                removed.push(self.room_ids.remove(pos));
            }
        }
        removed
    }

    /// Install a fresh subscription baseline and start a new generation.
    pub fn install(&mut self, rooms: Vec<Room>, counter: i64) -> u64 {
        self.rooms = rooms;
        self.counter = counter;
        self.generation += 1;
        self.generation
    }

    /// Apply a counter reported by observe. Returns `true` if the reply
    /// carries new stream positions and its events should be processed.
    ///
    /// 0 means "unchanged" and keeps the stored value. The stored counter
    /// never moves backwards.
    pub fn advance(&mut self, reported: i64) -> bool {
        if reported == 0 {
            return true;
        }
        if reported == self.counter {
            return false;
        }
        if reported > self.counter {
            self.counter = reported;
        } else {
            tracing::warn!(stored = self.counter, reported, "Ignoring counter regression");
        }
        true
    }

    pub fn room_mut(&mut self, id: &str) -> Option<&mut Room> {
        self.rooms.iter_mut().find(|r| r.id == id)
    }

    /// Cached rooms in subscription order.
    pub fn ordered_rooms(&self) -> impl Iterator<Item = &Room> {
        self.room_ids
            .iter()
            .filter_map(|id| self.rooms.iter().find(|r| &r.id == id))
    }
}
