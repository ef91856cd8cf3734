//! Client SDK for the Lingr chat service.
//!
//! Lingr exposes a session-based HTTP/JSON API: authenticate once with
//! `session/create`, subscribe to a set of rooms, then long-poll
//! `event/observe` with a counter that marks how far into the event
//! stream the caller has read.

pub mod client;
pub mod error;
pub mod types;

pub use client::{ClientConfig, LingrClient};
pub use error::LingrError;
pub use types::{Event, Member, Membership, Message, Observation, Presence, Room, Roster};
