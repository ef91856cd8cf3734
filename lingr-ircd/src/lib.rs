//! IRC gateway onto Lingr chat rooms.
//!
//! Each IRC client gets its own Lingr session: the client's NICK and PASS
//! are the Lingr credentials, subscribed rooms appear as `#room` channels,
//! and the Lingr event stream is long-polled and replayed as IRC traffic.

pub mod bridge;
pub mod config;
pub mod connection;
pub mod error;
pub mod irc;
pub mod poller;
pub mod server;
pub mod transcript;
pub mod translate;
