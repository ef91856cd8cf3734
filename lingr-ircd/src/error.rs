//! Error taxonomy of a gateway session.
//!
//! None of these ever reach the IRC client as a protocol error: auth
//! failures close the link, remote failures are logged and the command
//! is dropped, poll failures are retried, and unparsable commands are
//! ignored.

use lingr_sdk::LingrError;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Session creation or initial subscription kept failing.
    #[error("authentication failed after {attempts} attempt(s): {source}")]
    Auth {
        attempts: u32,
        #[source]
        source: LingrError,
    },
    /// A direct command (say, subscribe, ...) was rejected.
    #[error("{op} failed: {source}")]
    Remote {
        op: &'static str,
        #[source]
        source: LingrError,
    },
    /// Long-poll transport failure; retried by the poller.
    #[error("observe failed: {0}")]
    TransientPoll(#[source] LingrError),
    /// Malformed or incomplete client command.
    #[error("bad {command}: {reason}")]
    Parse {
        command: String,
        reason: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, GatewayError>;
