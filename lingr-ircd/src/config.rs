//! Gateway configuration.
//!
//! Parsed once in `main` and shared read-only with every connection.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "lingr-ircd", about = "IRC gateway for Lingr chat rooms")]
pub struct GatewayConfig {
    /// Address to accept IRC clients on.
    #[arg(long = "addr", default_value = "0.0.0.0:26667")]
    pub listen_addr: String,

    /// Lingr API key sent with every session creation.
    #[arg(long = "apikey", env = "LINGR_API_KEY", default_value = "")]
    pub api_key: String,

    /// Fixed room list (comma-separated). Skips room discovery when set.
    #[arg(long, value_delimiter = ',')]
    pub rooms: Vec<String>,

    /// Replay each room's recent messages as notices on join.
    #[arg(long)]
    pub backlog: bool,

    /// Log raw Lingr responses.
    #[arg(long)]
    pub debug: bool,

    /// Directory for per-room transcripts. Transcripts are off when unset.
    #[arg(long = "logpath")]
    pub log_path: Option<PathBuf>,

    /// Lingr API base URL.
    #[arg(long, default_value = lingr_sdk::client::DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Prefix used on numeric replies.
    #[arg(long, default_value = "lingr")]
    pub server_name: String,

    /// Host part of every user mask, and the network label in transcripts.
    #[arg(long, default_value = "lingr.com")]
    pub service_host: String,

    /// Delay between failed authentication attempts.
    #[arg(long, default_value_t = 1000)]
    pub auth_backoff_ms: u64,

    /// Authentication attempts before the connection is dropped.
    #[arg(long, default_value_t = 3)]
    pub auth_attempts: u32,

    /// Delay before re-polling after a failed observe.
    #[arg(long, default_value_t = 1000)]
    pub poll_retry_ms: u64,

    /// Messages fetched from the archive when a room snapshot has none.
    #[arg(long, default_value_t = 30)]
    pub backlog_limit: u32,

    /// Deadline for a single Lingr request, long-polls included.
    #[arg(long, default_value_t = 180)]
    pub request_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:26667".to_string(),
            api_key: String::new(),
            rooms: Vec::new(),
            backlog: false,
            debug: false,
            log_path: None,
            endpoint: lingr_sdk::client::DEFAULT_ENDPOINT.to_string(),
            server_name: "lingr".to_string(),
            service_host: "lingr.com".to_string(),
            auth_backoff_ms: 1000,
            auth_attempts: 3,
            poll_retry_ms: 1000,
            backlog_limit: 30,
            request_timeout_secs: 180,
        }
    }
}

impl GatewayConfig {
    pub fn auth_backoff(&self) -> Duration {
        Duration::from_millis(self.auth_backoff_ms)
    }

    pub fn poll_retry(&self) -> Duration {
        Duration::from_millis(self.poll_retry_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Configured rooms with empty entries and channel markers removed.
    pub fn fixed_rooms(&self) -> Vec<String> {
        self.rooms
            .iter()
            .map(|r| r.trim().trim_start_matches('#').to_string())
            .filter(|r| !r.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let config = GatewayConfig::parse_from([
            "lingr-ircd",
            "--addr",
            "127.0.0.1:7000",
            "--apikey",
            "K",
            "--rooms",
            "vim,#golang,",
            "--backlog",
        ]);
        assert_eq!(config.listen_addr, "127.0.0.1:7000");
        assert_eq!(config.api_key, "K");
        assert!(config.backlog);
        assert_eq!(config.fixed_rooms(), vec!["vim", "golang"]);
        assert_eq!(config.auth_attempts, 3);
        assert_eq!(config.poll_retry(), Duration::from_secs(1));
    }

    #[test]
    fn default_matches_cli_defaults() {
        let d = GatewayConfig::default();
        assert_eq!(d.server_name, "lingr");
        assert_eq!(d.service_host, "lingr.com");
        assert!(d.fixed_rooms().is_empty());
        assert!(d.log_path.is_none());
    }
}
