//! Gateway state and TCP listener.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::GatewayConfig;
use crate::connection;
use crate::transcript::TranscriptSink;

/// State shared by every client connection.
///
/// Per-session Lingr state lives on the connection itself; sessions never
/// see each other.
pub struct SharedState {
    pub config: GatewayConfig,
    /// Present when `--logpath` is set.
    pub transcript: Option<TranscriptSink>,
}

/// The IRC-facing listener.
pub struct Gateway {
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    fn build_state(&self) -> Arc<SharedState> {
        let transcript = self.config.log_path.as_ref().map(|root| {
            tracing::info!("Writing transcripts under {}", root.display());
            TranscriptSink::spawn(root.clone())
        });
        Arc::new(SharedState {
            config: self.config.clone(),
            transcript,
        })
    }

    /// Run the gateway, blocking forever.
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        tracing::info!("Listening on {}", self.config.listen_addr);
        let state = self.build_state();
        accept_loop(listener, state).await
    }

    /// Bind and serve in the background. Returns the bound address, which
    /// is how tests find an ephemeral port.
    pub async fn start(self) -> Result<(SocketAddr, JoinHandle<Result<()>>)> {
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        let addr = listener.local_addr()?;
        tracing::info!("Listening on {addr}");

        let state = self.build_state();
        let handle = tokio::spawn(accept_loop(listener, state));
        Ok((addr, handle))
    }
}

async fn accept_loop(listener: TcpListener, state: Arc<SharedState>) -> Result<()> {
    loop {
        let (stream, _addr) = listener.accept().await?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = connection::handle(stream, state).await {
                tracing::error!("Connection error: {e}");
            }
        });
    }
}
