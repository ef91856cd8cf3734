use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = lingr_ircd::config::GatewayConfig::parse();

    // JSON logs when LINGR_IRCD_LOG_JSON=1, human-readable otherwise
    let json_logs = std::env::var("LINGR_IRCD_LOG_JSON").unwrap_or_default() == "1";
    let level = if config.debug { "debug" } else { "info" };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("lingr_ircd={level}").parse()?)
        .add_directive(format!("lingr_sdk={level}").parse()?);
    if json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!("Starting Lingr gateway on {}", config.listen_addr);
    if !config.rooms.is_empty() {
        tracing::info!("Fixed rooms: {}", config.rooms.join(","));
    }
    let gateway = lingr_ircd::server::Gateway::new(config);
    gateway.run().await
}
