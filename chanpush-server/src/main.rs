use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs in production (CHANPUSH_LOG_JSON=1), human-readable otherwise
    let json_logs = std::env::var("CHANPUSH_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env().add_directive("chanpush_server=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .init();
    }

    let config = chanpush_server::config::ServerConfig::parse();
    tracing::info!("Starting chanpush server on {}", config.listen_addr);
    if config.channels.is_empty() {
        tracing::warn!("No channels configured; every subscription will be refused");
    }
    let server = chanpush_server::server::Server::new(config);
    server.run().await
}
