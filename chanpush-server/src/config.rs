//! Server configuration.

use clap::Parser;

/// Channels served when none are configured.
pub const DEFAULT_CHANNELS: &[&str] = &["general", "sports", "news", "tech"];

#[derive(Debug, Clone, Parser)]
#[command(name = "chanpush-server", about = "Channel broadcast server with push relay")]
pub struct ServerConfig {
    /// Address to listen on for HTTP and websockets.
    #[arg(long, env = "CHANPUSH_LISTEN", default_value = "127.0.0.1:8000")]
    pub listen_addr: String,

    /// Comma-separated channel list, in the order clients should see it.
    #[arg(
        long,
        env = "CHANPUSH_CHANNELS",
        value_delimiter = ',',
        default_value = "general,sports,news,tech"
    )]
    pub channels: Vec<String>,

    /// Allow cross-origin requests from anywhere.
    #[arg(long, env = "CHANPUSH_CORS_ANY", default_value_t = true, action = clap::ArgAction::Set)]
    pub cors_any: bool,

    /// Outbound queue depth per connected socket.
    #[arg(long, default_value_t = 64)]
    pub socket_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8000".to_string(),
            channels: DEFAULT_CHANNELS.iter().map(|c| c.to_string()).collect(),
            cors_any: true,
            socket_queue: 64,
        }
    }
}
