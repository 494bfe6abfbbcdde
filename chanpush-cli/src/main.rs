//! chanpush: follow one channel of a chanpush server from the terminal.

mod config;
mod listen;
mod terminal;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chanpush_sdk::channel::ChannelDirectory;
use chanpush_sdk::permission::{FilePermissionStore, PermissionState, PermissionStore};
use chanpush_sdk::push::{self, BackgroundPushListener};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, Resolved, Session};

#[derive(Parser, Debug)]
#[command(name = "chanpush", version, about = "Channel subscription client with notifications")]
pub struct Cli {
    /// Server HTTP origin (overrides the config file).
    #[arg(long, env = "CHANPUSH_SERVER", global = true)]
    server: Option<String>,

    /// Don't start the background push listener alongside `listen`.
    #[arg(long, global = true)]
    no_push: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the server's channel list.
    Channels,
    /// Follow a channel interactively.
    Listen {
        #[arg(long, short)]
        channel: Option<String>,
    },
    /// Run only the background push listener.
    PushListen,
    /// Broadcast a message to a channel through the server.
    Send {
        #[arg(long, short)]
        channel: String,
        #[arg(long, short)]
        message: String,
    },
    /// Inspect or change the stored notification permission.
    Permission {
        #[command(subcommand)]
        action: Option<PermissionAction>,
    },
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum PermissionAction {
    Show,
    /// Forget the decision so the next `/notify` prompts again.
    Reset,
    Allow,
    Deny,
}

impl Command {
    fn channel(&self) -> Option<&str> {
        match self {
            Command::Listen { channel } => channel.as_deref(),
            Command::Send { channel, .. } => Some(channel),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Ack {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout belongs to message output; logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let resolved = Resolved::merge(&cli, &Config::load(), &Session::load());
    let permissions = Arc::new(FilePermissionStore::default_location());

    match cli.command {
        Command::Channels => channels(&resolved.server).await,
        Command::Listen { .. } => listen::run(resolved, permissions).await,
        Command::PushListen => push_listen(&resolved, permissions).await,
        Command::Send { channel, message } => send(&resolved.server, &channel, &message).await,
        Command::Permission { action } => {
            permission(&permissions, action.unwrap_or(PermissionAction::Show))
        }
    }
}

async fn channels(server: &str) -> Result<()> {
    let list = ChannelDirectory::new(server).list_channels().await?;
    for channel in list {
        println!("{channel}");
    }
    Ok(())
}

async fn push_listen(resolved: &Resolved, permissions: Arc<FilePermissionStore>) -> Result<()> {
    if permissions.current() != PermissionState::Granted {
        eprintln!(
            "Notification permission is {}; pushes will be ignored until it is granted.",
            permissions.current()
        );
    }
    let notifier = Arc::new(terminal::TerminalNotifier::new(resolved.bell));
    let mut listener = BackgroundPushListener::new(notifier, permissions);
    if let Some(icon) = &resolved.icon {
        listener = listener.with_icon(icon.clone());
    }
    let task = push::subscribe(&resolved.server, listener);
    tokio::select! {
        res = task => res.context("push listener task failed")??,
        _ = tokio::signal::ctrl_c() => {}
    }
    Ok(())
}

async fn send(server: &str, channel: &str, message: &str) -> Result<()> {
    let url = format!("{}/send-message/", server.trim_end_matches('/'));
    let resp = reqwest::Client::new()
        .post(&url)
        .json(&serde_json::json!({ "channel": channel, "message": message }))
        .send()
        .await
        .with_context(|| format!("POST {url}"))?;
    let status = resp.status();
    if status.is_success() {
        let ack: Ack = resp.json().await?;
        println!("{}", ack.message);
        return Ok(());
    }
    match resp.json::<ErrorBody>().await {
        Ok(body) => bail!("{}: {}", status, body.detail),
        Err(_) => bail!("POST {url} returned {status}"),
    }
}

fn permission(store: &FilePermissionStore, action: PermissionAction) -> Result<()> {
    let target = match action {
        PermissionAction::Show => {
            println!("{} ({})", store.current(), store.path().display());
            return Ok(());
        }
        PermissionAction::Reset => PermissionState::Default,
        PermissionAction::Allow => PermissionState::Granted,
        PermissionAction::Deny => PermissionState::Denied,
    };
    store.set(target)?;
    println!("{target}");
    Ok(())
}
