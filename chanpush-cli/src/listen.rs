//! `chanpush listen`: the foreground client driven from stdin.

use std::sync::Arc;

use anyhow::Result;
use chanpush_sdk::channel::Channel;
use chanpush_sdk::client::{self, ClientConfig, ClientHandle};
use chanpush_sdk::error::ClientError;
use chanpush_sdk::event::Event;
use chanpush_sdk::notify::PermissionRequest;
use chanpush_sdk::permission::{PermissionState, PermissionStore};
use chanpush_sdk::push::{self, BackgroundPushListener};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::{Resolved, Session};
use crate::terminal::{self, TerminalNotifier, TerminalPrompt};

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Join(String),
    Channels,
    Notify,
    Answer(PermissionState),
    History,
    Quit,
    Send(String),
    Empty,
    Unknown(String),
}

impl Input {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Input::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Input::Send(line.to_string());
        };
        let (cmd, arg) = match rest.split_once(' ') {
            Some((cmd, arg)) => (cmd, arg.trim()),
            None => (rest, ""),
        };
        match cmd {
            "join" | "j" if !arg.is_empty() => Input::Join(arg.to_string()),
            "channels" | "list" => Input::Channels,
            "notify" => Input::Notify,
            "allow" => Input::Answer(PermissionState::Granted),
            "deny" => Input::Answer(PermissionState::Denied),
            "dismiss" => Input::Answer(PermissionState::Default),
            "history" => Input::History,
            "quit" | "q" => Input::Quit,
            _ => Input::Unknown(line.to_string()),
        }
    }
}

/// Run until `/quit`, end of input, or the client stops.
pub async fn run(resolved: Resolved, permissions: Arc<dyn PermissionStore>) -> Result<()> {
    let notifier = Arc::new(TerminalNotifier::new(resolved.bell));

    // The push listener shares only the notifier sink and the permission store.
    let push_task = resolved.push.then(|| {
        let mut listener = BackgroundPushListener::new(notifier.clone(), permissions.clone());
        if let Some(icon) = &resolved.icon {
            listener = listener.with_icon(icon.clone());
        }
        let task = push::subscribe(&resolved.server, listener);
        let abort = task.abort_handle();
        tokio::spawn(async move {
            match task.await {
                Ok(Ok(())) => tracing::info!("push subscription ended"),
                Ok(Err(e)) => tracing::warn!("push listener stopped: {e:#}"),
                Err(e) if e.is_cancelled() => {}
                Err(e) => tracing::warn!("push listener task failed: {e}"),
            }
        });
        abort
    });

    let (handle, mut events) = client::connect(
        ClientConfig {
            server_url: resolved.server.clone(),
        },
        notifier,
        permissions,
        Box::new(TerminalPrompt),
    );

    let mut pending = resolved.channel.clone();
    let mut channels: Vec<Channel> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match &event {
                    Event::Channels { channels: list } => {
                        channels = list.clone();
                        if let Some(channel) = pending.take() {
                            join(&handle, &channel).await;
                        }
                    }
                    Event::Connected { channel } => {
                        Session { channel: Some(channel.to_string()) }.save();
                    }
                    Event::Message(message) => println!("{}", terminal::format_message(message)),
                    _ => {}
                }
                if let Some(line) = terminal::describe(&event) {
                    eprintln!("{line}");
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_input(&handle, &channels, Input::parse(&line)).await {
                    break;
                }
            }
        }
    }

    let _ = handle.shutdown().await;
    if let Some(push) = push_task {
        push.abort();
    }
    Ok(())
}

async fn join(handle: &ClientHandle, channel: &str) {
    if let Err(e) = handle.select_channel(channel).await {
        tracing::warn!(%channel, "can't join: {e}");
    }
}

/// Returns false on `/quit`.
async fn handle_input(handle: &ClientHandle, channels: &[Channel], input: Input) -> bool {
    match input {
        Input::Join(channel) => join(handle, &channel).await,
        Input::Channels => {
            let names: Vec<&str> = channels.iter().map(|c| c.as_str()).collect();
            eprintln!("Channels: {}", names.join(", "));
        }
        Input::Notify => match handle.request_permission().await {
            Ok(PermissionRequest::Prompted) => {}
            Ok(PermissionRequest::AlreadyDecided(state)) => {
                eprintln!("Notification permission already {state}");
            }
            Err(e) => eprintln!("{e}"),
        },
        Input::Answer(answer) => {
            if let Err(e) = handle.resolve_permission(answer).await {
                eprintln!("{e}");
            }
        }
        Input::History => match handle.snapshot().await {
            Ok(messages) if messages.is_empty() => eprintln!("No messages yet"),
            Ok(messages) => {
                for message in &messages {
                    println!("{}", terminal::format_message(message));
                }
            }
            Err(e) => eprintln!("{e}"),
        },
        Input::Send(text) => match handle.send(&text).await {
            Ok(()) => {}
            Err(ClientError::NotConnected) => eprintln!("Not connected; /join a channel first"),
            Err(e) => eprintln!("{e}"),
        },
        Input::Unknown(line) => eprintln!("Unknown command: {line}"),
        Input::Empty => {}
        Input::Quit => return false,
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_text() {
        assert_eq!(Input::parse("/join tech"), Input::Join("tech".into()));
        assert_eq!(Input::parse("  /j  news "), Input::Join("news".into()));
        assert_eq!(Input::parse("/allow"), Input::Answer(PermissionState::Granted));
        assert_eq!(Input::parse("/deny"), Input::Answer(PermissionState::Denied));
        assert_eq!(Input::parse("/quit"), Input::Quit);
        assert_eq!(Input::parse("hello there"), Input::Send("hello there".into()));
        assert_eq!(Input::parse("   "), Input::Empty);
    }

    #[test]
    fn join_needs_a_channel() {
        assert_eq!(Input::parse("/join"), Input::Unknown("/join".into()));
        assert_eq!(Input::parse("/frobnicate"), Input::Unknown("/frobnicate".into()));
    }
}
