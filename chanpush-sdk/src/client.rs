//! Client event loop.
//!
//! [`connect`] spawns one task that owns the [`ChannelSubscriptionManager`]
//! and handles UI commands and transport reports one at a time. Consumers
//! talk to it through a cloneable [`ClientHandle`] and read [`Event`]s from
//! the returned receiver.
//!
//! The SDK does not reconnect. After [`Event::ConnectionLost`] the consumer
//! decides whether to call [`ClientHandle::select_channel`] again.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::channel::{Channel, ChannelDirectory};
use crate::error::ClientError;
use crate::event::Event;
use crate::manager::ChannelSubscriptionManager;
use crate::notify::{NotificationDispatcher, Notifier, PermissionRequest};
use crate::permission::{PermissionPrompt, PermissionState, PermissionStore};
use crate::store::Message;
use crate::ws::WsConnector;

/// Configuration for a client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server HTTP origin, e.g. `http://localhost:8000`.
    pub server_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".to_string(),
        }
    }
}

/// Commands the consumer can send to the client.
#[derive(Debug)]
pub enum Command {
    SelectChannel {
        channel: Channel,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Send {
        text: String,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    RequestPermission {
        reply: oneshot::Sender<PermissionRequest>,
    },
    /// The user's answer to a permission prompt.
    ResolvePermission {
        answer: PermissionState,
        reply: oneshot::Sender<PermissionState>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<Message>>,
    },
    Shutdown,
}

/// A handle to a running client.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    cmd_tx: mpsc::Sender<Command>,
}

impl ClientHandle {
    async fn call<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(build(reply))
            .await
            .map_err(|_| ClientError::ClientGone)?;
        rx.await.map_err(|_| ClientError::ClientGone)
    }

    /// Subscribe to `channel`, closing the current subscription first.
    pub async fn select_channel(&self, channel: impl Into<Channel>) -> Result<(), ClientError> {
        let channel = channel.into();
        self.call(|reply| Command::SelectChannel { channel, reply })
            .await?
    }

    /// Send text on the active connection. Fails with
    /// [`ClientError::NotConnected`] unless it is open.
    pub async fn send(&self, text: &str) -> Result<(), ClientError> {
        let text = text.to_string();
        self.call(|reply| Command::Send { text, reply }).await?
    }

    pub async fn request_permission(&self) -> Result<PermissionRequest, ClientError> {
        self.call(|reply| Command::RequestPermission { reply }).await
    }

    pub async fn resolve_permission(
        &self,
        answer: PermissionState,
    ) -> Result<PermissionState, ClientError> {
        self.call(|reply| Command::ResolvePermission { answer, reply })
            .await
    }

    /// Messages received on the active channel, oldest first.
    pub async fn snapshot(&self) -> Result<Vec<Message>, ClientError> {
        self.call(|reply| Command::Snapshot { reply }).await
    }

    pub async fn shutdown(&self) -> Result<(), ClientError> {
        self.cmd_tx
            .send(Command::Shutdown)
            .await
            .map_err(|_| ClientError::ClientGone)
    }
}

/// Start a client.
///
/// The spawned task first fetches the channel list (once), then serves
/// commands until [`ClientHandle::shutdown`] or until every handle is dropped.
pub fn connect(
    config: ClientConfig,
    notifier: Arc<dyn Notifier>,
    permissions: Arc<dyn PermissionStore>,
    prompt: Box<dyn PermissionPrompt>,
) -> (ClientHandle, mpsc::Receiver<Event>) {
    let (event_tx, event_rx) = mpsc::channel(4096);
    let (cmd_tx, cmd_rx) = mpsc::channel(256);
    let (transport_tx, transport_rx) = mpsc::unbounded_channel();

    let dispatcher = NotificationDispatcher::new(notifier, permissions, prompt);
    let connector = WsConnector::new(&config.server_url, transport_tx);
    let manager = ChannelSubscriptionManager::new(Box::new(connector), dispatcher);
    let directory = ChannelDirectory::new(&config.server_url);

    tokio::spawn(async move {
        run_client(manager, directory, event_tx, cmd_rx, transport_rx).await;
    });

    (ClientHandle { cmd_tx }, event_rx)
}

async fn run_client(
    mut manager: ChannelSubscriptionManager,
    directory: ChannelDirectory,
    event_tx: mpsc::Sender<Event>,
    mut cmd_rx: mpsc::Receiver<Command>,
    mut transport_rx: mpsc::UnboundedReceiver<crate::connection::TransportEvent>,
) {
    manager.load_channels(directory.list_channels().await);
    flush(&mut manager, &event_tx).await;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    tracing::debug!("all client handles dropped");
                    break;
                };
                if !handle_command(&mut manager, cmd) {
                    break;
                }
            }
            Some(event) = transport_rx.recv() => {
                manager.handle_transport(event);
            }
        }
        flush(&mut manager, &event_tx).await;
    }

    manager.shutdown();
    flush(&mut manager, &event_tx).await;
    tracing::info!("client stopped");
}

/// Returns false when the loop should stop.
fn handle_command(manager: &mut ChannelSubscriptionManager, cmd: Command) -> bool {
    match cmd {
        Command::SelectChannel { channel, reply } => {
            let _ = reply.send(manager.select_channel(channel));
        }
        Command::Send { text, reply } => {
            let _ = reply.send(manager.send(&text));
        }
        Command::RequestPermission { reply } => {
            let _ = reply.send(manager.request_permission());
        }
        Command::ResolvePermission { answer, reply } => {
            let state = match manager.resolve_permission(answer) {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!("could not record permission answer: {e:#}");
                    manager.permission()
                }
            };
            let _ = reply.send(state);
        }
        Command::Snapshot { reply } => {
            let _ = reply.send(manager.snapshot().to_vec());
        }
        Command::Shutdown => return false,
    }
    true
}

async fn flush(manager: &mut ChannelSubscriptionManager, event_tx: &mpsc::Sender<Event>) {
    let pending: Vec<Event> = manager.drain_events().collect();
    for event in pending {
        // A consumer that stopped listening does not stop the client.
        let _ = event_tx.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::{CountingPrompt, RecordingNotifier};
    use crate::permission::MemoryPermissionStore;

    fn start(server_url: &str) -> (ClientHandle, mpsc::Receiver<Event>) {
        connect(
            ClientConfig {
                server_url: server_url.to_string(),
            },
            Arc::new(RecordingNotifier::default()),
            Arc::new(MemoryPermissionStore::default()),
            Box::new(CountingPrompt::default()),
        )
    }

    #[tokio::test]
    async fn unreachable_server_disables_selection() {
        let (handle, mut events) = start("http://127.0.0.1:9");
        match events.recv().await {
            Some(Event::ChannelListUnavailable { .. }) => {}
            other => panic!("expected ChannelListUnavailable, got {other:?}"),
        }
        assert!(matches!(
            handle.select_channel("general").await,
            Err(ClientError::ChannelListUnavailable(_))
        ));
        assert_eq!(handle.send("hi").await, Err(ClientError::NotConnected));
        assert!(handle.snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let (handle, mut events) = start("http://127.0.0.1:9");
        let _ = events.recv().await;
        handle.shutdown().await.unwrap();
        assert!(events.recv().await.is_none());
        assert_eq!(handle.snapshot().await, Err(ClientError::ClientGone));
    }

    #[tokio::test]
    async fn permission_round_trip_through_handle() {
        let (handle, _events) = start("http://127.0.0.1:9");
        assert_eq!(
            handle.request_permission().await.unwrap(),
            PermissionRequest::Prompted
        );
        assert_eq!(
            handle
                .resolve_permission(PermissionState::Granted)
                .await
                .unwrap(),
            PermissionState::Granted
        );
        assert_eq!(
            handle.request_permission().await.unwrap(),
            PermissionRequest::AlreadyDecided(PermissionState::Granted)
        );
    }
}
