//! Server state and listener.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;

/// A set of connected sockets that all receive the same text.
#[derive(Debug, Default)]
pub struct Fanout {
    members: Mutex<HashMap<u64, mpsc::Sender<String>>>,
}

impl Fanout {
    pub fn join(&self, session: u64, tx: mpsc::Sender<String>) {
        self.members.lock().insert(session, tx);
    }

    pub fn leave(&self, session: u64) {
        self.members.lock().remove(&session);
    }

    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.lock().is_empty()
    }

    /// Queue `text` for every member, without waiting on any of them.
    /// Fan-out order across members is unspecified; each member's own queue
    /// keeps broadcast order.
    ///
    /// A member whose queue is full or whose socket task has gone away is
    /// removed. Dropping its sender makes the socket task close the
    /// connection, so a slow subscriber is disconnected rather than silently
    /// missing messages. Returns how many members got `text`.
    pub fn broadcast(&self, text: &str) -> usize {
        let mut members = self.members.lock();
        let mut delivered = 0;
        members.retain(|session, tx| match tx.try_send(text.to_string()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(session, "subscriber queue full, disconnecting");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(session, "dropping closed member");
                false
            }
        });
        delivered
    }

    /// Remove every member. Their sockets are closed by the server side.
    pub fn disconnect_all(&self) -> usize {
        let mut members = self.members.lock();
        let count = members.len();
        members.clear();
        count
    }
}

/// Shared state accessible by all connection handlers.
#[derive(Debug)]
pub struct SharedState {
    /// Channel names in the order `GET /channels/` reports them.
    pub channels: Vec<String>,
    /// Per-channel subscribers. Keys are fixed at startup.
    pub subscriptions: HashMap<String, Fanout>,
    /// Sockets connected by client id rather than channel.
    pub room: Fanout,
    /// Background push listeners.
    pub push_listeners: Fanout,
    pub socket_queue: usize,
    next_session: AtomicU64,
}

impl SharedState {
    pub fn new(config: &ServerConfig) -> Self {
        let mut channels = Vec::new();
        for name in &config.channels {
            let name = name.trim();
            if !name.is_empty() && !channels.iter().any(|c: &String| c == name) {
                channels.push(name.to_string());
            }
        }
        let subscriptions = channels
            .iter()
            .map(|c| (c.clone(), Fanout::default()))
            .collect();
        Self {
            channels,
            subscriptions,
            room: Fanout::default(),
            push_listeners: Fanout::default(),
            socket_queue: config.socket_queue.max(1),
            next_session: AtomicU64::new(1),
        }
    }

    pub fn next_session_id(&self) -> u64 {
        self.next_session.fetch_add(1, Ordering::Relaxed)
    }

    pub fn channel(&self, name: &str) -> Option<&Fanout> {
        self.subscriptions.get(name)
    }

    /// Total sockets across channels, room and push listeners.
    pub fn connection_count(&self) -> usize {
        self.subscriptions.values().map(Fanout::len).sum::<usize>()
            + self.room.len()
            + self.push_listeners.len()
    }

    /// Close every socket: channel subscribers, the room and push listeners.
    pub fn disconnect_all(&self) -> usize {
        let closed = self
            .subscriptions
            .values()
            .map(Fanout::disconnect_all)
            .sum::<usize>()
            + self.room.disconnect_all()
            + self.push_listeners.disconnect_all();
        tracing::info!(closed, "disconnected all sockets");
        closed
    }
}

pub struct Server {
    config: ServerConfig,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    fn build_state(&self) -> Arc<SharedState> {
        let state = SharedState::new(&self.config);
        tracing::info!(channels = ?state.channels, "serving channels");
        Arc::new(state)
    }

    /// Serve until Ctrl-C, then close every open socket.
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        tracing::info!("HTTP/WebSocket listener on {}", self.config.listen_addr);
        let state = self.build_state();
        let app = crate::web::router(Arc::clone(&state), &self.config);
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("shutting down");
                state.disconnect_all();
            })
            .await?;
        Ok(())
    }

    /// Start serving in the background (for testing).
    /// Returns the bound address, so `listen_addr` may use port 0.
    pub async fn start(self) -> Result<(SocketAddr, Arc<SharedState>, JoinHandle<Result<()>>)> {
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        let addr = listener.local_addr()?;
        tracing::info!("Listening on {addr}");

        let state = self.build_state();
        let app = crate::web::router(Arc::clone(&state), &self.config);
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await?;
            Ok(())
        });
        Ok((addr, state, handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_keep_order_and_drop_duplicates() {
        let config = ServerConfig {
            channels: vec![
                "news".into(),
                " general ".into(),
                "news".into(),
                "".into(),
            ],
            ..Default::default()
        };
        let state = SharedState::new(&config);
        assert_eq!(state.channels, ["news", "general"]);
        assert!(state.channel("general").is_some());
        assert!(state.channel("sports").is_none());
    }

    #[tokio::test]
    async fn fanout_reaches_every_member_and_prunes_closed() {
        let fanout = Fanout::default();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, rx2) = mpsc::channel(4);
        fanout.join(1, tx1);
        fanout.join(2, tx2);
        drop(rx2);

        assert_eq!(fanout.broadcast("hello"), 1);
        assert_eq!(rx1.recv().await.as_deref(), Some("hello"));
        assert_eq!(fanout.len(), 1);
    }

    #[tokio::test]
    async fn slow_member_is_disconnected_without_stalling_others() {
        let fanout = Fanout::default();
        let (slow_tx, mut slow_rx) = mpsc::channel(1);
        let (fast_tx, mut fast_rx) = mpsc::channel(8);
        fanout.join(1, slow_tx);
        fanout.join(2, fast_tx);

        assert_eq!(fanout.broadcast("one"), 2);
        // The slow member never drained "one", so "two" does not fit.
        assert_eq!(fanout.broadcast("two"), 1);
        assert_eq!(fanout.len(), 1);

        assert_eq!(fast_rx.recv().await.as_deref(), Some("one"));
        assert_eq!(fast_rx.recv().await.as_deref(), Some("two"));
        assert_eq!(slow_rx.recv().await.as_deref(), Some("one"));
        // Its sender is gone, which is what closes the socket.
        assert_eq!(slow_rx.recv().await, None);
    }

    #[tokio::test]
    async fn disconnect_all_drops_every_sender() {
        let state = SharedState::new(&ServerConfig::default());
        let (tx, mut rx) = mpsc::channel(4);
        state.channel("general").unwrap().join(1, tx);
        let (push_tx, mut push_rx) = mpsc::channel(4);
        state.push_listeners.join(2, push_tx);

        assert_eq!(state.disconnect_all(), 2);
        assert_eq!(state.connection_count(), 0);
        assert_eq!(rx.recv().await, None);
        assert_eq!(push_rx.recv().await, None);
    }

    #[test]
    fn session_ids_are_unique() {
        let state = SharedState::new(&ServerConfig::default());
        let a = state.next_session_id();
        let b = state.next_session_id();
        assert_ne!(a, b);
    }
}
