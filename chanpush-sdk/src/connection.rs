//! One live connection to one channel, modelled as an explicit state machine.
//!
//! ```text
//! Connecting ──► Open ──► Closing ──► Closed
//!      │           │                    ▲
//!      └───────────┴────────────────────┘
//! ```
//!
//! The transport never calls back into a handle. It reports
//! [`TransportEvent`]s tagged with the handle's [`ConnectionId`], and the
//! owner applies them through the named transitions below. Tests drive the
//! same transitions without any socket.

use std::fmt;

use crate::channel::Channel;
use crate::error::ClientError;

/// Identifies one connection attempt. Never reused within a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl SocketState {
    /// Connecting or Open: the handle counts against the one-live-socket rule.
    pub fn is_live(self) -> bool {
        matches!(self, SocketState::Connecting | SocketState::Open)
    }
}

/// What a transport reports about a connection it is driving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake finished.
    Opened(ConnectionId),
    /// One inbound text frame.
    Frame(ConnectionId, String),
    /// The connection is gone, for whatever reason. Reported once.
    Closed { id: ConnectionId, reason: String },
}

impl TransportEvent {
    pub fn id(&self) -> ConnectionId {
        match self {
            TransportEvent::Opened(id) | TransportEvent::Frame(id, _) => *id,
            TransportEvent::Closed { id, .. } => *id,
        }
    }
}

/// Outbound side of a transport connection.
pub trait Link: Send {
    /// Queue a text frame. Fails with [`ClientError::NotConnected`] if the
    /// underlying connection has already gone away.
    fn send(&mut self, payload: &str) -> Result<(), ClientError>;

    /// Start the close handshake. Completion arrives later as
    /// [`TransportEvent::Closed`].
    fn close(&mut self);
}

/// Opens transport connections for the subscription manager.
pub trait Connector: Send {
    fn open(&mut self, id: ConnectionId, channel: &Channel) -> Box<dyn Link>;
}

pub struct ConnectionHandle {
    id: ConnectionId,
    channel: Channel,
    state: SocketState,
    link: Box<dyn Link>,
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("state", &self.state)
            .finish()
    }
}

impl ConnectionHandle {
    /// A freshly opened handle, waiting for the transport to confirm.
    pub fn new(id: ConnectionId, channel: Channel, link: Box<dyn Link>) -> Self {
        Self {
            id,
            channel,
            state: SocketState::Connecting,
            link,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn state(&self) -> SocketState {
        self.state
    }

    /// Connecting → Open. Returns false (and changes nothing) from any other
    /// state, e.g. when the handshake finishes after `close()` was called.
    pub fn mark_open(&mut self) -> bool {
        if self.state == SocketState::Connecting {
            self.state = SocketState::Open;
            tracing::debug!(conn = %self.id, channel = %self.channel, "connection open");
            true
        } else {
            false
        }
    }

    /// Gate for inbound payloads. Only an Open handle delivers; once Closing
    /// begins nothing more gets through.
    pub fn on_message(&self, payload: String) -> Option<String> {
        if self.state == SocketState::Open {
            Some(payload)
        } else {
            tracing::debug!(
                conn = %self.id,
                state = ?self.state,
                "dropping payload on non-open connection"
            );
            None
        }
    }

    pub fn send(&mut self, payload: &str) -> Result<(), ClientError> {
        if self.state != SocketState::Open {
            return Err(ClientError::NotConnected);
        }
        self.link.send(payload)
    }

    /// Open/Connecting → Closing. A no-op in Closing or Closed.
    pub fn close(&mut self) {
        if self.state.is_live() {
            tracing::debug!(conn = %self.id, channel = %self.channel, "closing connection");
            self.state = SocketState::Closing;
            self.link.close();
        }
    }

    /// Any state → Closed. Returns the state the handle was in, so the owner
    /// can tell a requested close (Closing) from a lost connection.
    pub fn mark_closed(&mut self) -> SocketState {
        let previous = self.state;
        self.state = SocketState::Closed;
        previous
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory transport for driving handles and the manager in tests.

    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Debug, Default)]
    pub struct LinkLog {
        pub sent: Vec<String>,
        pub close_calls: usize,
    }

    pub struct FakeLink {
        pub log: Arc<Mutex<LinkLog>>,
        pub broken: bool,
    }

    impl Link for FakeLink {
        fn send(&mut self, payload: &str) -> Result<(), ClientError> {
            if self.broken {
                return Err(ClientError::NotConnected);
            }
            self.log.lock().sent.push(payload.to_string());
            Ok(())
        }

        fn close(&mut self) {
            self.log.lock().close_calls += 1;
        }
    }

    /// Records every `open` so tests can inspect per-connection traffic.
    #[derive(Clone, Default)]
    pub struct FakeConnector {
        pub opened: Arc<Mutex<Vec<(ConnectionId, Channel, Arc<Mutex<LinkLog>>)>>>,
    }

    impl FakeConnector {
        pub fn log_for(&self, id: ConnectionId) -> Arc<Mutex<LinkLog>> {
            self.opened
                .lock()
                .iter()
                .find(|(i, _, _)| *i == id)
                .map(|(_, _, log)| log.clone())
                .expect("connection was never opened")
        }
    }

    impl Connector for FakeConnector {
        fn open(&mut self, id: ConnectionId, channel: &Channel) -> Box<dyn Link> {
            let log = Arc::new(Mutex::new(LinkLog::default()));
            self.opened.lock().push((id, channel.clone(), log.clone()));
            Box::new(FakeLink { log, broken: false })
        }
    }

    pub fn fake_handle(channel: &str) -> (ConnectionHandle, Arc<Mutex<LinkLog>>) {
        let log = Arc::new(Mutex::new(LinkLog::default()));
        let link = FakeLink {
            log: log.clone(),
            broken: false,
        };
        (
            ConnectionHandle::new(ConnectionId(1), Channel::new(channel), Box::new(link)),
            log,
        )
    }
}
