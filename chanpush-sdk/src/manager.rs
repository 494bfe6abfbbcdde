//! Channel subscription manager: owns the one live connection.
//!
//! Invariants kept here:
//! - at most one [`ConnectionHandle`] is Connecting or Open at any time;
//! - a superseded handle is told to close before its replacement opens;
//! - nothing a superseded handle receives reaches the [`MessageStore`].
//!
//! Superseded handles are kept in `draining` until the transport confirms
//! the close, so a late `Closed` is recognised and not mistaken for a lost
//! active connection.

use std::collections::VecDeque;

use crate::channel::Channel;
use crate::connection::{ConnectionHandle, ConnectionId, Connector, SocketState, TransportEvent};
use crate::error::ClientError;
use crate::event::Event;
use crate::notify::{NotificationDispatcher, PermissionRequest};
use crate::permission::PermissionState;
use crate::store::{Message, MessageStore};

pub struct ChannelSubscriptionManager {
    connector: Box<dyn Connector>,
    dispatcher: NotificationDispatcher,
    store: MessageStore,
    /// `None` until the channel list is loaded; stays `None` if that failed.
    channels: Option<Vec<Channel>>,
    active: Option<ConnectionHandle>,
    draining: Vec<ConnectionHandle>,
    next_id: u64,
    events: VecDeque<Event>,
}

impl ChannelSubscriptionManager {
    pub fn new(connector: Box<dyn Connector>, dispatcher: NotificationDispatcher) -> Self {
        Self {
            connector,
            dispatcher,
            store: MessageStore::new(),
            channels: None,
            active: None,
            draining: Vec::new(),
            next_id: 1,
            events: VecDeque::new(),
        }
    }

    /// Record the result of the one-time channel list fetch.
    pub fn load_channels(&mut self, result: Result<Vec<Channel>, ClientError>) {
        match result {
            Ok(channels) => {
                self.events.push_back(Event::Channels {
                    channels: channels.clone(),
                });
                self.channels = Some(channels);
            }
            Err(e) => {
                tracing::warn!("channel list unavailable: {e}");
                self.channels = None;
                self.events.push_back(Event::ChannelListUnavailable {
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Channels available for selection, in server order.
    pub fn list_channels(&self) -> Result<&[Channel], ClientError> {
        self.channels.as_deref().ok_or_else(|| {
            ClientError::ChannelListUnavailable("channel list not loaded".to_string())
        })
    }

    pub fn active(&self) -> Option<&ConnectionHandle> {
        self.active.as_ref()
    }

    pub fn active_channel(&self) -> Option<&Channel> {
        self.active.as_ref().map(ConnectionHandle::channel)
    }

    /// Handles that are Connecting or Open, draining ones included.
    pub fn live_connections(&self) -> usize {
        self.active
            .iter()
            .chain(self.draining.iter())
            .filter(|h| h.state().is_live())
            .count()
    }

    pub fn snapshot(&self) -> &[Message] {
        self.store.snapshot()
    }

    pub fn permission(&self) -> PermissionState {
        self.dispatcher.permission()
    }

    /// Switch to `channel`.
    ///
    /// The current handle is closed first and left to finish its handshake in
    /// the background. Reselecting the channel that is already Connecting or
    /// Open does nothing; reselecting after a lost connection reconnects.
    pub fn select_channel(&mut self, channel: Channel) -> Result<(), ClientError> {
        let known = self.list_channels()?;
        if !known.contains(&channel) {
            return Err(ClientError::UnknownChannel(channel));
        }

        if let Some(current) = &self.active
            && current.channel() == &channel
            && current.state().is_live()
        {
            tracing::debug!(%channel, "channel already selected");
            return Ok(());
        }

        if let Some(mut previous) = self.active.take() {
            previous.close();
            if previous.state() != SocketState::Closed {
                self.draining.push(previous);
            }
        }

        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        tracing::info!(conn = %id, %channel, "subscribing");
        let link = self.connector.open(id, &channel);
        self.store.reset(channel.clone());
        self.active = Some(ConnectionHandle::new(id, channel, link));
        Ok(())
    }

    /// Send on the active connection.
    pub fn send(&mut self, payload: &str) -> Result<(), ClientError> {
        match self.active.as_mut() {
            Some(handle) => handle.send(payload),
            None => Err(ClientError::NotConnected),
        }
    }

    pub fn request_permission(&mut self) -> PermissionRequest {
        self.dispatcher.request_permission()
    }

    pub fn resolve_permission(&mut self, answer: PermissionState) -> anyhow::Result<PermissionState> {
        let before = self.dispatcher.permission();
        let after = self.dispatcher.resolve_permission(answer)?;
        if after != before {
            self.events
                .push_back(Event::PermissionChanged { state: after });
        }
        Ok(after)
    }

    /// Apply one transport report.
    pub fn handle_transport(&mut self, event: TransportEvent) {
        let id = event.id();
        if self.active.as_ref().is_some_and(|h| h.id() == id) {
            self.handle_active(event);
        } else if let Some(pos) = self.draining.iter().position(|h| h.id() == id) {
            match event {
                TransportEvent::Closed { reason, .. } => {
                    let mut finished = self.draining.remove(pos);
                    finished.mark_closed();
                    tracing::debug!(conn = %id, channel = %finished.channel(), %reason, "superseded connection closed");
                }
                TransportEvent::Frame(_, payload) => {
                    tracing::debug!(conn = %id, bytes = payload.len(), "discarding payload from superseded connection");
                }
                TransportEvent::Opened(_) => {}
            }
        } else {
            tracing::trace!(conn = %id, "event for unknown connection");
        }
    }

    fn handle_active(&mut self, event: TransportEvent) {
        let Some(handle) = self.active.as_mut() else {
            return;
        };
        match event {
            TransportEvent::Opened(_) => {
                if handle.mark_open() {
                    self.events.push_back(Event::Connected {
                        channel: handle.channel().clone(),
                    });
                }
            }
            TransportEvent::Frame(_, payload) => {
                let Some(payload) = handle.on_message(payload) else {
                    return;
                };
                let message =
                    Message::new(handle.channel().clone(), payload, self.store.next_sequence());
                if !self.store.append(message.clone()) {
                    return;
                }
                let permission = self.dispatcher.permission();
                let notified = self.dispatcher.evaluate(&message, permission);
                self.events.push_back(Event::Message(message));
                if let Some(notification) = notified {
                    self.events.push_back(Event::Notified(notification));
                }
            }
            TransportEvent::Closed { reason, .. } => {
                let previous = handle.mark_closed();
                if previous == SocketState::Closing {
                    tracing::debug!(conn = %handle.id(), "connection closed on request");
                } else {
                    let channel = handle.channel().clone();
                    tracing::warn!(conn = %handle.id(), %channel, %reason, "connection lost");
                    self.events
                        .push_back(Event::ConnectionLost { channel, reason });
                }
            }
        }
    }

    /// Close everything. Used when the client shuts down.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.active.as_mut() {
            handle.close();
        }
    }

    /// Events produced since the last call, oldest first.
    pub fn drain_events(&mut self) -> impl Iterator<Item = Event> + '_ {
        self.events.drain(..)
    }
}
