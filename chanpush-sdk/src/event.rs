//! Events emitted by the client for the UI layer to consume.

use crate::channel::Channel;
use crate::notify::Notification;
use crate::permission::PermissionState;
use crate::store::Message;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The startup channel list arrived.
    Channels { channels: Vec<Channel> },

    /// The startup channel list fetch failed. Channel selection stays
    /// disabled for the lifetime of the client.
    ChannelListUnavailable { reason: String },

    /// The active connection finished its handshake.
    Connected { channel: Channel },

    /// A message was appended to the store.
    Message(Message),

    /// A foreground notification was raised for the last message.
    Notified(Notification),

    /// The active connection closed unexpectedly. No reconnect is attempted;
    /// selecting a channel again starts a fresh connection.
    ConnectionLost { channel: Channel, reason: String },

    /// The notification permission changed through a prompt answer.
    PermissionChanged { state: PermissionState },
}
