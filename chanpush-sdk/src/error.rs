//! Errors surfaced by the SDK to its consumers.

use crate::channel::Channel;

/// Failures the subscription core reports to the UI layer.
///
/// None of these are fatal to the client loop: each one degrades to a
/// reported state or a rejected call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The startup channel list fetch failed; no channel can be selected.
    #[error("channel list unavailable: {0}")]
    ChannelListUnavailable(String),

    /// A send was attempted while the active connection is not open.
    #[error("not connected")]
    NotConnected,

    /// The active connection closed without being asked to.
    #[error("connection to {channel} lost: {reason}")]
    ConnectionLost { channel: Channel, reason: String },

    /// A push payload could not be parsed.
    #[error("malformed push payload: {0}")]
    MalformedPush(String),

    /// The requested channel is not in the fetched channel list.
    #[error("unknown channel: {0}")]
    UnknownChannel(Channel),

    /// The client event loop has stopped.
    #[error("client event loop is gone")]
    ClientGone,
}
