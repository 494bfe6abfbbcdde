//! Client SDK for chanpush channel subscriptions.
//!
//! A client follows exactly one broadcast channel at a time over a websocket,
//! keeps the messages received on it, and raises notifications for them.
//! A second, independent path ([`push::BackgroundPushListener`]) raises
//! notifications from push events without touching any foreground state.
//!
//! Most consumers start with [`client::connect`], which spawns the event loop
//! and hands back a [`client::ClientHandle`] plus a stream of [`event::Event`]s.
//! The pieces it is built from ([`manager::ChannelSubscriptionManager`],
//! [`connection::ConnectionHandle`], [`store::MessageStore`],
//! [`notify::NotificationDispatcher`]) are synchronous and can be driven
//! directly, which is how the tests exercise them.

pub mod channel;
pub mod client;
pub mod connection;
pub mod error;
pub mod event;
pub mod manager;
pub mod notify;
pub mod permission;
pub mod push;
pub mod store;
pub mod ws;
