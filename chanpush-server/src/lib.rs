//! chanpush server: per-channel websocket broadcast, a global room, and a
//! push relay for background listeners.

pub mod config;
pub mod server;
pub mod web;
