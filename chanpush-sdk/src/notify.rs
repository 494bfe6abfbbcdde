//! Foreground notifications for messages seen on the active connection.
//!
//! The dispatcher never tries to deduplicate against the push path. The two
//! paths cannot observe each other, so the server guarantees that any one
//! event is delivered over the socket or over push, never both.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::permission::{PermissionPrompt, PermissionState, PermissionStore};
use crate::store::Message;

/// A user-visible alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
}

/// Platform sink that actually shows notifications.
pub trait Notifier: Send + Sync {
    fn show(&self, notification: &Notification) -> Result<()>;
}

/// Result of a `request_permission` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionRequest {
    /// The prompt was shown; the answer arrives via `resolve_permission`.
    Prompted,
    /// Already decided; nothing was shown.
    AlreadyDecided(PermissionState),
}

pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    permissions: Arc<dyn PermissionStore>,
    prompt: Box<dyn PermissionPrompt>,
}

impl NotificationDispatcher {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        permissions: Arc<dyn PermissionStore>,
        prompt: Box<dyn PermissionPrompt>,
    ) -> Self {
        Self {
            notifier,
            permissions,
            prompt,
        }
    }

    /// Current permission, read from the store every time.
    pub fn permission(&self) -> PermissionState {
        self.permissions.current()
    }

    pub fn notification_for(message: &Message) -> Notification {
        Notification {
            title: format!("New message in {}", message.channel),
            body: message.payload.clone(),
            icon: None,
        }
    }

    /// Raise exactly one notification for `message` when `permission` is
    /// Granted; nothing otherwise. Returns the notification that was shown.
    ///
    /// A failing sink is logged and swallowed.
    pub fn evaluate(
        &self,
        message: &Message,
        permission: PermissionState,
    ) -> Option<Notification> {
        if permission != PermissionState::Granted {
            tracing::trace!(%permission, sequence = message.sequence, "notification suppressed");
            return None;
        }
        let notification = Self::notification_for(message);
        if let Err(e) = self.notifier.show(&notification) {
            tracing::warn!(channel = %message.channel, "failed to show notification: {e:#}");
            return None;
        }
        Some(notification)
    }

    /// Ask the user, unless they already answered. Once Denied the client
    /// never prompts again.
    pub fn request_permission(&mut self) -> PermissionRequest {
        match self.permissions.current() {
            PermissionState::Default => {
                tracing::debug!("showing notification permission prompt");
                self.prompt.prompt();
                PermissionRequest::Prompted
            }
            decided => PermissionRequest::AlreadyDecided(decided),
        }
    }

    /// The platform's answer to a prompt. Only a Default permission can be
    /// changed this way; a decided one stays as it is.
    ///
    /// Returns the permission in effect afterwards.
    pub fn resolve_permission(&mut self, answer: PermissionState) -> Result<PermissionState> {
        let current = self.permissions.current();
        if current != PermissionState::Default {
            tracing::debug!(%current, %answer, "ignoring answer, permission already decided");
            return Ok(current);
        }
        if answer != PermissionState::Default {
            self.permissions.set(answer)?;
            tracing::info!(permission = %answer, "notification permission resolved");
        }
        Ok(answer)
    }
}
