//! Background push listener.
//!
//! Runs apart from the foreground client and shares nothing with it except
//! the permission store, which it reads on every push. A push arrives as raw
//! text; a well-formed one (`{"message": "..."}`) becomes exactly one
//! notification with a fixed title.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::error::ClientError;
use crate::notify::{Notification, Notifier};
use crate::permission::{PermissionState, PermissionStore};
use crate::ws::{self, Inbound};

/// Title of every push notification.
pub const PUSH_TITLE: &str = "New Message";
/// Icon attached to push notifications unless configured otherwise.
pub const DEFAULT_ICON: &str = "/icon.png";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    pub message: String,
}

impl PushPayload {
    pub fn parse(data: &str) -> Result<Self, ClientError> {
        serde_json::from_str(data).map_err(|e| ClientError::MalformedPush(e.to_string()))
    }
}

pub struct BackgroundPushListener {
    notifier: Arc<dyn Notifier>,
    permissions: Arc<dyn PermissionStore>,
    icon: String,
}

impl BackgroundPushListener {
    pub fn new(notifier: Arc<dyn Notifier>, permissions: Arc<dyn PermissionStore>) -> Self {
        Self {
            notifier,
            permissions,
            icon: DEFAULT_ICON.to_string(),
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    /// Handle one push. Never fails: malformed payloads, missing permission
    /// and sink errors are logged and the listener carries on.
    ///
    /// Returns the notification that was shown, if any.
    pub fn on_push(&self, data: &str) -> Option<Notification> {
        let payload = match PushPayload::parse(data) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(bytes = data.len(), "ignoring push: {e}");
                return None;
            }
        };
        let permission = self.permissions.current();
        if permission != PermissionState::Granted {
            tracing::debug!(%permission, "push received but notifications are not permitted");
            return None;
        }
        let notification = Notification {
            title: PUSH_TITLE.to_string(),
            body: payload.message,
            icon: Some(self.icon.clone()),
        };
        match self.notifier.show(&notification) {
            Ok(()) => Some(notification),
            Err(e) => {
                tracing::warn!("failed to show push notification: {e:#}");
                None
            }
        }
    }

    /// Feed pushes from `source` until it closes.
    pub async fn run(self, mut source: tokio::sync::mpsc::Receiver<String>) {
        while let Some(data) = source.recv().await {
            self.on_push(&data);
        }
        tracing::debug!("push source closed");
    }
}

/// Push subscription endpoint under a server origin.
pub fn subscription_url(origin: &str) -> String {
    format!(
        "{}/push/subscribe",
        ws::http_to_ws_scheme(origin.trim_end_matches('/'))
    )
}

/// Register `listener` with the server's push endpoint and run it in its own
/// task. The subscription lasts as long as the server keeps it open; there
/// is no teardown and no re-registration.
///
/// The task ends with an error when registration fails or the subscription
/// breaks, and with `Ok` when the server closes it.
pub fn subscribe(origin: &str, listener: BackgroundPushListener) -> JoinHandle<Result<()>> {
    let url = subscription_url(origin);
    tokio::spawn(async move {
        let (mut sink, mut source) = ws::connect(&url)
            .await
            .context("push registration failed")?;
        tracing::info!(%url, "push listener registered");
        while let Some(frame) = source.next().await {
            match frame.context("push subscription failed")? {
                Inbound::Text(data) => {
                    listener.on_push(&data);
                }
                Inbound::Ping(data) => {
                    let _ = sink.pong(data).await;
                }
                Inbound::Close { code, reason } => {
                    tracing::info!(code, %reason, "push subscription closed by server");
                    break;
                }
            }
        }
        anyhow::Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::RecordingNotifier;
    use crate::permission::MemoryPermissionStore;

    fn listener(state: PermissionState) -> (BackgroundPushListener, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let listener = BackgroundPushListener::new(
            notifier.clone(),
            Arc::new(MemoryPermissionStore::new(state)),
        );
        (listener, notifier)
    }

    #[test]
    fn well_formed_push_raises_one_notification() {
        let (listener, notifier) = listener(PermissionState::Granted);
        let shown = listener.on_push(r#"{"message":"bg-alert"}"#).unwrap();
        assert_eq!(shown.title, PUSH_TITLE);
        assert_eq!(shown.body, "bg-alert");
        assert_eq!(shown.icon.as_deref(), Some(DEFAULT_ICON));
        assert_eq!(notifier.shown.lock().len(), 1);
    }

    #[test]
    fn malformed_push_is_swallowed_and_listener_keeps_working() {
        let (listener, notifier) = listener(PermissionState::Granted);
        assert!(listener.on_push("not-json").is_none());
        assert!(listener.on_push(r#"{"msg":"wrong field"}"#).is_none());
        assert!(notifier.shown.lock().is_empty());

        assert!(listener.on_push(r#"{"message":"after"}"#).is_some());
        assert_eq!(notifier.shown.lock().len(), 1);
    }

    #[test]
    fn push_respects_permission() {
        for state in [PermissionState::Default, PermissionState::Denied] {
            let (listener, notifier) = listener(state);
            assert!(listener.on_push(r#"{"message":"x"}"#).is_none());
            assert!(notifier.shown.lock().is_empty());
        }
    }

    #[test]
    fn permission_is_read_on_every_push() {
        let notifier = Arc::new(RecordingNotifier::default());
        let store = Arc::new(MemoryPermissionStore::new(PermissionState::Default));
        let listener = BackgroundPushListener::new(notifier.clone(), store.clone());

        assert!(listener.on_push(r#"{"message":"one"}"#).is_none());
        store.set(PermissionState::Granted).unwrap();
        assert!(listener.on_push(r#"{"message":"two"}"#).is_some());
    }

    #[test]
    fn custom_icon() {
        let (listener, _) = listener(PermissionState::Granted);
        let listener = listener.with_icon("/static/bell.png");
        let shown = listener.on_push(r#"{"message":"x"}"#).unwrap();
        assert_eq!(shown.icon.as_deref(), Some("/static/bell.png"));
    }

    #[test]
    fn parse_reports_malformed_push() {
        assert!(matches!(
            PushPayload::parse("not-json"),
            Err(ClientError::MalformedPush(_))
        ));
    }

    #[tokio::test]
    async fn run_drains_source() {
        let (listener, notifier) = listener(PermissionState::Granted);
        let (tx, rx) = tokio::sync::mpsc::channel(8);
        tx.send("garbage".to_string()).await.unwrap();
        tx.send(r#"{"message":"a"}"#.to_string()).await.unwrap();
        tx.send(r#"{"message":"b"}"#.to_string()).await.unwrap();
        drop(tx);
        listener.run(rx).await;

        let bodies: Vec<String> = notifier.shown.lock().iter().map(|n| n.body.clone()).collect();
        assert_eq!(bodies, ["a", "b"]);
    }

    #[tokio::test]
    async fn unreachable_server_fails_registration() {
        let (listener, _) = listener(PermissionState::Granted);
        let err = subscribe("http://127.0.0.1:9", listener)
            .await
            .unwrap()
            .unwrap_err();
        assert!(format!("{err:#}").contains("push registration failed"));
    }
}
