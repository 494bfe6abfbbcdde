//! Terminal stand-ins for the platform notification surface.

use std::io::Write;

use chanpush_sdk::event::Event;
use chanpush_sdk::notify::{Notification, Notifier};
use chanpush_sdk::permission::PermissionPrompt;
use chanpush_sdk::store::Message;
use chrono::Local;

/// Shows notifications as highlighted lines on stderr.
#[derive(Debug, Clone)]
pub struct TerminalNotifier {
    bell: bool,
}

impl TerminalNotifier {
    pub fn new(bell: bool) -> Self {
        Self { bell }
    }
}

impl Notifier for TerminalNotifier {
    fn show(&self, notification: &Notification) -> anyhow::Result<()> {
        let mut stderr = std::io::stderr().lock();
        if self.bell {
            write!(stderr, "\x07")?;
        }
        writeln!(
            stderr,
            "\x1b[1;33m🔔 {}\x1b[0m {}",
            notification.title, notification.body
        )?;
        stderr.flush()?;
        Ok(())
    }
}

/// Prints the permission question; the answer arrives as `/allow` or `/deny`.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl PermissionPrompt for TerminalPrompt {
    fn prompt(&mut self) {
        eprintln!("Allow notifications from chanpush? Answer with /allow or /deny.");
    }
}

/// One message as a list item.
pub fn format_message(message: &Message) -> String {
    let time = message.received_at.with_timezone(&Local).format("%H:%M:%S");
    format!("\x1b[90m{time}\x1b[0m  • {}", message.payload)
}

/// Status line for a client event, if it has one. Messages and
/// notifications are rendered elsewhere.
pub fn describe(event: &Event) -> Option<String> {
    match event {
        Event::Channels { channels } => {
            let names: Vec<&str> = channels.iter().map(|c| c.as_str()).collect();
            Some(format!("Channels: {}", names.join(", ")))
        }
        Event::ChannelListUnavailable { reason } => Some(format!(
            "Channel list unavailable ({reason}); channel selection is disabled"
        )),
        Event::Connected { channel } => Some(format!("Connected to {channel}")),
        Event::ConnectionLost { channel, reason } => Some(format!(
            "Connection to {channel} lost: {reason}. Use /join {channel} to reconnect."
        )),
        Event::PermissionChanged { state } => Some(format!("Notification permission: {state}")),
        Event::Message(_) | Event::Notified(_) => None,
    }
}
