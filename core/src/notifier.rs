//! Outbound notifications (email/SMS delivery lives outside the core).
//!
//! RULE: Notifications are fire-and-forget. They are sent after the owning
//! transaction commits, and a delivery failure is logged, never returned.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body: String,
}

pub trait Notifier: Send + Sync {
    fn send(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Drops every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn send(&self, _notification: &Notification) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Writes messages to the log instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, n: &Notification) -> anyhow::Result<()> {
        log::info!("notify {} <- {}: {}", n.to, n.from, n.subject);
        Ok(())
    }
}

/// Deliver without letting a failure escape.
pub fn send_quietly(notifier: &dyn Notifier, notification: &Notification) {
    if let Err(e) = notifier.send(notification) {
        log::warn!(
            "notification to {} ('{}') failed: {e:#}",
            notification.to,
            notification.subject
        );
    }
}
