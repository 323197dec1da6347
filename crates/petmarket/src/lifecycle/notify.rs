use serde::{Deserialize, Serialize};
use tracing::warn;

use super::domain::UserId;

/// Message handed to the external delivery channel (email, in-app inbox).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: UserId,
    pub message: String,
}

/// Outbound notification hook.
pub trait Notifier: Send + Sync {
    fn dispatch(&self, notification: Notification) -> Result<(), NotifyError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Deliver after commit. Failures are logged and never undo the state change.
pub(crate) fn dispatch_detached<N>(notifier: &N, notification: Notification)
where
    N: Notifier + ?Sized,
{
    let recipient = notification.recipient.clone();
    if let Err(error) = notifier.dispatch(notification) {
        warn!(%recipient, %error, "notification dispatch failed");
    }
}
