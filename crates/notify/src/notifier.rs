use async_trait::async_trait;
use dealflow_core::config::NotifyConfig;
use dealflow_core::{NotificationKind, NotificationPayload, Notifier};
use tracing::{info, warn};

use crate::composer::{ComposeError, NotificationComposer};
use crate::transport::MailTransport;

/// Emails terminal outcomes to a single recipient.
///
/// With no recipient configured every notification reports `false`, which the workflow logs
/// and otherwise ignores.
pub struct EmailNotifier<T> {
    transport: T,
    composer: NotificationComposer,
    recipient: Option<String>,
}

impl<T: MailTransport> EmailNotifier<T> {
    pub fn new(transport: T, recipient: Option<String>) -> Result<Self, ComposeError> {
        let recipient = recipient.filter(|value| !value.trim().is_empty());
        Ok(Self { transport, composer: NotificationComposer::new()?, recipient })
    }

    /// A disabled notify section yields a notifier with no recipient.
    pub fn from_config(transport: T, config: &NotifyConfig) -> Result<Self, ComposeError> {
        let recipient = if config.enabled { config.recipient.clone() } else { None };
        Self::new(transport, recipient)
    }

    pub fn recipient(&self) -> Option<&str> {
        self.recipient.as_deref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

#[async_trait]
impl<T: MailTransport> Notifier for EmailNotifier<T> {
    async fn notify(&self, kind: NotificationKind, payload: &NotificationPayload) -> bool {
        let Some(recipient) = self.recipient.as_deref() else {
            warn!(event_name = "notify.email.skipped", ?kind, "no notification recipient configured");
            return false;
        };

        let message = match self.composer.compose(recipient, payload) {
            Ok(message) => message,
            Err(error) => {
                warn!(event_name = "notify.email.render_failed", ?kind, error = %error);
                return false;
            }
        };

        match self.transport.send(&message).await {
            Ok(()) => {
                info!(event_name = "notify.email.sent", ?kind, to = %recipient, subject = %message.subject);
                true
            }
            Err(error) => {
                warn!(event_name = "notify.email.failed", ?kind, to = %recipient, error = %error);
                false
            }
        }
    }
}
