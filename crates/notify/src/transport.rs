use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::composer::EmailMessage;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("mail transport unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), TransportError>;
}

#[async_trait]
impl<T> MailTransport for Arc<T>
where
    T: MailTransport + ?Sized,
{
    async fn send(&self, message: &EmailMessage) -> Result<(), TransportError> {
        (**self).send(message).await
    }
}

/// Writes the message to the log instead of delivering it.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    async fn send(&self, message: &EmailMessage) -> Result<(), TransportError> {
        info!(
            event_name = "notify.email.logged",
            to = %message.to,
            subject = %message.subject,
            body = %message.body,
            "email rendered"
        );
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryTransport {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
    unavailable: bool,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every send with [`TransportError::Unavailable`].
    pub fn unavailable() -> Self {
        Self { sent: Arc::default(), unavailable: true }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl MailTransport for InMemoryTransport {
    async fn send(&self, message: &EmailMessage) -> Result<(), TransportError> {
        if self.unavailable {
            return Err(TransportError::Unavailable("in-memory transport offline".into()));
        }
        match self.sent.lock() {
            Ok(mut sent) => sent.push(message.clone()),
            Err(poisoned) => poisoned.into_inner().push(message.clone()),
        }
        Ok(())
    }
}
