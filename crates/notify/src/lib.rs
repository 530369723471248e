//! Email delivery for terminal workflow outcomes.
//!
//! [`EmailNotifier`] implements the core `Notifier` contract: it renders a success or error
//! payload through [`NotificationComposer`] and hands the message to a [`MailTransport`].

pub mod composer;
pub mod notifier;
pub mod transport;

pub use composer::{ComposeError, EmailMessage, NotificationComposer};
pub use notifier::EmailNotifier;
pub use transport::{InMemoryTransport, LogTransport, MailTransport, TransportError};
