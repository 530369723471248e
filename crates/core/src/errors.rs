use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Extraction,
    Validation,
    Execution,
    UserRejected,
    Cancelled,
    /// Logged only; never attached to a run.
    NotificationFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extraction => "extraction",
            Self::Validation => "validation",
            Self::Execution => "execution",
            Self::UserRejected => "user_rejected",
            Self::Cancelled => "cancelled",
            Self::NotificationFailure => "notification_failure",
        }
    }
}

/// Failure attached to a run. The first one recorded is the one reported.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct WorkflowError {
    pub kind: ErrorKind,
    pub message: String,
    pub context: Option<String>,
}

impl WorkflowError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), context: None }
    }

    pub fn extraction(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Extraction, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Execution, message)
    }

    pub fn user_rejected() -> Self {
        Self::new(ErrorKind::UserRejected, "User cancelled the operation")
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}
