use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;

use crate::dispatch::ResultPayload;
use crate::domain::intent::{FieldMap, Intent};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationPayload {
    Success { intent: Intent, fields: FieldMap, result: ResultPayload },
    Error { message: String, context: String },
}

impl NotificationPayload {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::Success { .. } => NotificationKind::Success,
            Self::Error { .. } => NotificationKind::Error,
        }
    }
}

/// Terminal outcome delivery. `false` means delivery failed; callers log it and move on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, kind: NotificationKind, payload: &NotificationPayload) -> bool;
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedNotification {
    pub kind: NotificationKind,
    pub payload: NotificationPayload,
}

/// Keeps every notification in memory and reports a fixed delivery result.
#[derive(Clone)]
pub struct InMemoryNotifier {
    sent: Arc<Mutex<Vec<RecordedNotification>>>,
    delivers: bool,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self { sent: Arc::default(), delivers: true }
    }

    pub fn failing() -> Self {
        Self { sent: Arc::default(), delivers: false }
    }

    pub fn sent(&self) -> Vec<RecordedNotification> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Default for InMemoryNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(&self, kind: NotificationKind, payload: &NotificationPayload) -> bool {
        let record = RecordedNotification { kind, payload: payload.clone() };
        match self.sent.lock() {
            Ok(mut sent) => sent.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
        self.delivers
    }
}
