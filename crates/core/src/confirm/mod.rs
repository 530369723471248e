//! Human-in-the-loop confirmation.
//!
//! The loop shows a preview, then waits on [`ConfirmationSurface::decide`] until the human
//! approves or rejects. Edits replace one field at a time and send the loop back to presenting.
//! Waiting on `decide` is the only place a run suspends.

mod surfaces;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::preview::{EditEffect, Preview};
use crate::errors::WorkflowError;

pub use surfaces::{
    AutoApprove, ChannelConfirmation, ConfirmationHandle, PreviewPrompt, RoutedDecision,
    ScriptedConfirmation,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
    Edit { field: String, value: String },
}

impl Decision {
    pub fn edit(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Edit { field: field.into(), value: value.into() }
    }
}

#[async_trait]
pub trait ConfirmationSurface: Send + Sync {
    async fn present(&self, run_id: &str, preview: &Preview);
    async fn decide(&self, run_id: &str) -> Decision;
}

/// Limits an unattended host may put on the loop. Both are off by default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub max_edits: Option<u32>,
    pub decision_timeout: Option<Duration>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ConfirmationOutcome {
    Approved { preview: Preview, edits: u32 },
    Rejected { preview: Preview, edits: u32, error: WorkflowError },
}

impl ConfirmationOutcome {
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }

    pub fn edits(&self) -> u32 {
        match self {
            Self::Approved { edits, .. } | Self::Rejected { edits, .. } => *edits,
        }
    }
}

/// Returns a copy of `preview` with `field` replaced, unless `value` is empty.
pub fn apply_edit(preview: &Preview, field: &str, value: &str) -> Preview {
    let mut edited = preview.clone();
    match edited.replace_if_nonempty(field, value) {
        EditEffect::Replaced => debug!(field, "preview field replaced"),
        EditEffect::KeptEmpty => debug!(field, "empty edit ignored"),
        EditEffect::KeptInvalid { reason } => {
            warn!(field, reason = %reason, "invalid edit ignored, keeping current value")
        }
    }
    edited
}

#[derive(Clone, Debug, Default)]
pub struct ConfirmationLoop {
    policy: ConfirmationPolicy,
}

impl ConfirmationLoop {
    pub fn new(policy: ConfirmationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ConfirmationPolicy {
        self.policy
    }

    pub async fn run<S>(&self, surface: &S, run_id: &str, preview: Preview) -> ConfirmationOutcome
    where
        S: ConfirmationSurface + ?Sized,
    {
        let mut preview = preview;
        let mut edits = 0_u32;
        surface.present(run_id, &preview).await;

        loop {
            let decision = match self.await_decision(surface, run_id).await {
                Ok(decision) => decision,
                Err(error) => return ConfirmationOutcome::Rejected { preview, edits, error },
            };

            match decision {
                Decision::Approve => {
                    info!(event_name = "workflow.confirmation.approved", run_id, edits);
                    return ConfirmationOutcome::Approved { preview, edits };
                }
                Decision::Reject => {
                    info!(event_name = "workflow.confirmation.rejected", run_id, edits);
                    let error = WorkflowError::user_rejected();
                    return ConfirmationOutcome::Rejected { preview, edits, error };
                }
                Decision::Edit { field, value } => {
                    if let Some(limit) = self.policy.max_edits {
                        if edits >= limit {
                            warn!(event_name = "workflow.confirmation.edit_limit", run_id, limit);
                            let error =
                                WorkflowError::cancelled(format!("Edit limit of {limit} reached"));
                            return ConfirmationOutcome::Rejected { preview, edits, error };
                        }
                    }

                    edits += 1;
                    preview = apply_edit(&preview, &field, &value);
                    surface.present(run_id, &preview).await;
                }
            }
        }
    }

    async fn await_decision<S>(&self, surface: &S, run_id: &str) -> Result<Decision, WorkflowError>
    where
        S: ConfirmationSurface + ?Sized,
    {
        let Some(limit) = self.policy.decision_timeout else {
            return Ok(surface.decide(run_id).await);
        };

        tokio::time::timeout(limit, surface.decide(run_id)).await.map_err(|_| {
            warn!(
                event_name = "workflow.confirmation.timed_out",
                run_id,
                timeout_secs = limit.as_secs(),
                "no decision before deadline"
            );
            WorkflowError::cancelled(format!(
                "Operation cancelled: no decision within {}s",
                limit.as_secs()
            ))
        })
    }
}
