use thiserror::Error;
use tracing::{debug, warn};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::flows::states::{TransitionOutcome, WorkflowEvent, WorkflowStage};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid transition from {stage} using event {event:?}")]
    InvalidTransition { stage: WorkflowStage, event: WorkflowEvent },
}

/// Applies events to stages and records every attempt.
#[derive(Clone, Copy, Debug, Default)]
pub struct WorkflowEngine;

impl WorkflowEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn apply(
        &self,
        current: WorkflowStage,
        event: WorkflowEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition(current, event)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: WorkflowStage,
        event: WorkflowEvent,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event);
        match &result {
            Ok(outcome) => {
                debug!(
                    event_name = "workflow.transition_applied",
                    correlation_id = %audit.correlation_id,
                    from = %outcome.from,
                    to = %outcome.to,
                    event = ?outcome.event,
                    "stage transition"
                );
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "workflow.transition_applied",
                        AuditCategory::Flow,
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", outcome.from.to_string())
                    .with_metadata("to", outcome.to.to_string())
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                warn!(
                    event_name = "workflow.transition_rejected",
                    correlation_id = %audit.correlation_id,
                    error = %error,
                    "stage transition rejected"
                );
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "workflow.transition_rejected",
                        AuditCategory::Flow,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

/// The complete stage table. Pairs not listed here are invalid.
pub fn transition(
    current: WorkflowStage,
    event: WorkflowEvent,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use WorkflowEvent::{
        Approved, DispatchFailed, Dispatched, ErrorHandled, IntentRecognized, IntentRejected,
        NotificationAttempted, PreviewBuilt, Rejected,
    };
    use WorkflowStage::{
        CreatePreview, Completed, Dispatch, HandleError, Notify, ParseInput, ShowPreview,
    };

    let to = match (current, event) {
        (ParseInput, IntentRecognized) => CreatePreview,
        (ParseInput, IntentRejected) => HandleError,
        (CreatePreview, PreviewBuilt) => ShowPreview,
        (ShowPreview, Approved) => Dispatch,
        (ShowPreview, Rejected) => HandleError,
        (Dispatch, Dispatched) => Notify,
        (Dispatch, DispatchFailed) => HandleError,
        (HandleError, ErrorHandled) => Notify,
        (Notify, NotificationAttempted) => Completed,
        _ => return Err(FlowTransitionError::InvalidTransition { stage: current, event }),
    };

    Ok(TransitionOutcome { from: current, to, event })
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::flows::engine::{transition, FlowTransitionError, WorkflowEngine};
    use crate::flows::states::{WorkflowEvent, WorkflowStage};

    /// Applies `events` from `ParseInput` and returns every stage visited after the start.
    fn walk(events: &[WorkflowEvent]) -> Vec<WorkflowStage> {
        let engine = WorkflowEngine::new();
        let mut stage = WorkflowStage::ParseInput;
        let mut visited = Vec::new();
        for event in events {
            stage = engine.apply(stage, *event).expect("listed transition").to;
            visited.push(stage);
        }
        visited
    }

    #[test]
    fn approved_run_reaches_completed_through_success_notification() {
        let visited = walk(&[
            WorkflowEvent::IntentRecognized,
            WorkflowEvent::PreviewBuilt,
            WorkflowEvent::Approved,
            WorkflowEvent::Dispatched,
            WorkflowEvent::NotificationAttempted,
        ]);

        assert_eq!(
            visited,
            [
                WorkflowStage::CreatePreview,
                WorkflowStage::ShowPreview,
                WorkflowStage::Dispatch,
                WorkflowStage::Notify,
                WorkflowStage::Completed,
            ]
        );
        assert!(!visited.contains(&WorkflowStage::HandleError));
    }

    #[test]
    fn every_failure_path_goes_through_handle_error_once() {
        let paths: [&[WorkflowEvent]; 3] = [
            &[WorkflowEvent::IntentRejected],
            &[WorkflowEvent::IntentRecognized, WorkflowEvent::PreviewBuilt, WorkflowEvent::Rejected],
            &[
                WorkflowEvent::IntentRecognized,
                WorkflowEvent::PreviewBuilt,
                WorkflowEvent::Approved,
                WorkflowEvent::DispatchFailed,
            ],
        ];

        for path in paths {
            let mut events = path.to_vec();
            events.extend([WorkflowEvent::ErrorHandled, WorkflowEvent::NotificationAttempted]);
            let visited = walk(&events);

            assert_eq!(visited.last(), Some(&WorkflowStage::Completed));
            let count =
                |target: WorkflowStage| visited.iter().filter(|stage| **stage == target).count();
            assert_eq!(count(WorkflowStage::HandleError), 1, "path {path:?}");
            assert_eq!(count(WorkflowStage::Notify), 1, "path {path:?}");
        }
    }

    #[test]
    fn unknown_intent_never_builds_a_preview() {
        let outcome = transition(WorkflowStage::ParseInput, WorkflowEvent::IntentRejected)
            .expect("parse failure routes to error handling");

        assert_eq!(outcome.to, WorkflowStage::HandleError);
        assert_ne!(outcome.to, WorkflowStage::CreatePreview);
    }

    #[test]
    fn completed_is_terminal() {
        for event in [
            WorkflowEvent::IntentRecognized,
            WorkflowEvent::ErrorHandled,
            WorkflowEvent::NotificationAttempted,
        ] {
            let error = transition(WorkflowStage::Completed, event).expect_err("terminal stage");
            assert_eq!(
                error,
                FlowTransitionError::InvalidTransition { stage: WorkflowStage::Completed, event }
            );
        }
    }

    #[test]
    fn notify_cannot_reenter_error_handling() {
        let error = transition(WorkflowStage::Notify, WorkflowEvent::DispatchFailed)
            .expect_err("notify only completes");
        assert!(matches!(error, FlowTransitionError::InvalidTransition { .. }));
    }

    #[test]
    fn transitions_emit_audit_events() {
        let engine = WorkflowEngine::new();
        let sink = InMemoryAuditSink::default();
        let audit = AuditContext::for_run("run-1", "workflow-controller");

        engine
            .apply_with_audit(
                WorkflowStage::ParseInput,
                WorkflowEvent::IntentRecognized,
                &sink,
                &audit,
            )
            .expect("transition should succeed");
        let _ = engine.apply_with_audit(
            WorkflowStage::ParseInput,
            WorkflowEvent::Dispatched,
            &sink,
            &audit,
        );

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "workflow.transition_applied");
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("create_preview"));
        assert_eq!(events[1].event_type, "workflow.transition_rejected");
        assert_eq!(events[1].correlation_id, "run-1");
    }
}
