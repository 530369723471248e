//! Drives one run through the stage table.
//!
//! The controller owns no per-run data. Each [`WorkflowController::process`] call builds its own
//! [`RunState`], so a single controller can serve concurrent runs.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink,
};
use crate::confirm::{ConfirmationLoop, ConfirmationOutcome, ConfirmationPolicy, ConfirmationSurface};
use crate::dispatch::Dispatcher;
use crate::domain::intent::Intent;
use crate::errors::{ErrorKind, WorkflowError};
use crate::extract::EntityExtractor;
use crate::flows::engine::WorkflowEngine;
use crate::flows::run_state::{ConfirmationStatus, RunState, WorkflowResult};
use crate::flows::states::{WorkflowEvent, WorkflowStage};
use crate::notify::{NotificationPayload, Notifier};
use crate::preview::PreviewBuilder;

const ACTOR: &str = "workflow-controller";

pub struct WorkflowController<X, S, N> {
    extractor: X,
    surface: S,
    notifier: N,
    previews: PreviewBuilder,
    dispatcher: Dispatcher,
    confirmation: ConfirmationLoop,
    engine: WorkflowEngine,
    audit: Arc<dyn AuditSink>,
}

impl<X, S, N> WorkflowController<X, S, N>
where
    X: EntityExtractor,
    S: ConfirmationSurface,
    N: Notifier,
{
    pub fn new(extractor: X, surface: S, notifier: N, dispatcher: Dispatcher) -> Self {
        Self {
            extractor,
            surface,
            notifier,
            previews: PreviewBuilder::default(),
            dispatcher,
            confirmation: ConfirmationLoop::default(),
            engine: WorkflowEngine::new(),
            audit: Arc::new(TracingAuditSink),
        }
    }

    pub fn with_preview_builder(mut self, previews: PreviewBuilder) -> Self {
        self.previews = previews;
        self
    }

    pub fn with_policy(mut self, policy: ConfirmationPolicy) -> Self {
        self.confirmation = ConfirmationLoop::new(policy);
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub async fn process(&self, text: &str) -> WorkflowResult {
        self.run(RunState::new(text)).await
    }

    /// Runs with a caller-chosen run id, e.g. one already used by the host's confirmation channel.
    pub async fn process_with_run_id(&self, run_id: &str, text: &str) -> WorkflowResult {
        self.run(RunState::with_run_id(run_id, text)).await
    }

    async fn run(&self, mut run: RunState) -> WorkflowResult {
        let audit = AuditContext::for_run(run.run_id(), ACTOR);
        info!(event_name = "workflow.run.started", run_id = run.run_id(), "workflow run started");
        self.audit.emit(
            self.audit_event(
                &run,
                "workflow.run_received",
                AuditCategory::Ingress,
                AuditOutcome::Success,
            )
            .with_metadata("input_chars", run.origin_text().chars().count().to_string()),
        );

        while !run.stage().is_terminal() {
            let event = match run.stage() {
                WorkflowStage::ParseInput => self.parse_input(&mut run).await,
                WorkflowStage::CreatePreview => self.create_preview(&mut run),
                WorkflowStage::ShowPreview => self.show_preview(&mut run).await,
                WorkflowStage::Dispatch => self.dispatch(&mut run).await,
                WorkflowStage::HandleError => self.handle_error(&run),
                WorkflowStage::Notify => self.notify(&mut run).await,
                WorkflowStage::Completed => break,
            };
            self.advance(&mut run, event, &audit);
        }

        let edits = run.edits();
        let confirmation = run.confirmation();
        let result = run.into_result();
        info!(
            event_name = "workflow.run.completed",
            success = result.success,
            edits,
            confirmation = ?confirmation,
            error_kind = result.error_kind.as_ref().map(ErrorKind::as_str).unwrap_or_default(),
            "workflow run completed"
        );
        result
    }

    fn advance(&self, run: &mut RunState, event: WorkflowEvent, audit: &AuditContext) {
        match self.engine.apply_with_audit(run.stage(), event, self.audit.as_ref(), audit) {
            Ok(outcome) => run.set_stage(outcome.to),
            Err(invalid) => {
                error!(
                    event_name = "workflow.run.invalid_transition",
                    run_id = run.run_id(),
                    error = %invalid,
                    "stage table rejected event"
                );
                let next = if run.notification_sent().is_some() {
                    WorkflowStage::Completed
                } else {
                    WorkflowStage::HandleError
                };
                self.audit.emit(
                    AuditEvent::new(
                        audit,
                        "workflow.run_diverted",
                        AuditCategory::System,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("error", invalid.to_string())
                    .with_metadata("diverted_to", next.to_string()),
                );
                self.record_error(run, WorkflowError::execution(invalid.to_string()));
                run.set_stage(next);
            }
        }
    }

    fn audit_event(
        &self,
        run: &RunState,
        event_type: &str,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) -> AuditEvent {
        AuditEvent::new(&AuditContext::for_run(run.run_id(), ACTOR), event_type, category, outcome)
    }

    fn record_error(&self, run: &mut RunState, error: WorkflowError) {
        if let Some(ignored) = run.record_error(error) {
            warn!(
                event_name = "workflow.run.secondary_error",
                run_id = run.run_id(),
                kind = ignored.kind.as_str(),
                error = %ignored,
                "run already failed; keeping the first error"
            );
        }
    }

    async fn parse_input(&self, run: &mut RunState) -> WorkflowEvent {
        let extracted = self.extractor.extract(run.origin_text()).await;
        let extraction = match extracted {
            Ok(extraction) => extraction,
            Err(failure) => {
                self.record_error(run, WorkflowError::extraction(failure.message));
                return WorkflowEvent::IntentRejected;
            }
        };

        let intent = extraction.intent;
        info!(
            event_name = "workflow.intent.extracted",
            run_id = run.run_id(),
            intent = %intent,
            field_count = extraction.fields.len(),
            "intent extracted"
        );
        let recognized = !intent.is_unknown() && self.dispatcher.supports(&intent);
        if !recognized {
            let error = WorkflowError::extraction(format!("Unknown intent: {intent}"));
            run.set_extraction(intent, extraction.fields);
            self.record_error(run, error);
            return WorkflowEvent::IntentRejected;
        }

        run.set_extraction(intent, extraction.fields);
        WorkflowEvent::IntentRecognized
    }

    fn create_preview(&self, run: &mut RunState) -> WorkflowEvent {
        let intent = run.intent().cloned().unwrap_or_else(|| Intent::Unknown(String::new()));
        let preview = self.previews.build(intent, run.fields(), run.origin_text());
        run.set_preview(preview);
        WorkflowEvent::PreviewBuilt
    }

    async fn show_preview(&self, run: &mut RunState) -> WorkflowEvent {
        let Some(preview) = run.take_preview() else {
            self.record_error(run, WorkflowError::validation("no preview to confirm"));
            return WorkflowEvent::Rejected;
        };

        let outcome = self.confirmation.run(&self.surface, run.run_id(), preview).await;
        match outcome {
            ConfirmationOutcome::Approved { preview, edits } => {
                self.audit.emit(
                    self.audit_event(
                        run,
                        "workflow.confirmation_decided",
                        AuditCategory::Confirmation,
                        AuditOutcome::Success,
                    )
                    .with_metadata("edits", edits.to_string()),
                );
                run.set_preview(preview);
                run.set_confirmation(ConfirmationStatus::Approved, edits);
                WorkflowEvent::Approved
            }
            ConfirmationOutcome::Rejected { preview, edits, error } => {
                self.audit.emit(
                    self.audit_event(
                        run,
                        "workflow.confirmation_decided",
                        AuditCategory::Confirmation,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("edits", edits.to_string())
                    .with_metadata("error_kind", error.kind.as_str()),
                );
                run.set_preview(preview);
                run.set_confirmation(ConfirmationStatus::Rejected, edits);
                self.record_error(run, error);
                WorkflowEvent::Rejected
            }
        }
    }

    async fn dispatch(&self, run: &mut RunState) -> WorkflowEvent {
        let Some(intent) = run.intent().cloned() else {
            self.record_error(run, WorkflowError::validation("nothing approved to dispatch"));
            return WorkflowEvent::DispatchFailed;
        };

        let dispatched = match run.preview() {
            Some(preview) => self.dispatcher.dispatch(&intent, preview).await,
            None => Err(WorkflowError::validation("nothing approved to dispatch")),
        };
        match dispatched {
            Ok(payload) => {
                info!(
                    event_name = "workflow.dispatch.succeeded",
                    run_id = run.run_id(),
                    intent = %intent,
                    "action executed"
                );
                self.audit.emit(
                    self.audit_event(
                        run,
                        "workflow.dispatch_completed",
                        AuditCategory::Dispatch,
                        AuditOutcome::Success,
                    )
                    .with_metadata("intent", intent.as_str()),
                );
                run.record_result(intent, payload);
                WorkflowEvent::Dispatched
            }
            Err(error) => {
                self.audit.emit(
                    self.audit_event(
                        run,
                        "workflow.dispatch_completed",
                        AuditCategory::Dispatch,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("intent", intent.as_str())
                    .with_metadata("error_kind", error.kind.as_str()),
                );
                self.record_error(run, error);
                WorkflowEvent::DispatchFailed
            }
        }
    }

    fn handle_error(&self, run: &RunState) -> WorkflowEvent {
        if let Some(error) = run.error() {
            warn!(
                event_name = "workflow.run.failed",
                run_id = run.run_id(),
                kind = error.kind.as_str(),
                error = %error,
                context = error.context.as_deref().unwrap_or_default(),
                "workflow run failed"
            );
        }
        WorkflowEvent::ErrorHandled
    }

    async fn notify(&self, run: &mut RunState) -> WorkflowEvent {
        let payload = match (run.error(), run.intent(), run.last_result()) {
            (None, Some(intent), Some(result)) => NotificationPayload::Success {
                intent: intent.clone(),
                fields: run.confirmed_fields(),
                result: result.clone(),
            },
            (error, _, _) => NotificationPayload::Error {
                message: error
                    .map(|error| error.message.clone())
                    .unwrap_or_else(|| "run ended without a result".to_owned()),
                context: format!("User input: {}", run.origin_text()),
            },
        };

        let sent = self.notifier.notify(payload.kind(), &payload).await;
        if !sent {
            warn!(
                event_name = "workflow.notify.failed",
                run_id = run.run_id(),
                kind = ErrorKind::NotificationFailure.as_str(),
                notification = ?payload.kind(),
                "notification was not delivered"
            );
        }
        let outcome = if sent { AuditOutcome::Success } else { AuditOutcome::Failed };
        self.audit.emit(
            self.audit_event(
                run,
                "workflow.notification_attempted",
                AuditCategory::Notification,
                outcome,
            )
            .with_metadata("notification", format!("{:?}", payload.kind())),
        );
        run.set_notification_sent(sent);
        WorkflowEvent::NotificationAttempted
    }
}
