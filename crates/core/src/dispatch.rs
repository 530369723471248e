//! Routing of approved previews to the executor registered for their intent.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::intent::Intent;
use crate::domain::preview::Preview;
use crate::errors::WorkflowError;

/// Opaque executor response, carried through the run untouched.
pub type ResultPayload = Map<String, Value>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ExecutorError {
    pub message: String,
}

impl ExecutorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[async_trait]
pub trait ActionExecutor: Send + Sync {
    fn intent(&self) -> Intent;
    /// Noun used in failure messages, e.g. `contact`.
    fn object_name(&self) -> &'static str;
    /// Fields that must be non-blank before `execute` runs, whatever template built the preview.
    fn required_fields(&self) -> &'static [RequiredField] {
        &[]
    }
    async fn execute(&self, preview: &Preview) -> Result<ResultPayload, ExecutorError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequiredField {
    pub name: &'static str,
    /// Validation message reported when the field is blank.
    pub message: &'static str,
}

impl RequiredField {
    pub const fn new(name: &'static str, message: &'static str) -> Self {
        Self { name, message }
    }
}

#[derive(Default)]
pub struct Dispatcher {
    executors: HashMap<Intent, Box<dyn ActionExecutor>>,
}

impl Dispatcher {
    pub fn register<T>(&mut self, executor: T)
    where
        T: ActionExecutor + 'static,
    {
        self.executors.insert(executor.intent(), Box::new(executor));
    }

    pub fn with<T>(mut self, executor: T) -> Self
    where
        T: ActionExecutor + 'static,
    {
        self.register(executor);
        self
    }

    pub fn supports(&self, intent: &Intent) -> bool {
        self.executors.contains_key(intent)
    }

    fn executor(&self, intent: &Intent) -> Result<&dyn ActionExecutor, WorkflowError> {
        self.executors.get(intent).map(|executor| &**executor).ok_or_else(|| {
            WorkflowError::validation(format!("no executor registered for intent {intent}"))
        })
    }

    /// Checks the preview schema's required fields, then the executor's own. Runs immediately
    /// before execution.
    pub fn validate(&self, intent: &Intent, preview: &Preview) -> Result<(), WorkflowError> {
        let executor = self.executor(intent)?;
        let from_schema = preview
            .schema()
            .fields
            .iter()
            .filter_map(|spec| spec.required.map(|message| (spec.name, message)));
        let from_executor =
            executor.required_fields().iter().map(|field| (field.name, field.message));

        for (name, message) in from_schema.chain(from_executor) {
            if !preview.has_value(name) {
                return Err(WorkflowError::validation(message));
            }
        }
        Ok(())
    }

    pub async fn dispatch(
        &self,
        intent: &Intent,
        preview: &Preview,
    ) -> Result<ResultPayload, WorkflowError> {
        let executor = self.executor(intent)?;

        if preview.kind() != intent {
            return Err(WorkflowError::validation(format!(
                "preview was built for {} but dispatch requested {intent}",
                preview.kind()
            )));
        }

        self.validate(intent, preview)?;

        info!(
            event_name = "workflow.dispatch.executing",
            intent = %intent,
            object = executor.object_name(),
            "invoking action executor"
        );

        executor.execute(preview).await.map_err(|error| {
            warn!(
                event_name = "workflow.dispatch.failed",
                intent = %intent,
                error = %error,
                "action executor failed"
            );
            WorkflowError::execution(format!("Error creating {}: {error}", executor.object_name()))
                .with_context(error.message)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use super::{ActionExecutor, Dispatcher, ExecutorError, RequiredField, ResultPayload};
    use crate::domain::intent::{FieldMap, Intent};
    use crate::domain::preview::Preview;
    use crate::errors::ErrorKind;
    use crate::preview::PreviewBuilder;

    const EMAIL_REQUIRED: &[RequiredField] = &[RequiredField::new("email", "email is required")];

    struct CountingExecutor {
        intent: Intent,
        calls: Arc<AtomicUsize>,
        fail_with: Option<&'static str>,
    }

    #[async_trait]
    impl ActionExecutor for CountingExecutor {
        fn intent(&self) -> Intent {
            self.intent.clone()
        }

        fn object_name(&self) -> &'static str {
            "contact"
        }

        fn required_fields(&self) -> &'static [RequiredField] {
            EMAIL_REQUIRED
        }

        async fn execute(&self, _preview: &Preview) -> Result<ResultPayload, ExecutorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.fail_with {
                Some(message) => Err(ExecutorError::new(message)),
                None => match json!({ "id": "contact-1" }) {
                    serde_json::Value::Object(map) => Ok(map),
                    _ => Ok(ResultPayload::new()),
                },
            }
        }
    }

    fn dispatcher(fail_with: Option<&'static str>) -> (Dispatcher, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::default().with(CountingExecutor {
            intent: Intent::CreateContact,
            calls: calls.clone(),
            fail_with,
        });
        (dispatcher, calls)
    }

    fn contact(pairs: &[(&str, &str)]) -> Preview {
        let fields: FieldMap = pairs.iter().copied().collect();
        PreviewBuilder::default().build(Intent::CreateContact, &fields, "add contact")
    }

    #[tokio::test]
    async fn blank_email_fails_validation_without_calling_executor() {
        let (dispatcher, calls) = dispatcher(None);

        let error = dispatcher
            .dispatch(&Intent::CreateContact, &contact(&[("first_name", "Ann")]))
            .await
            .expect_err("email is required");

        assert_eq!(error.kind, ErrorKind::Validation);
        assert_eq!(error.message, "email is required");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn executor_failure_is_wrapped_with_original_context() {
        let (dispatcher, calls) = dispatcher(Some("401 Unauthorized"));

        let error = dispatcher
            .dispatch(&Intent::CreateContact, &contact(&[("email", "a@x.com")]))
            .await
            .expect_err("executor fails");

        assert_eq!(error.kind, ErrorKind::Execution);
        assert_eq!(error.message, "Error creating contact: 401 Unauthorized");
        assert_eq!(error.context.as_deref(), Some("401 Unauthorized"));
        assert_eq!(calls.load(Ordering::SeqCst), 1, "no retries");
    }

    #[tokio::test]
    async fn unregistered_intent_is_a_validation_error() {
        let (dispatcher, _) = dispatcher(None);
        let fields: FieldMap = [("deal_name", "X")].into_iter().collect();
        let preview = PreviewBuilder::default().build(Intent::CreateDeal, &fields, "deal");

        let error = dispatcher.dispatch(&Intent::CreateDeal, &preview).await.expect_err("missing");

        assert_eq!(error.kind, ErrorKind::Validation);
        assert_eq!(error.message, "no executor registered for intent create_deal");
        assert!(dispatcher.supports(&Intent::CreateContact));
    }

    #[tokio::test]
    async fn successful_dispatch_returns_payload() {
        let (dispatcher, calls) = dispatcher(None);

        let payload = dispatcher
            .dispatch(&Intent::CreateContact, &contact(&[("email", "a@x.com")]))
            .await
            .expect("dispatch succeeds");

        assert_eq!(payload.get("id"), Some(&json!("contact-1")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn deal_without_name_fails_validation() {
        let dispatcher = Dispatcher::default().with(CountingExecutor {
            intent: Intent::CreateDeal,
            calls: Arc::default(),
            fail_with: None,
        });
        let fields: FieldMap = [("amount", "100")].into_iter().collect();
        let preview = PreviewBuilder::default().build(Intent::CreateDeal, &fields, "deal");

        let error =
            dispatcher.validate(&Intent::CreateDeal, &preview).expect_err("deal name is required");
        assert_eq!(error.message, "deal name is required");
    }

    #[tokio::test]
    async fn executor_requirements_apply_without_a_preview_template() {
        let (dispatcher, calls) = dispatcher(None);
        let fields: FieldMap = [("first_name", "Ann")].into_iter().collect();
        let preview = PreviewBuilder::empty().build(Intent::CreateContact, &fields, "add Ann");

        let error = dispatcher
            .dispatch(&Intent::CreateContact, &preview)
            .await
            .expect_err("email is required");

        assert_eq!(error.kind, ErrorKind::Validation);
        assert_eq!(error.message, "email is required");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn required_field_may_arrive_as_an_extra_property() {
        let (dispatcher, calls) = dispatcher(None);
        let fields: FieldMap = [("email", "a@x.com")].into_iter().collect();
        let preview = PreviewBuilder::empty().build(Intent::CreateContact, &fields, "add a@x.com");

        dispatcher.dispatch(&Intent::CreateContact, &preview).await.expect("dispatch succeeds");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
