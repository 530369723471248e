use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::dispatch::ResultPayload;
use crate::domain::intent::{FieldMap, Intent};
use crate::domain::preview::{FieldValue, Preview};
use crate::errors::{ErrorKind, WorkflowError};
use crate::flows::states::WorkflowStage;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    #[default]
    Undetermined,
    Approved,
    Rejected,
}

/// Everything one run accumulates. Owned by a single `process` call.
///
/// There is no way to clear a recorded error, and [`RunState::into_result`] consumes the state,
/// so a finished run cannot be touched again.
#[derive(Clone, Debug)]
pub struct RunState {
    run_id: String,
    stage: WorkflowStage,
    origin_text: String,
    intent: Option<Intent>,
    fields: FieldMap,
    preview: Option<Preview>,
    confirmation: ConfirmationStatus,
    edits: u32,
    results: BTreeMap<Intent, ResultPayload>,
    last_result: Option<ResultPayload>,
    notification_sent: Option<bool>,
    error: Option<WorkflowError>,
}

impl RunState {
    pub fn new(origin_text: impl Into<String>) -> Self {
        Self::with_run_id(Uuid::new_v4().to_string(), origin_text)
    }

    pub fn with_run_id(run_id: impl Into<String>, origin_text: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            stage: WorkflowStage::ParseInput,
            origin_text: origin_text.into(),
            intent: None,
            fields: FieldMap::new(),
            preview: None,
            confirmation: ConfirmationStatus::Undetermined,
            edits: 0,
            results: BTreeMap::new(),
            last_result: None,
            notification_sent: None,
            error: None,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn stage(&self) -> WorkflowStage {
        self.stage
    }

    pub fn origin_text(&self) -> &str {
        &self.origin_text
    }

    pub fn intent(&self) -> Option<&Intent> {
        self.intent.as_ref()
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn preview(&self) -> Option<&Preview> {
        self.preview.as_ref()
    }

    pub fn confirmation(&self) -> ConfirmationStatus {
        self.confirmation
    }

    pub fn edits(&self) -> u32 {
        self.edits
    }

    pub fn result_for(&self, intent: &Intent) -> Option<&ResultPayload> {
        self.results.get(intent)
    }

    pub fn last_result(&self) -> Option<&ResultPayload> {
        self.last_result.as_ref()
    }

    pub fn notification_sent(&self) -> Option<bool> {
        self.notification_sent
    }

    pub fn error(&self) -> Option<&WorkflowError> {
        self.error.as_ref()
    }

    pub(crate) fn set_stage(&mut self, stage: WorkflowStage) {
        self.stage = stage;
    }

    pub(crate) fn set_extraction(&mut self, intent: Intent, fields: FieldMap) {
        self.intent = Some(intent);
        self.fields = fields;
    }

    pub(crate) fn set_preview(&mut self, preview: Preview) {
        self.preview = Some(preview);
    }

    pub(crate) fn take_preview(&mut self) -> Option<Preview> {
        self.preview.take()
    }

    pub(crate) fn set_confirmation(&mut self, status: ConfirmationStatus, edits: u32) {
        self.confirmation = status;
        self.edits = edits;
    }

    pub(crate) fn record_result(&mut self, intent: Intent, payload: ResultPayload) {
        self.last_result = Some(payload.clone());
        self.results.insert(intent, payload);
    }

    pub(crate) fn set_notification_sent(&mut self, sent: bool) {
        self.notification_sent = Some(sent);
    }

    /// Keeps the first error. Later ones are returned so the caller can log them.
    pub(crate) fn record_error(&mut self, error: WorkflowError) -> Option<WorkflowError> {
        if self.error.is_some() {
            return Some(error);
        }
        self.error = Some(error);
        None
    }

    /// Extracted fields overlaid with whatever the human confirmed in the preview.
    pub fn confirmed_fields(&self) -> FieldMap {
        let mut merged = self.fields.clone();
        if let Some(preview) = &self.preview {
            for (name, value) in preview.fields() {
                match value {
                    FieldValue::Text(text) if !text.trim().is_empty() => {
                        merged.insert(name.as_str(), text.as_str())
                    }
                    FieldValue::Number(number) => merged.insert(name.as_str(), number.to_string()),
                    _ => {}
                }
            }
            for (name, value) in preview.properties() {
                merged.insert(name.as_str(), value.as_str());
            }
        }
        merged
    }

    pub fn success_message(&self) -> String {
        let fields = self.confirmed_fields();
        match self.intent.as_ref() {
            Some(Intent::CreateContact) => {
                format!("Contact created successfully for {}", fields.text("email"))
            }
            Some(Intent::CreateDeal) => {
                format!("Deal created successfully: {}", deal_name(&fields, self.last_result()))
            }
            Some(intent) => format!("{intent} completed successfully"),
            None => "Workflow completed".to_owned(),
        }
    }

    pub fn into_result(self) -> WorkflowResult {
        let succeeded = self.error.is_none()
            && self.confirmation == ConfirmationStatus::Approved
            && self.last_result.is_some();

        if !succeeded {
            let error = self.error.unwrap_or_else(|| {
                WorkflowError::execution(format!("run ended in {} without a result", self.stage))
            });
            return WorkflowResult {
                success: false,
                message: format!("Workflow failed: {}", error.message),
                data: None,
                error: Some(error.message),
                error_kind: Some(error.kind),
            };
        }

        let message = self.success_message();
        let fields = self.confirmed_fields();
        let data = json!({
            "run_id": self.run_id,
            "result": self.last_result.map(Value::Object).unwrap_or(Value::Null),
            "notification_sent": self.notification_sent.unwrap_or(false),
            "fields": fields,
        });
        WorkflowResult { success: true, message, data: Some(data), error: None, error_kind: None }
    }
}

/// `deal_name`, else `name`, else what the CRM echoed back.
pub fn deal_name(fields: &FieldMap, result: Option<&ResultPayload>) -> String {
    fields
        .non_blank("deal_name")
        .or_else(|| fields.non_blank("name"))
        .map(str::to_owned)
        .or_else(|| {
            result
                .and_then(|payload| payload.get("properties"))
                .and_then(|properties| properties.get("dealname"))
                .and_then(Value::as_str)
                .map(str::to_owned)
        })
        .unwrap_or_default()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub success: bool,
    pub message: String,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
}
