use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use dealflow_agent::extractor::LlmEntityExtractor;
use dealflow_agent::llm::LlmClient;
use dealflow_core::{Decision, Dispatcher, ScriptedConfirmation, WorkflowController};
use dealflow_crm::{ContactExecutor, CrmObjects, DealExecutor, HubspotError};
use dealflow_notify::{EmailNotifier, InMemoryTransport};
use serde_json::{json, Map, Value};

struct CannedLlm(&'static str);

#[async_trait]
impl LlmClient for CannedLlm {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Ok(self.0.to_string())
    }
}

#[derive(Default)]
struct FakeHubspot {
    contacts: Vec<Map<String, Value>>,
    calls: Mutex<Vec<String>>,
}

impl FakeHubspot {
    fn with_contact(id: &str) -> Self {
        let contact = json!({ "id": id }).as_object().cloned().unwrap_or_default();
        Self { contacts: vec![contact], calls: Mutex::default() }
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("call log").push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("call log").clone()
    }
}

fn created(id: &str, properties: Map<String, Value>) -> Map<String, Value> {
    json!({ "id": id, "properties": properties }).as_object().cloned().unwrap_or_default()
}

#[async_trait]
impl CrmObjects for FakeHubspot {
    async fn create_contact(
        &self,
        properties: Map<String, Value>,
    ) -> Result<Map<String, Value>, HubspotError> {
        self.record(format!("create_contact {}", properties["email"]));
        Ok(created("c-1", properties))
    }

    async fn create_deal(
        &self,
        properties: Map<String, Value>,
    ) -> Result<Map<String, Value>, HubspotError> {
        self.record(format!("create_deal {}", properties["dealname"]));
        Ok(created("d-1", properties))
    }

    async fn search_contacts(&self, query: &str) -> Result<Vec<Map<String, Value>>, HubspotError> {
        self.record(format!("search {query}"));
        Ok(self.contacts.clone())
    }

    async fn associate_deal_with_contact(
        &self,
        deal_id: &str,
        contact_id: &str,
    ) -> Result<(), HubspotError> {
        self.record(format!("associate {deal_id} {contact_id}"));
        Ok(())
    }
}

type Controller = WorkflowController<
    LlmEntityExtractor<CannedLlm>,
    ScriptedConfirmation,
    EmailNotifier<InMemoryTransport>,
>;

struct Fixture {
    controller: Controller,
    crm: Arc<FakeHubspot>,
    outbox: InMemoryTransport,
}

fn fixture(reply: &'static str, decisions: Vec<Decision>, crm: FakeHubspot) -> Fixture {
    let crm = Arc::new(crm);
    let outbox = InMemoryTransport::new();
    let notifier =
        EmailNotifier::new(outbox.clone(), Some("ops@acme.io".into())).expect("notifier");
    let dispatcher = Dispatcher::default()
        .with(ContactExecutor::new(Arc::clone(&crm)))
        .with(DealExecutor::new(Arc::clone(&crm)));
    let controller = WorkflowController::new(
        LlmEntityExtractor::new(CannedLlm(reply)),
        ScriptedConfirmation::new(decisions),
        notifier,
        dispatcher,
    );
    Fixture { controller, crm, outbox }
}

#[tokio::test]
async fn approved_deal_is_created_linked_and_announced() {
    let fixture = fixture(
        "INTENT: create_deal\nENTITIES: deal_name:Acme Renewal, amount:$5000, contact_email:buyer@acme.io",
        vec![Decision::Approve],
        FakeHubspot::with_contact("c-9"),
    );

    let result = fixture.controller.process("Create a $5000 deal for Acme").await;

    assert!(result.success, "{result:?}");
    assert_eq!(result.message, "Deal created successfully: Acme Renewal");
    assert_eq!(
        fixture.crm.calls(),
        vec![
            "create_deal \"Acme Renewal\"".to_string(),
            "search buyer@acme.io".to_string(),
            "associate d-1 c-9".to_string(),
        ]
    );

    let sent = fixture.outbox.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "New Deal Created in CRM");
    assert!(sent[0].body.contains("- Amount: $5,000.00"), "{}", sent[0].body);
    assert!(sent[0].body.contains("- Associated Contact: buyer@acme.io"));
}

#[tokio::test]
async fn edited_contact_email_is_what_gets_created() {
    let fixture = fixture(
        "INTENT: create_contact\nENTITIES: email:ann@old.io, first_name:Ann, last_name:Lee",
        vec![Decision::edit("email", "ann@acme.io"), Decision::Approve],
        FakeHubspot::default(),
    );

    let result = fixture.controller.process("Add Ann Lee").await;

    assert!(result.success, "{result:?}");
    assert_eq!(result.message, "Contact created successfully for ann@acme.io");
    assert_eq!(fixture.crm.calls(), vec!["create_contact \"ann@acme.io\"".to_string()]);
    assert_eq!(fixture.controller.surface().presented().len(), 2);

    let sent = fixture.outbox.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.contains("- Email: ann@acme.io"));
    assert!(sent[0].body.contains("- Name: Ann Lee"));
}

#[tokio::test]
async fn rejected_preview_sends_one_error_email_and_touches_nothing() {
    let fixture = fixture(
        "INTENT: create_contact\nENTITIES: email:ann@acme.io",
        vec![Decision::Reject],
        FakeHubspot::default(),
    );

    let result = fixture.controller.process("Add ann@acme.io").await;

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("User cancelled the operation"));
    assert!(fixture.crm.calls().is_empty());

    let sent = fixture.outbox.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Error in Dealflow Workflow");
    assert!(sent[0].body.contains("- Context: User input: Add ann@acme.io"));
}

#[tokio::test]
async fn unknown_intent_is_never_previewed() {
    let fixture = fixture(
        "INTENT: schedule_meeting\nENTITIES: ",
        vec![Decision::Approve],
        FakeHubspot::default(),
    );

    let result = fixture.controller.process("Book a call with Ann").await;

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Unknown intent: schedule_meeting"));
    assert!(fixture.controller.surface().presented().is_empty());
    assert_eq!(fixture.outbox.sent().len(), 1);
}
