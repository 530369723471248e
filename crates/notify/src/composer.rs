use std::collections::{BTreeMap, HashMap};

use dealflow_core::dispatch::ResultPayload;
use dealflow_core::domain::intent::{FieldMap, Intent};
use dealflow_core::flows::run_state::deal_name;
use dealflow_core::{format_currency, parse_amount, NotificationPayload};
use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;

const NOT_SPECIFIED: &str = "Not specified";
const NOT_PROVIDED: &str = "Not provided";

const TEMPLATES: [(&str, &str); 8] = [
    ("contact_created.txt", include_str!("../templates/contact_created.txt")),
    ("contact_created.html", include_str!("../templates/contact_created.html")),
    ("deal_created.txt", include_str!("../templates/deal_created.txt")),
    ("deal_created.html", include_str!("../templates/deal_created.html")),
    ("workflow_completed.txt", include_str!("../templates/workflow_completed.txt")),
    ("workflow_completed.html", include_str!("../templates/workflow_completed.html")),
    ("workflow_error.txt", include_str!("../templates/workflow_error.txt")),
    ("workflow_error.html", include_str!("../templates/workflow_error.html")),
];

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("template error: {0}")]
    Template(#[from] tera::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub html_body: String,
}

/// Renders notification payloads into plain-text and HTML email bodies.
#[derive(Clone, Debug)]
pub struct NotificationComposer {
    tera: Tera,
}

impl NotificationComposer {
    pub fn new() -> Result<Self, ComposeError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES)?;
        register_template_filters(&mut tera);
        Ok(Self { tera })
    }

    pub fn compose(
        &self,
        to: &str,
        payload: &NotificationPayload,
    ) -> Result<EmailMessage, ComposeError> {
        let (template, subject, context) = match payload {
            NotificationPayload::Success { intent, fields, result } => {
                success_context(intent, fields, result)
            }
            NotificationPayload::Error { message, context } => {
                let mut ctx = Context::new();
                ctx.insert("message", message);
                ctx.insert("context", or_placeholder(context, NOT_PROVIDED));
                ("workflow_error", "Error in Dealflow Workflow".to_string(), ctx)
            }
        };

        Ok(EmailMessage {
            to: to.to_string(),
            subject,
            body: self.tera.render(&format!("{template}.txt"), &context)?,
            html_body: self.tera.render(&format!("{template}.html"), &context)?,
        })
    }
}

fn success_context(
    intent: &Intent,
    fields: &FieldMap,
    result: &ResultPayload,
) -> (&'static str, String, Context) {
    let mut ctx = Context::new();
    match intent {
        Intent::CreateContact => {
            let name = format!("{} {}", fields.text("first_name"), fields.text("last_name"));
            ctx.insert("email", &fields.text("email"));
            ctx.insert("name", or_placeholder(name.trim(), NOT_PROVIDED));
            ("contact_created", "New Contact Created in CRM".to_string(), ctx)
        }
        Intent::CreateDeal => {
            let name = deal_name(fields, Some(result));
            ctx.insert("deal_name", or_placeholder(&name, NOT_SPECIFIED));
            ctx.insert("amount", &fields.text("amount"));
            ctx.insert(
                "contact_email",
                fields.non_blank("contact_email").unwrap_or(NOT_SPECIFIED),
            );
            ("deal_created", "New Deal Created in CRM".to_string(), ctx)
        }
        Intent::Unknown(label) => {
            let details: BTreeMap<&str, &str> = fields.iter().collect();
            ctx.insert("workflow_type", label);
            ctx.insert("details", &details);
            ("workflow_completed", format!("Workflow Completed: {label}"), ctx)
        }
    }
}

fn or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    if value.trim().is_empty() {
        placeholder
    } else {
        value
    }
}

fn register_template_filters(tera: &mut Tera) {
    tera.register_filter("currency", tera_currency_filter);
}

/// `{{ amount | currency }}` renders `$5,000.00`, or "Not specified" for a missing amount.
fn tera_currency_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let amount = match value {
        tera::Value::Number(n) => n.as_f64(),
        tera::Value::String(raw) => parse_amount(raw),
        _ => None,
    };
    let rendered = amount.map(format_currency).unwrap_or_else(|| NOT_SPECIFIED.to_string());
    Ok(tera::Value::String(rendered))
}

#[cfg(test)]
mod tests {
    use dealflow_core::{FieldMap, Intent, NotificationPayload, ResultPayload};
    use serde_json::json;

    use super::NotificationComposer;

    fn composer() -> NotificationComposer {
        NotificationComposer::new().expect("embedded templates parse")
    }

    fn success(intent: Intent, fields: &[(&str, &str)], result: ResultPayload) -> NotificationPayload {
        let fields: FieldMap = fields.iter().copied().collect();
        NotificationPayload::Success { intent, fields, result }
    }

    #[test]
    fn contact_email_lists_email_and_joined_name() {
        let payload = success(
            Intent::CreateContact,
            &[("email", "ann@acme.io"), ("first_name", "Ann"), ("last_name", "Lee")],
            ResultPayload::new(),
        );

        let message = composer().compose("ops@acme.io", &payload).expect("compose");

        assert_eq!(message.to, "ops@acme.io");
        assert_eq!(message.subject, "New Contact Created in CRM");
        assert!(message.body.contains("- Email: ann@acme.io"));
        assert!(message.body.contains("- Name: Ann Lee"));
        assert!(message.html_body.contains("<strong>Name:</strong> Ann Lee"));
    }

    #[test]
    fn contact_without_name_says_not_provided() {
        let payload = success(Intent::CreateContact, &[("email", "a@x.com")], ResultPayload::new());

        let message = composer().compose("ops@acme.io", &payload).expect("compose");

        assert!(message.body.contains("- Name: Not provided"));
    }

    #[test]
    fn deal_email_formats_amount_and_falls_back_to_crm_name() {
        let mut result = ResultPayload::new();
        result.insert("properties".into(), json!({ "dealname": "Acme Renewal" }));
        let payload = success(
            Intent::CreateDeal,
            &[("amount", "$5000"), ("contact_email", "buyer@acme.io")],
            result,
        );

        let message = composer().compose("ops@acme.io", &payload).expect("compose");

        assert_eq!(message.subject, "New Deal Created in CRM");
        assert!(message.body.contains("- Deal Name: Acme Renewal"));
        assert!(message.body.contains("- Amount: $5,000.00"));
        assert!(message.body.contains("- Associated Contact: buyer@acme.io"));
    }

    #[test]
    fn deal_without_amount_or_contact_says_not_specified() {
        let payload =
            success(Intent::CreateDeal, &[("deal_name", "Pilot")], ResultPayload::new());

        let message = composer().compose("ops@acme.io", &payload).expect("compose");

        assert!(message.body.contains("- Amount: Not specified"));
        assert!(message.body.contains("- Associated Contact: Not specified"));
    }

    #[test]
    fn error_email_carries_message_and_escapes_html() {
        let payload = NotificationPayload::Error {
            message: "Error creating deal: HTTP 400 <bad>".into(),
            context: "User input: make a deal".into(),
        };

        let message = composer().compose("ops@acme.io", &payload).expect("compose");

        assert_eq!(message.subject, "Error in Dealflow Workflow");
        assert!(message.body.contains("- Message: Error creating deal: HTTP 400 <bad>"));
        assert!(message.body.contains("- Context: User input: make a deal"));
        assert!(message.html_body.contains("HTTP 400 &lt;bad&gt;"));
    }

    #[test]
    fn other_intents_use_the_generic_completion_email() {
        let payload = success(
            Intent::parse("log_call"),
            &[("contact", "ann@acme.io"), ("minutes", "12")],
            ResultPayload::new(),
        );

        let message = composer().compose("ops@acme.io", &payload).expect("compose");

        assert_eq!(message.subject, "Workflow Completed: log_call");
        assert!(message.body.contains("- Type: log_call"));
        assert!(message.body.contains("- minutes: 12"));
    }
}
