//! Intent extraction backed by a language model.
//!
//! The model is asked for two lines and nothing else:
//!
//! ```text
//! INTENT: create_contact
//! ENTITIES: email:john@example.com, first_name:John, company:Acme Corp
//! ```
//!
//! Parsing is deliberately forgiving. Anything the model adds around those lines is ignored.

use async_trait::async_trait;
use dealflow_core::domain::intent::{FieldMap, Intent};
use dealflow_core::extract::{EntityExtractor, Extraction, ExtractionError};
use tracing::{info, warn};

use crate::llm::LlmClient;

pub const CLASSIFICATION_PROMPT: &str = "\
You are an assistant that turns requests into CRM operations.

Decide the intent (create_contact, create_deal, or unknown) and extract the relevant entities:
names, emails, phone numbers, companies, deal names, amounts, stages and close dates.
Use snake_case keys such as email, first_name, last_name, phone, company, deal_name, amount,
stage, close_date and contact_email.

Reply in exactly this format:
INTENT: <intent>
ENTITIES: <key:value pairs separated by commas>

Example:
INTENT: create_contact
ENTITIES: email:john@example.com, first_name:John, last_name:Doe, company:Acme Corp";

pub struct LlmEntityExtractor<C> {
    client: C,
}

impl<C> LlmEntityExtractor<C>
where
    C: LlmClient,
{
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn prompt_for(text: &str) -> String {
        format!("{CLASSIFICATION_PROMPT}\n\nUser input: {text}")
    }
}

#[async_trait]
impl<C> EntityExtractor for LlmEntityExtractor<C>
where
    C: LlmClient,
{
    async fn extract(&self, text: &str) -> Result<Extraction, ExtractionError> {
        let reply = self.client.complete(&Self::prompt_for(text)).await.map_err(|error| {
            warn!(event_name = "agent.extract.failed", error = %error, "llm call failed");
            ExtractionError::new(format!("Error parsing input: {error}"))
        })?;

        let extraction = parse_reply(&reply);
        info!(
            event_name = "agent.extract.parsed",
            intent = %extraction.intent,
            field_count = extraction.fields.len(),
            "parsed model reply"
        );
        Ok(extraction)
    }
}

/// Reads the `INTENT:` and `ENTITIES:` lines out of a model reply.
pub fn parse_reply(reply: &str) -> Extraction {
    let mut intent = None;
    let mut fields = FieldMap::new();

    for line in reply.lines().map(str::trim) {
        if let Some(label) = line.strip_prefix("INTENT:") {
            intent = Some(Intent::parse(label));
        } else if let Some(entities) = line.strip_prefix("ENTITIES:") {
            for (key, value) in parse_entities(entities) {
                fields.insert(key, value);
            }
        }
    }

    Extraction { intent: intent.unwrap_or_else(|| Intent::parse("unknown")), fields }
}

fn parse_entities(entities: &str) -> impl Iterator<Item = (&str, &str)> {
    entities.split(',').filter_map(|pair| {
        let (key, value) = pair.split_once(':')?;
        let key = key.trim();
        (!key.is_empty()).then_some((key, value.trim()))
    })
}
