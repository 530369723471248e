//! Preview construction.
//!
//! Each intent contributes a [`PreviewTemplate`]: the schema shown to the human plus the rules
//! that turn raw extracted fields into typed values. Building never fails; anything missing is
//! left blank and caught later by dispatch-time validation.

pub mod contact;
pub mod deal;

use std::collections::{BTreeMap, HashMap};

use crate::domain::intent::{FieldMap, Intent};
use crate::domain::preview::{FieldValue, Preview, PreviewSchema, UNSTRUCTURED_SCHEMA};

pub use contact::ContactTemplate;
pub use deal::DealTemplate;

pub trait PreviewTemplate: Send + Sync {
    fn intent(&self) -> Intent;
    fn schema(&self) -> &'static PreviewSchema;
    /// Extraction keys this template reads. Anything else is forwarded as an opaque property.
    fn consumed_keys(&self) -> &'static [&'static str];
    fn populate(&self, fields: &FieldMap) -> BTreeMap<String, FieldValue>;
}

pub struct PreviewBuilder {
    templates: HashMap<Intent, Box<dyn PreviewTemplate>>,
}

impl PreviewBuilder {
    pub fn empty() -> Self {
        Self { templates: HashMap::new() }
    }

    pub fn register<T>(&mut self, template: T)
    where
        T: PreviewTemplate + 'static,
    {
        self.templates.insert(template.intent(), Box::new(template));
    }

    pub fn supports(&self, intent: &Intent) -> bool {
        self.templates.contains_key(intent)
    }

    pub fn build(&self, intent: Intent, fields: &FieldMap, origin_text: &str) -> Preview {
        let Some(template) = self.templates.get(&intent) else {
            let properties =
                fields.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect();
            return Preview::new(
                intent,
                &UNSTRUCTURED_SCHEMA,
                BTreeMap::new(),
                properties,
                origin_text,
            );
        };

        let schema = template.schema();
        let consumed = template.consumed_keys();
        let properties = fields
            .iter()
            .filter(|(key, _)| !consumed.contains(key) && schema.spec(key).is_none())
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

        Preview::new(intent, schema, template.populate(fields), properties, origin_text)
    }
}

impl Default for PreviewBuilder {
    fn default() -> Self {
        let mut builder = Self::empty();
        builder.register(ContactTemplate);
        builder.register(DealTemplate);
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::PreviewBuilder;
    use crate::domain::intent::{FieldMap, Intent};

    #[test]
    fn build_never_fails_and_keeps_requested_kind() {
        let builder = PreviewBuilder::default();
        let samples: Vec<FieldMap> = vec![
            FieldMap::new(),
            [("email", "a@x.com")].into_iter().collect(),
            [("amount", "not-a-number"), ("stage", "")].into_iter().collect(),
            [("anything", "goes"), ("deal_name", "Big One")].into_iter().collect(),
        ];
        let intents = [
            Intent::CreateContact,
            Intent::CreateDeal,
            Intent::Unknown("unknown".to_string()),
            Intent::Unknown("archive_ticket".to_string()),
        ];

        for intent in &intents {
            for fields in &samples {
                let preview = builder.build(intent.clone(), fields, "origin");
                assert_eq!(preview.kind(), intent);
                assert_eq!(preview.origin_text(), "origin");
            }
        }
    }

    #[test]
    fn unregistered_intent_forwards_everything_as_properties() {
        let builder = PreviewBuilder::empty();
        let fields: FieldMap = [("email", "a@x.com"), ("ticket", "T-9")].into_iter().collect();

        let preview = builder.build(Intent::CreateContact, &fields, "add a@x.com");

        assert!(preview.fields().is_empty());
        assert_eq!(preview.properties().len(), 2);
        assert!(!builder.supports(&Intent::CreateContact));
    }
}
