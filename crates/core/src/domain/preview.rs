use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::intent::Intent;
use crate::domain::money::{format_currency, parse_amount};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub field_type: FieldType,
    /// Validation message reported at dispatch time when the field is blank.
    pub required: Option<&'static str>,
}

impl FieldSpec {
    pub const fn text(name: &'static str, label: &'static str) -> Self {
        Self { name, label, field_type: FieldType::Text, required: None }
    }

    pub const fn number(name: &'static str, label: &'static str) -> Self {
        Self { name, label, field_type: FieldType::Number, required: None }
    }

    pub const fn required(self, message: &'static str) -> Self {
        Self { required: Some(message), ..self }
    }
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct PreviewSchema {
    pub title: &'static str,
    pub fields: &'static [FieldSpec],
}

impl PreviewSchema {
    pub fn spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|spec| spec.name == name)
    }
}

pub static UNSTRUCTURED_SCHEMA: PreviewSchema =
    PreviewSchema { title: "UNRECOGNIZED REQUEST", fields: &[] };

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Absent,
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(value) => value.trim().is_empty(),
            Self::Number(_) => false,
            Self::Absent => true,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }
}

/// Effect of a single field edit on a preview.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EditEffect {
    Replaced,
    KeptEmpty,
    KeptInvalid { reason: String },
}

/// Editable staging copy of the action a run is about to perform.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Preview {
    kind: Intent,
    #[serde(skip)]
    schema: &'static PreviewSchema,
    fields: BTreeMap<String, FieldValue>,
    properties: BTreeMap<String, String>,
    origin_text: String,
}

impl Preview {
    pub(crate) fn new(
        kind: Intent,
        schema: &'static PreviewSchema,
        fields: BTreeMap<String, FieldValue>,
        properties: BTreeMap<String, String>,
        origin_text: impl Into<String>,
    ) -> Self {
        Self { kind, schema, fields, properties, origin_text: origin_text.into() }
    }

    pub fn kind(&self) -> &Intent {
        &self.kind
    }

    pub fn schema(&self) -> &'static PreviewSchema {
        self.schema
    }

    pub fn origin_text(&self) -> &str {
        &self.origin_text
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Text value of a field; blank when the field is absent or numeric.
    pub fn text(&self, name: &str) -> &str {
        self.get(name).and_then(FieldValue::as_text).unwrap_or_default()
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(FieldValue::as_number)
    }

    pub fn is_blank(&self, name: &str) -> bool {
        self.get(name).map(FieldValue::is_blank).unwrap_or(true)
    }

    /// Whether `name` holds a non-blank value, either as a typed field or an extra property.
    pub fn has_value(&self, name: &str) -> bool {
        !self.is_blank(name)
            || self.properties.get(name).is_some_and(|value| !value.trim().is_empty())
    }

    pub(crate) fn replace_if_nonempty(&mut self, field: &str, value: &str) -> EditEffect {
        let value = value.trim();
        if value.is_empty() {
            return EditEffect::KeptEmpty;
        }

        match self.schema.spec(field).map(|spec| spec.field_type) {
            Some(FieldType::Number) => match parse_amount(value) {
                Some(number) => {
                    self.fields.insert(field.to_string(), FieldValue::Number(number));
                    EditEffect::Replaced
                }
                None => EditEffect::KeptInvalid { reason: format!("`{value}` is not a number") },
            },
            Some(FieldType::Text) => {
                self.fields.insert(field.to_string(), FieldValue::text(value));
                EditEffect::Replaced
            }
            None => {
                self.properties.insert(field.to_string(), value.to_string());
                EditEffect::Replaced
            }
        }
    }

    /// Human-readable summary used by confirmation surfaces.
    pub fn render(&self) -> String {
        let mut lines = vec![format!("{}:", self.schema.title), String::new()];

        for spec in self.schema.fields {
            let shown = match (spec.field_type, self.get(spec.name)) {
                (FieldType::Number, Some(FieldValue::Number(value))) => format_currency(*value),
                (FieldType::Number, _) => "Not specified".to_string(),
                (FieldType::Text, Some(value)) if !value.is_blank() => {
                    value.as_text().unwrap_or_default().to_string()
                }
                (FieldType::Text, _) => "Not provided".to_string(),
            };
            lines.push(format!("{:<16}{shown}", format!("{}:", spec.label)));
        }

        if !self.properties.is_empty() {
            lines.push(String::new());
            lines.push("Additional Properties:".to_string());
            for (key, value) in &self.properties {
                lines.push(format!("   {key}: {value}"));
            }
        }

        lines.join("\n")
    }
}
