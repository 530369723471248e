use std::collections::BTreeMap;

use crate::domain::intent::{FieldMap, Intent};
use crate::domain::money::parse_amount;
use crate::domain::preview::{FieldSpec, FieldValue, PreviewSchema};
use crate::preview::PreviewTemplate;

pub const DEFAULT_DEAL_STAGE: &str = "appointmentscheduled";

pub static DEAL_SCHEMA: PreviewSchema = PreviewSchema {
    title: "DEAL TO BE CREATED",
    fields: &[
        FieldSpec::text("deal_name", "Deal Name").required("deal name is required"),
        FieldSpec::number("amount", "Amount"),
        FieldSpec::text("stage", "Stage"),
        FieldSpec::text("close_date", "Close Date"),
        FieldSpec::text("contact_name", "Contact"),
        FieldSpec::text("contact_email", "Contact Email"),
        FieldSpec::text("company", "Company"),
    ],
};

#[derive(Clone, Debug, Default)]
pub struct DealTemplate;

impl PreviewTemplate for DealTemplate {
    fn intent(&self) -> Intent {
        Intent::CreateDeal
    }

    fn schema(&self) -> &'static PreviewSchema {
        &DEAL_SCHEMA
    }

    fn consumed_keys(&self) -> &'static [&'static str] {
        &[
            "deal_name",
            "name",
            "amount",
            "stage",
            "close_date",
            "contact_email",
            "email",
            "contact_name",
            "first_name",
            "last_name",
            "company",
        ]
    }

    fn populate(&self, fields: &FieldMap) -> BTreeMap<String, FieldValue> {
        let amount = fields
            .non_blank("amount")
            .and_then(parse_amount)
            .map(FieldValue::Number)
            .unwrap_or(FieldValue::Absent);
        let stage = fields.non_blank("stage").unwrap_or(DEFAULT_DEAL_STAGE);
        let contact_email =
            fields.non_blank("contact_email").or_else(|| fields.non_blank("email")).unwrap_or("");
        let contact_name = match fields.non_blank("contact_name") {
            Some(name) => name.to_string(),
            None => full_name(fields),
        };
        let company = fields.text("company");
        let deal_name = match fields.non_blank("deal_name").or_else(|| fields.non_blank("name")) {
            Some(name) => name.to_string(),
            None => synthesize_deal_name(&contact_name, company.trim()),
        };

        BTreeMap::from([
            ("deal_name".to_string(), FieldValue::text(deal_name)),
            ("amount".to_string(), amount),
            ("stage".to_string(), FieldValue::text(stage)),
            ("close_date".to_string(), FieldValue::text(fields.text("close_date"))),
            ("contact_name".to_string(), FieldValue::text(contact_name)),
            ("contact_email".to_string(), FieldValue::text(contact_email)),
            ("company".to_string(), FieldValue::text(company)),
        ])
    }
}

fn full_name(fields: &FieldMap) -> String {
    format!(
        "{} {}",
        fields.non_blank("first_name").unwrap_or(""),
        fields.non_blank("last_name").unwrap_or("")
    )
    .trim()
    .to_string()
}

/// Left blank when there is nothing to name the deal after, so dispatch can ask for one.
fn synthesize_deal_name(contact_name: &str, company: &str) -> String {
    match (contact_name.is_empty(), company.is_empty()) {
        (false, false) => format!("Deal with {contact_name} from {company}"),
        (false, true) => format!("Deal with {contact_name}"),
        (true, false) => format!("Deal with {company}"),
        (true, true) => String::new(),
    }
}
