use std::collections::BTreeMap;

use crate::domain::intent::{FieldMap, Intent};
use crate::domain::preview::{FieldSpec, FieldValue, PreviewSchema};
use crate::preview::PreviewTemplate;

pub static CONTACT_SCHEMA: PreviewSchema = PreviewSchema {
    title: "CONTACT TO BE CREATED",
    fields: &[
        FieldSpec::text("email", "Email").required("email is required"),
        FieldSpec::text("first_name", "First Name"),
        FieldSpec::text("last_name", "Last Name"),
        FieldSpec::text("phone", "Phone"),
        FieldSpec::text("company", "Company"),
    ],
};

#[derive(Clone, Debug, Default)]
pub struct ContactTemplate;

impl PreviewTemplate for ContactTemplate {
    fn intent(&self) -> Intent {
        Intent::CreateContact
    }

    fn schema(&self) -> &'static PreviewSchema {
        &CONTACT_SCHEMA
    }

    fn consumed_keys(&self) -> &'static [&'static str] {
        &["email", "first_name", "last_name", "phone", "company"]
    }

    fn populate(&self, fields: &FieldMap) -> BTreeMap<String, FieldValue> {
        CONTACT_SCHEMA
            .fields
            .iter()
            .map(|spec| (spec.name.to_string(), FieldValue::text(fields.text(spec.name))))
            .collect()
    }
}
