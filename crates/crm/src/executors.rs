//! Contact and deal executors. Each one turns an approved preview into HubSpot properties.

use std::sync::Arc;

use async_trait::async_trait;
use dealflow_core::dispatch::{ActionExecutor, ExecutorError, RequiredField, ResultPayload};
use dealflow_core::domain::intent::Intent;
use dealflow_core::domain::preview::Preview;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::client::{CrmObjects, HubspotClient};

const CONTACT_REQUIRED: &[RequiredField] = &[RequiredField::new("email", "email is required")];
const DEAL_REQUIRED: &[RequiredField] =
    &[RequiredField::new("deal_name", "deal name is required")];

fn put_non_blank(properties: &mut Map<String, Value>, key: &str, value: &str) {
    let value = value.trim();
    if !value.is_empty() {
        properties.insert(key.to_string(), Value::from(value));
    }
}

fn put_extra(properties: &mut Map<String, Value>, preview: &Preview) {
    for (key, value) in preview.properties() {
        properties.insert(key.clone(), Value::from(value.as_str()));
    }
}

pub fn contact_properties(preview: &Preview) -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("email".to_string(), Value::from(preview.text("email").trim()));
    put_non_blank(&mut properties, "firstname", preview.text("first_name"));
    put_non_blank(&mut properties, "lastname", preview.text("last_name"));
    put_non_blank(&mut properties, "phone", preview.text("phone"));
    put_non_blank(&mut properties, "company", preview.text("company"));
    put_extra(&mut properties, preview);
    properties
}

pub fn deal_properties(preview: &Preview) -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("dealname".to_string(), Value::from(preview.text("deal_name").trim()));
    if let Some(amount) = preview.number("amount") {
        properties.insert("amount".to_string(), Value::from(amount.to_string()));
    }
    put_non_blank(&mut properties, "dealstage", preview.text("stage"));
    put_non_blank(&mut properties, "closedate", preview.text("close_date"));
    put_extra(&mut properties, preview);
    properties
}

pub struct ContactExecutor<C = HubspotClient> {
    crm: Arc<C>,
}

impl<C> ContactExecutor<C> {
    pub fn new(crm: Arc<C>) -> Self {
        Self { crm }
    }
}

#[async_trait]
impl<C> ActionExecutor for ContactExecutor<C>
where
    C: CrmObjects + 'static,
{
    fn intent(&self) -> Intent {
        Intent::CreateContact
    }

    fn object_name(&self) -> &'static str {
        "contact"
    }

    fn required_fields(&self) -> &'static [RequiredField] {
        CONTACT_REQUIRED
    }

    async fn execute(&self, preview: &Preview) -> Result<ResultPayload, ExecutorError> {
        self.crm
            .create_contact(contact_properties(preview))
            .await
            .map_err(|error| ExecutorError::new(error.to_string()))
    }
}

pub struct DealExecutor<C = HubspotClient> {
    crm: Arc<C>,
}

impl<C> DealExecutor<C> {
    pub fn new(crm: Arc<C>) -> Self {
        Self { crm }
    }
}

impl<C> DealExecutor<C>
where
    C: CrmObjects,
{
    /// Links the deal to the first contact matching `email`. A missing contact is not an error.
    async fn associate(&self, deal_id: &str, email: &str) -> Result<(), ExecutorError> {
        let contacts = self
            .crm
            .search_contacts(email)
            .await
            .map_err(|error| ExecutorError::new(error.to_string()))?;

        let Some(contact_id) = contacts.first().and_then(object_id) else {
            warn!(
                event_name = "crm.deal.contact_not_found",
                deal_id,
                contact_email = email,
                "contact not found; deal left unassociated"
            );
            return Ok(());
        };

        self.crm
            .associate_deal_with_contact(deal_id, &contact_id)
            .await
            .map_err(|error| ExecutorError::new(error.to_string()))
    }
}

#[async_trait]
impl<C> ActionExecutor for DealExecutor<C>
where
    C: CrmObjects + 'static,
{
    fn intent(&self) -> Intent {
        Intent::CreateDeal
    }

    fn object_name(&self) -> &'static str {
        "deal"
    }

    fn required_fields(&self) -> &'static [RequiredField] {
        DEAL_REQUIRED
    }

    async fn execute(&self, preview: &Preview) -> Result<ResultPayload, ExecutorError> {
        let created = self
            .crm
            .create_deal(deal_properties(preview))
            .await
            .map_err(|error| ExecutorError::new(error.to_string()))?;

        let contact_email = preview.text("contact_email").trim();
        if !contact_email.is_empty() {
            match object_id(&created) {
                Some(deal_id) => self.associate(&deal_id, contact_email).await?,
                None => warn!(
                    event_name = "crm.deal.missing_id",
                    "created deal has no id; skipping contact association"
                ),
            }
        }

        info!(event_name = "crm.deal.executed", "deal executor finished");
        Ok(created)
    }
}

/// HubSpot ids arrive as strings, but accept numbers too.
fn object_id(object: &Map<String, Value>) -> Option<String> {
    match object.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}
