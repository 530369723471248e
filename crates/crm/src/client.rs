use async_trait::async_trait;
use dealflow_core::config::HubspotConfig;
use reqwest::{Client, Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::error::HubspotError;

pub const DEFAULT_BASE_URL: &str = "https://api.hubapi.com";

/// Objects a CRM executor needs to create and link.
#[async_trait]
pub trait CrmObjects: Send + Sync {
    async fn create_contact(
        &self,
        properties: Map<String, Value>,
    ) -> Result<Map<String, Value>, HubspotError>;

    async fn create_deal(
        &self,
        properties: Map<String, Value>,
    ) -> Result<Map<String, Value>, HubspotError>;

    async fn search_contacts(&self, query: &str) -> Result<Vec<Map<String, Value>>, HubspotError>;

    async fn associate_deal_with_contact(
        &self,
        deal_id: &str,
        contact_id: &str,
    ) -> Result<(), HubspotError>;
}

/// How requests authenticate. Private app tokens (`pat-…`) go in a bearer header, anything else
/// is treated as a legacy `hapikey` query parameter.
#[derive(Clone, Debug)]
pub enum HubspotAuth {
    Bearer(SecretString),
    ApiKey(SecretString),
}

impl HubspotAuth {
    pub fn from_key(key: &SecretString) -> Result<Self, HubspotError> {
        let exposed = key.expose_secret().trim();
        if exposed.is_empty() || exposed.starts_with("your-") {
            return Err(HubspotError::MissingApiKey);
        }

        let secret = SecretString::from(exposed.to_string());
        if exposed.starts_with("pat-") {
            Ok(Self::Bearer(secret))
        } else {
            Ok(Self::ApiKey(secret))
        }
    }

    pub fn is_bearer(&self) -> bool {
        matches!(self, Self::Bearer(_))
    }

    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Self::Bearer(token) => request.bearer_auth(token.expose_secret()),
            Self::ApiKey(key) => request.query(&[("hapikey", key.expose_secret())]),
        }
    }
}

#[derive(Clone, Debug)]
pub struct HubspotClient {
    http: Client,
    base_url: String,
    auth: HubspotAuth,
}

impl HubspotClient {
    pub fn new(base_url: impl Into<String>, api_key: &SecretString) -> Result<Self, HubspotError> {
        let auth = HubspotAuth::from_key(api_key)?;
        Ok(Self { http: Client::new(), base_url: base_url.into(), auth })
    }

    pub fn from_config(config: &HubspotConfig) -> Result<Self, HubspotError> {
        let api_key = config.api_key.as_ref().ok_or(HubspotError::MissingApiKey)?;
        Self::new(config.base_url.clone(), api_key)
    }

    pub fn auth(&self) -> &HubspotAuth {
        &self.auth
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        self.auth.apply(self.http.request(method, url))
    }

    async fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, HubspotError> {
        let response =
            request.send().await.map_err(|source| HubspotError::Transport { operation, source })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HubspotError::Status { operation, status: status.as_u16(), body });
        }
        Ok(response)
    }

    async fn send_json(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Map<String, Value>, HubspotError> {
        self.send(operation, request)
            .await?
            .json::<Map<String, Value>>()
            .await
            .map_err(|source| HubspotError::Decode { operation, source })
    }
}

#[async_trait]
impl CrmObjects for HubspotClient {
    async fn create_contact(
        &self,
        properties: Map<String, Value>,
    ) -> Result<Map<String, Value>, HubspotError> {
        let request = self
            .request(Method::POST, "/crm/v3/objects/contacts")
            .json(&json!({ "properties": properties }));
        let created = self.send_json("create contact", request).await?;
        info!(
            event_name = "crm.hubspot.contact_created",
            contact_id = created.get("id").and_then(serde_json::Value::as_str).unwrap_or_default(),
            "contact created"
        );
        Ok(created)
    }

    async fn create_deal(
        &self,
        properties: Map<String, Value>,
    ) -> Result<Map<String, Value>, HubspotError> {
        let request = self
            .request(Method::POST, "/crm/v3/objects/deals")
            .json(&json!({ "properties": properties }));
        let created = self.send_json("create deal", request).await?;
        info!(
            event_name = "crm.hubspot.deal_created",
            deal_id = created.get("id").and_then(serde_json::Value::as_str).unwrap_or_default(),
            "deal created"
        );
        Ok(created)
    }

    async fn search_contacts(&self, query: &str) -> Result<Vec<Map<String, Value>>, HubspotError> {
        let request = self.request(Method::POST, "/crm/v3/objects/contacts/search").json(&json!({
            "query": query,
            "filterGroups": [],
            "sorts": [],
            "limit": 10,
        }));
        let found = self.send_json("search contacts", request).await?;

        let results = match found.get("results") {
            Some(Value::Array(results)) => results
                .iter()
                .filter_map(|result| result.as_object().cloned())
                .collect::<Vec<_>>(),
            _ => Vec::new(),
        };
        debug!(query, matches = results.len(), "contact search finished");
        Ok(results)
    }

    async fn associate_deal_with_contact(
        &self,
        deal_id: &str,
        contact_id: &str,
    ) -> Result<(), HubspotError> {
        let path = format!("/crm/v3/objects/deals/{deal_id}/associations/contacts/{contact_id}");
        let request = self.request(Method::PUT, &path).json(&json!({
            "inputs": [{
                "from": { "id": deal_id },
                "to": { "id": contact_id },
                "type": "deal_to_contact",
            }]
        }));
        self.send("associate deal", request).await?;
        info!(
            event_name = "crm.hubspot.deal_associated",
            deal_id,
            contact_id,
            "deal associated with contact"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use dealflow_core::config::HubspotConfig;
    use reqwest::header::AUTHORIZATION;
    use reqwest::Method;
    use secrecy::SecretString;

    use super::{HubspotAuth, HubspotClient};
    use crate::error::HubspotError;

    fn key(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    #[test]
    fn private_app_tokens_use_bearer_header() {
        let client = HubspotClient::new("https://api.hubapi.com/", &key("pat-na1-abc"))
            .expect("valid token");
        let request = client
            .request(Method::POST, "/crm/v3/objects/contacts")
            .build()
            .expect("request builds");

        assert!(client.auth().is_bearer());
        assert_eq!(request.url().as_str(), "https://api.hubapi.com/crm/v3/objects/contacts");
        assert_eq!(
            request.headers().get(AUTHORIZATION).and_then(|value| value.to_str().ok()),
            Some("Bearer pat-na1-abc")
        );
        assert_eq!(request.url().query(), None);
    }

    #[test]
    fn legacy_keys_use_hapikey_query_parameter() {
        let client =
            HubspotClient::new("https://api.hubapi.com", &key("legacy-123")).expect("valid key");
        let request =
            client.request(Method::GET, "/crm/v3/objects/deals").build().expect("request builds");

        assert!(!client.auth().is_bearer());
        assert_eq!(request.url().query(), Some("hapikey=legacy-123"));
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn placeholder_and_empty_keys_are_rejected() {
        for placeholder in ["", "   ", "your-hubspot-api-key-here"] {
            assert!(matches!(
                HubspotAuth::from_key(&key(placeholder)),
                Err(HubspotError::MissingApiKey)
            ));
        }
    }

    #[test]
    fn config_without_key_is_rejected() {
        let config =
            HubspotConfig { api_key: None, base_url: "https://api.hubapi.com".to_string() };
        assert!(matches!(HubspotClient::from_config(&config), Err(HubspotError::MissingApiKey)));
    }
}
