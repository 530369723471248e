use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubspotError {
    #[error("HubSpot API key not configured")]
    MissingApiKey,
    #[error("{operation} request failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{operation} returned status {status}: {body}")]
    Status { operation: &'static str, status: u16, body: String },
    #[error("{operation} response could not be decoded: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
}
