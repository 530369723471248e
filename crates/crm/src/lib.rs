//! HubSpot CRM access and the action executors that create contacts and deals.

pub mod client;
pub mod error;
pub mod executors;

pub use client::{CrmObjects, HubspotAuth, HubspotClient, DEFAULT_BASE_URL};
pub use error::HubspotError;
pub use executors::{ContactExecutor, DealExecutor};
