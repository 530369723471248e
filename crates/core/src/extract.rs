use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::intent::{FieldMap, Intent};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    pub intent: Intent,
    pub fields: FieldMap,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ExtractionError {
    pub message: String,
}

impl ExtractionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Classifies a free-form instruction. How the answer is produced is the implementor's business.
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> Result<Extraction, ExtractionError>;
}

/// Returns the same classification for every input.
#[derive(Clone, Debug)]
pub struct StaticExtractor {
    extraction: Extraction,
}

impl StaticExtractor {
    pub fn new(intent: Intent, fields: FieldMap) -> Self {
        Self { extraction: Extraction { intent, fields } }
    }
}

#[async_trait]
impl EntityExtractor for StaticExtractor {
    async fn extract(&self, _text: &str) -> Result<Extraction, ExtractionError> {
        Ok(self.extraction.clone())
    }
}
