//! Language-model intent extraction and application wiring.
//!
//! - `llm`: HTTP clients for Ollama and OpenAI-compatible endpoints
//! - `extractor`: turns a model reply into an intent plus raw fields
//! - `runtime`: loads configuration and assembles a ready `WorkflowController`
//!
//! The model only classifies and extracts. Validation, confirmation and execution stay in
//! `dealflow-core` and the CRM executors.

pub mod extractor;
pub mod llm;
pub mod runtime;
