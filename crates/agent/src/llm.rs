//! Language model access.
//!
//! Providers speak plain HTTP through `reqwest`. Everything above this module only sees
//! [`LlmClient::complete`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use dealflow_core::config::LlmConfig;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
impl<C: LlmClient + ?Sized> LlmClient for Box<C> {
    async fn complete(&self, prompt: &str) -> Result<String> {
        (**self).complete(prompt).await
    }
}

#[async_trait]
impl<C: LlmClient + ?Sized> LlmClient for Arc<C> {
    async fn complete(&self, prompt: &str) -> Result<String> {
        (**self).complete(prompt).await
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GenerationOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl GenerationOptions {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder().timeout(timeout).build().context("failed to build llm http client")
}

fn join_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

/// Local models served by Ollama's `/api/generate`.
#[derive(Clone, Debug)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    options: GenerationOptions,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, options: GenerationOptions) -> Result<Self> {
        let client = http_client(options.timeout)?;
        Ok(Self { client, base_url: base_url.into(), options })
    }

    pub fn endpoint(&self) -> String {
        join_url(&self.base_url, "api/generate")
    }

    fn request<'a>(&'a self, prompt: &'a str) -> OllamaGenerateRequest<'a> {
        OllamaGenerateRequest {
            model: &self.options.model,
            prompt,
            stream: false,
            options: OllamaOptions {
                temperature: self.options.temperature,
                num_predict: self.options.max_tokens,
            },
        }
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = self.endpoint();
        debug!(provider = "ollama", model = %self.options.model, url = %url, "sending completion");

        let response = self
            .client
            .post(&url)
            .json(&self.request(prompt))
            .send()
            .await
            .with_context(|| format!("ollama request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("ollama returned status {status}: {body}"));
        }

        let body: OllamaGenerateResponse =
            response.json().await.context("ollama response was not valid json")?;
        Ok(body.response)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible `/v1/chat/completions` endpoints.
#[derive(Clone, Debug)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: SecretString,
    options: GenerationOptions,
}

impl OpenAiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        options: GenerationOptions,
    ) -> Result<Self> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(anyhow!("openai api key is empty"));
        }
        let client = http_client(options.timeout)?;
        Ok(Self { client, base_url: base_url.into(), api_key, options })
    }

    pub fn endpoint(&self) -> String {
        join_url(&self.base_url, "v1/chat/completions")
    }

    fn request<'a>(&'a self, prompt: &'a str) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.options.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = self.endpoint();
        debug!(provider = "openai", model = %self.options.model, url = %url, "sending completion");

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&self.request(prompt))
            .send()
            .await
            .with_context(|| format!("openai request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("openai returned status {status}: {body}"));
        }

        let body: ChatCompletionResponse =
            response.json().await.context("openai response was not valid json")?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("openai response contained no message content"))
    }
}
