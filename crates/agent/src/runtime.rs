use std::sync::Arc;

use dealflow_core::config::{AppConfig, ConfigError, LlmConfig, LlmProvider, LoadOptions};
use dealflow_core::{ConfirmationSurface, Dispatcher, WorkflowController};
use dealflow_crm::{ContactExecutor, DealExecutor, HubspotClient, HubspotError};
use dealflow_notify::{ComposeError, EmailNotifier, LogTransport};
use thiserror::Error;
use tracing::info;

use crate::extractor::LlmEntityExtractor;
use crate::llm::{
    GenerationOptions, LlmClient, OllamaClient, OpenAiClient, DEFAULT_OLLAMA_URL,
    DEFAULT_OPENAI_URL,
};

pub type DealflowController<S> =
    WorkflowController<LlmEntityExtractor<Box<dyn LlmClient>>, S, EmailNotifier<LogTransport>>;

pub struct Application<S> {
    pub config: AppConfig,
    pub controller: DealflowController<S>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("language model client setup failed: {0}")]
    Llm(String),
    #[error("crm client setup failed: {0}")]
    Crm(#[from] HubspotError),
    #[error("notification templates failed to load: {0}")]
    Notify(#[from] ComposeError),
}

/// Loads configuration and wires the production collaborators around `surface`.
pub fn bootstrap<S>(options: LoadOptions, surface: S) -> Result<Application<S>, BootstrapError>
where
    S: ConfirmationSurface,
{
    info!(event_name = "system.bootstrap.start", correlation_id = "bootstrap", "starting bootstrap");
    let config = AppConfig::load(options)?;

    let llm = llm_client(&config.llm)?;
    info!(
        event_name = "system.bootstrap.llm_ready",
        correlation_id = "bootstrap",
        provider = config.llm.provider.as_str(),
        model = %config.llm.model,
        "language model client configured"
    );

    let crm = Arc::new(HubspotClient::from_config(&config.hubspot)?);
    let dispatcher = Dispatcher::default()
        .with(ContactExecutor::new(Arc::clone(&crm)))
        .with(DealExecutor::new(crm));

    let notifier = EmailNotifier::from_config(LogTransport, &config.notify)?;
    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        notifications = notifier.recipient().is_some(),
        "workflow controller assembled"
    );

    let controller =
        WorkflowController::new(LlmEntityExtractor::new(llm), surface, notifier, dispatcher)
            .with_policy(config.workflow.policy());

    Ok(Application { config, controller })
}

pub fn llm_client(config: &LlmConfig) -> Result<Box<dyn LlmClient>, BootstrapError> {
    let options = GenerationOptions::from_config(config);
    let client: Box<dyn LlmClient> = match config.provider {
        LlmProvider::Ollama => {
            let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_OLLAMA_URL);
            Box::new(OllamaClient::new(base_url, options).map_err(llm_error)?)
        }
        LlmProvider::OpenAi => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                BootstrapError::Llm("openai provider requires an api key".to_string())
            })?;
            let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_OPENAI_URL);
            Box::new(OpenAiClient::new(base_url, api_key, options).map_err(llm_error)?)
        }
    };
    Ok(client)
}

fn llm_error(error: anyhow::Error) -> BootstrapError {
    BootstrapError::Llm(format!("{error:#}"))
}

#[cfg(test)]
mod tests {
    use dealflow_core::config::{ConfigOverrides, LlmProvider, LoadOptions};
    use dealflow_core::{AutoApprove, Intent};
    use dealflow_crm::HubspotError;

    use super::{bootstrap, llm_client, BootstrapError};

    fn options(overrides: ConfigOverrides) -> LoadOptions {
        LoadOptions {
            config_path: Some("missing-dealflow-test.toml".into()),
            require_file: false,
            overrides,
        }
    }

    #[test]
    fn bootstrap_registers_both_crm_executors() {
        let overrides = ConfigOverrides {
            hubspot_api_key: Some("pat-na1-test".into()),
            notify_enabled: Some(true),
            notify_recipient: Some("ops@acme.io".into()),
            ..ConfigOverrides::default()
        };

        let app = bootstrap(options(overrides), AutoApprove).expect("bootstrap");

        assert!(app.controller.dispatcher().supports(&Intent::CreateContact));
        assert!(app.controller.dispatcher().supports(&Intent::CreateDeal));
        assert_eq!(app.controller.notifier().recipient(), Some("ops@acme.io"));
    }

    #[test]
    fn placeholder_crm_key_fails_bootstrap() {
        let overrides = ConfigOverrides {
            hubspot_api_key: Some("your-hubspot-key".into()),
            ..ConfigOverrides::default()
        };

        let error = bootstrap(options(overrides), AutoApprove).err().expect("bootstrap fails");

        assert!(matches!(error, BootstrapError::Crm(HubspotError::MissingApiKey)));
    }

    #[test]
    fn openai_without_key_is_rejected() {
        let mut config = dealflow_core::config::AppConfig::default().llm;
        config.provider = LlmProvider::OpenAi;
        config.api_key = None;

        let error = llm_client(&config).err().expect("missing key");

        assert_eq!(
            error.to_string(),
            "language model client setup failed: openai provider requires an api key"
        );
    }
}
