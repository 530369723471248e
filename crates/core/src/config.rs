use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::confirm::ConfirmationPolicy;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub hubspot: HubspotConfig,
    pub notify: NotifyConfig,
    pub workflow: WorkflowConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct HubspotConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
}

#[derive(Clone, Debug)]
pub struct NotifyConfig {
    pub recipient: Option<String>,
    pub enabled: bool,
}

#[derive(Clone, Debug, Default)]
pub struct WorkflowConfig {
    pub max_edits: Option<u32>,
    pub decision_timeout_secs: Option<u64>,
}

impl WorkflowConfig {
    pub fn policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy {
            max_edits: self.max_edits,
            decision_timeout: self.decision_timeout_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

impl LlmProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_base_url: Option<String>,
    pub hubspot_api_key: Option<String>,
    pub hubspot_base_url: Option<String>,
    pub notify_recipient: Option<String>,
    pub notify_enabled: Option<bool>,
    pub max_edits: Option<u32>,
    pub decision_timeout_secs: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                temperature: 0.7,
                max_tokens: 1000,
                timeout_secs: 30,
            },
            hubspot: HubspotConfig {
                api_key: None,
                base_url: "https://api.hubapi.com".to_string(),
            },
            notify: NotifyConfig { recipient: None, enabled: false },
            workflow: WorkflowConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("dealflow.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(hubspot) = patch.hubspot {
            if let Some(hubspot_api_key_value) = hubspot.api_key {
                self.hubspot.api_key = Some(secret_value(hubspot_api_key_value));
            }
            if let Some(base_url) = hubspot.base_url {
                self.hubspot.base_url = base_url;
            }
        }

        if let Some(notify) = patch.notify {
            if let Some(recipient) = notify.recipient {
                self.notify.recipient = Some(recipient);
            }
            if let Some(enabled) = notify.enabled {
                self.notify.enabled = enabled;
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(max_edits) = workflow.max_edits {
                self.workflow.max_edits = Some(max_edits);
            }
            if let Some(decision_timeout_secs) = workflow.decision_timeout_secs {
                self.workflow.decision_timeout_secs = Some(decision_timeout_secs);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("DEALFLOW_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("DEALFLOW_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("DEALFLOW_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("DEALFLOW_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("DEALFLOW_LLM_TEMPERATURE") {
            self.llm.temperature = parse_f32("DEALFLOW_LLM_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("DEALFLOW_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_u32("DEALFLOW_LLM_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("DEALFLOW_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("DEALFLOW_LLM_TIMEOUT_SECS", &value)?;
        }

        let hubspot_api_key =
            read_env("DEALFLOW_HUBSPOT_API_KEY").or_else(|| read_env("HUBSPOT_API_KEY"));
        if let Some(value) = hubspot_api_key {
            self.hubspot.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("DEALFLOW_HUBSPOT_BASE_URL") {
            self.hubspot.base_url = value;
        }

        if let Some(value) = read_env("DEALFLOW_NOTIFY_RECIPIENT") {
            self.notify.recipient = Some(value);
        }
        if let Some(value) = read_env("DEALFLOW_NOTIFY_ENABLED") {
            self.notify.enabled = parse_bool("DEALFLOW_NOTIFY_ENABLED", &value)?;
        }

        if let Some(value) = read_env("DEALFLOW_WORKFLOW_MAX_EDITS") {
            self.workflow.max_edits = Some(parse_u32("DEALFLOW_WORKFLOW_MAX_EDITS", &value)?);
        }
        if let Some(value) = read_env("DEALFLOW_WORKFLOW_DECISION_TIMEOUT_SECS") {
            self.workflow.decision_timeout_secs =
                Some(parse_u64("DEALFLOW_WORKFLOW_DECISION_TIMEOUT_SECS", &value)?);
        }

        let log_level =
            read_env("DEALFLOW_LOGGING_LEVEL").or_else(|| read_env("DEALFLOW_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("DEALFLOW_LOGGING_FORMAT").or_else(|| read_env("DEALFLOW_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(hubspot_api_key) = overrides.hubspot_api_key {
            self.hubspot.api_key = Some(secret_value(hubspot_api_key));
        }
        if let Some(hubspot_base_url) = overrides.hubspot_base_url {
            self.hubspot.base_url = hubspot_base_url;
        }
        if let Some(recipient) = overrides.notify_recipient {
            self.notify.recipient = Some(recipient);
        }
        if let Some(enabled) = overrides.notify_enabled {
            self.notify.enabled = enabled;
        }
        if let Some(max_edits) = overrides.max_edits {
            self.workflow.max_edits = Some(max_edits);
        }
        if let Some(decision_timeout_secs) = overrides.decision_timeout_secs {
            self.workflow.decision_timeout_secs = Some(decision_timeout_secs);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_hubspot(&self.hubspot)?;
        validate_notify(&self.notify)?;
        validate_workflow(&self.workflow)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("dealflow.toml"), PathBuf::from("config/dealflow.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_tokens must be greater than zero".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_hubspot(hubspot: &HubspotConfig) -> Result<(), ConfigError> {
    let base_url = hubspot.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "hubspot.base_url must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_notify(notify: &NotifyConfig) -> Result<(), ConfigError> {
    if !notify.enabled {
        return Ok(());
    }

    match notify.recipient.as_deref().map(str::trim) {
        Some(recipient) if recipient.contains('@') => Ok(()),
        Some(_) => Err(ConfigError::Validation(
            "notify.recipient must be an email address".to_string(),
        )),
        None => Err(ConfigError::Validation(
            "notify.recipient is required when notify.enabled is true".to_string(),
        )),
    }
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    if workflow.max_edits == Some(0) {
        return Err(ConfigError::Validation(
            "workflow.max_edits must be greater than zero when set".to_string(),
        ));
    }

    if workflow.decision_timeout_secs == Some(0) {
        return Err(ConfigError::Validation(
            "workflow.decision_timeout_secs must be greater than zero when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.parse::<f32>().map_err(|_| invalid_override(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    hubspot: Option<HubspotPatch>,
    notify: Option<NotifyPatch>,
    workflow: Option<WorkflowPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct HubspotPatch {
    api_key: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NotifyPatch {
    recipient: Option<String>,
    enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    max_edits: Option<u32>,
    decision_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
