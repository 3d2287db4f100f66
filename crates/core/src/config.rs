use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::tokens::TokenBudget;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub budget: TokenBudget,
    pub guardrail: GuardrailConfig,
    pub chat: ChatConfig,
    pub automation: AutomationConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GuardrailConfig {
    pub max_words: usize,
    /// Replies shorter than this with no topic keywords count as conversational filler.
    pub short_reply_chars: usize,
}

#[derive(Clone, Debug)]
pub struct ChatConfig {
    pub max_message_chars: usize,
    /// Directory of markdown prompt sections; the built-in prompt is used when unset.
    pub prompt_dir: Option<PathBuf>,
    pub prompt_cache_ttl_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AutomationConfig {
    pub enabled: bool,
    pub service_url: Option<String>,
    pub webhook_secret: Option<SecretString>,
    pub queue_capacity: usize,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
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
    pub prompt_dir: Option<PathBuf>,
    pub history_budget: Option<usize>,
    pub automation_enabled: Option<bool>,
    pub automation_service_url: Option<String>,
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
                timeout_secs: 30,
                max_retries: 2,
            },
            budget: TokenBudget::default(),
            guardrail: GuardrailConfig { max_words: 200, short_reply_chars: 50 },
            chat: ChatConfig {
                max_message_chars: 500,
                prompt_dir: None,
                prompt_cache_ttl_secs: 60,
            },
            automation: AutomationConfig {
                enabled: false,
                service_url: None,
                webhook_secret: None,
                queue_capacity: 64,
                timeout_secs: 10,
            },
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
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("telos.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        if !config.budget.is_consistent() {
            warn!(
                event_name = "config.budget.inconsistent",
                sub_budget_sum = config.budget.sub_budget_sum(),
                total = config.budget.total,
                "token sub-budgets add up to more than the total budget"
            );
        }

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(budget) = patch.budget {
            if let Some(system_prompt) = budget.system_prompt {
                self.budget.system_prompt = system_prompt;
            }
            if let Some(context_summary) = budget.context_summary {
                self.budget.context_summary = context_summary;
            }
            if let Some(conversation_history) = budget.conversation_history {
                self.budget.conversation_history = conversation_history;
            }
            if let Some(total) = budget.total {
                self.budget.total = total;
            }
        }

        if let Some(guardrail) = patch.guardrail {
            if let Some(max_words) = guardrail.max_words {
                self.guardrail.max_words = max_words;
            }
            if let Some(short_reply_chars) = guardrail.short_reply_chars {
                self.guardrail.short_reply_chars = short_reply_chars;
            }
        }

        if let Some(chat) = patch.chat {
            if let Some(max_message_chars) = chat.max_message_chars {
                self.chat.max_message_chars = max_message_chars;
            }
            if let Some(prompt_dir) = chat.prompt_dir {
                self.chat.prompt_dir = Some(prompt_dir);
            }
            if let Some(prompt_cache_ttl_secs) = chat.prompt_cache_ttl_secs {
                self.chat.prompt_cache_ttl_secs = prompt_cache_ttl_secs;
            }
        }

        if let Some(automation) = patch.automation {
            if let Some(enabled) = automation.enabled {
                self.automation.enabled = enabled;
            }
            if let Some(service_url) = automation.service_url {
                self.automation.service_url = Some(service_url);
            }
            if let Some(webhook_secret) = automation.webhook_secret {
                self.automation.webhook_secret = Some(secret_value(webhook_secret));
            }
            if let Some(queue_capacity) = automation.queue_capacity {
                self.automation.queue_capacity = queue_capacity;
            }
            if let Some(timeout_secs) = automation.timeout_secs {
                self.automation.timeout_secs = timeout_secs;
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
        if let Some(value) = read_env("TELOS_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("TELOS_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("TELOS_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("TELOS_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("TELOS_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("TELOS_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TELOS_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("TELOS_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("TELOS_BUDGET_SYSTEM_PROMPT") {
            self.budget.system_prompt = parse_usize("TELOS_BUDGET_SYSTEM_PROMPT", &value)?;
        }
        if let Some(value) = read_env("TELOS_BUDGET_CONTEXT_SUMMARY") {
            self.budget.context_summary = parse_usize("TELOS_BUDGET_CONTEXT_SUMMARY", &value)?;
        }
        if let Some(value) = read_env("TELOS_BUDGET_CONVERSATION_HISTORY") {
            self.budget.conversation_history =
                parse_usize("TELOS_BUDGET_CONVERSATION_HISTORY", &value)?;
        }
        if let Some(value) = read_env("TELOS_BUDGET_TOTAL") {
            self.budget.total = parse_usize("TELOS_BUDGET_TOTAL", &value)?;
        }

        if let Some(value) = read_env("TELOS_GUARDRAIL_MAX_WORDS") {
            self.guardrail.max_words = parse_usize("TELOS_GUARDRAIL_MAX_WORDS", &value)?;
        }
        if let Some(value) = read_env("TELOS_GUARDRAIL_SHORT_REPLY_CHARS") {
            self.guardrail.short_reply_chars =
                parse_usize("TELOS_GUARDRAIL_SHORT_REPLY_CHARS", &value)?;
        }

        if let Some(value) = read_env("TELOS_CHAT_MAX_MESSAGE_CHARS") {
            self.chat.max_message_chars = parse_usize("TELOS_CHAT_MAX_MESSAGE_CHARS", &value)?;
        }
        if let Some(value) = read_env("TELOS_CHAT_PROMPT_DIR") {
            self.chat.prompt_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("TELOS_CHAT_PROMPT_CACHE_TTL_SECS") {
            self.chat.prompt_cache_ttl_secs =
                parse_u64("TELOS_CHAT_PROMPT_CACHE_TTL_SECS", &value)?;
        }

        if let Some(value) = read_env("TELOS_AUTOMATION_ENABLED") {
            self.automation.enabled = parse_bool("TELOS_AUTOMATION_ENABLED", &value)?;
        }
        if let Some(value) = read_env("TELOS_AUTOMATION_SERVICE_URL") {
            self.automation.service_url = Some(value);
        }
        if let Some(value) = read_env("TELOS_AUTOMATION_WEBHOOK_SECRET") {
            self.automation.webhook_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env("TELOS_AUTOMATION_QUEUE_CAPACITY") {
            self.automation.queue_capacity =
                parse_usize("TELOS_AUTOMATION_QUEUE_CAPACITY", &value)?;
        }
        if let Some(value) = read_env("TELOS_AUTOMATION_TIMEOUT_SECS") {
            self.automation.timeout_secs = parse_u64("TELOS_AUTOMATION_TIMEOUT_SECS", &value)?;
        }

        let log_level = read_env("TELOS_LOGGING_LEVEL").or_else(|| read_env("TELOS_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("TELOS_LOGGING_FORMAT").or_else(|| read_env("TELOS_LOG_FORMAT"));
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
        if let Some(prompt_dir) = overrides.prompt_dir {
            self.chat.prompt_dir = Some(prompt_dir);
        }
        if let Some(history_budget) = overrides.history_budget {
            self.budget.conversation_history = history_budget;
        }
        if let Some(enabled) = overrides.automation_enabled {
            self.automation.enabled = enabled;
        }
        if let Some(service_url) = overrides.automation_service_url {
            self.automation.service_url = Some(service_url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_budget(&self.budget)?;
        validate_guardrail(&self.guardrail)?;
        validate_chat(&self.chat)?;
        validate_automation(&self.automation)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("telos.toml"), PathBuf::from("config/telos.toml")]
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

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
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

fn validate_budget(budget: &TokenBudget) -> Result<(), ConfigError> {
    if budget.total == 0 {
        return Err(ConfigError::Validation("budget.total must be greater than zero".to_string()));
    }
    if budget.conversation_history == 0 {
        return Err(ConfigError::Validation(
            "budget.conversation_history must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_guardrail(guardrail: &GuardrailConfig) -> Result<(), ConfigError> {
    if guardrail.max_words == 0 {
        return Err(ConfigError::Validation(
            "guardrail.max_words must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_chat(chat: &ChatConfig) -> Result<(), ConfigError> {
    if chat.max_message_chars == 0 {
        return Err(ConfigError::Validation(
            "chat.max_message_chars must be greater than zero".to_string(),
        ));
    }
    if let Some(dir) = &chat.prompt_dir {
        if dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "chat.prompt_dir must not be empty when set".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_automation(automation: &AutomationConfig) -> Result<(), ConfigError> {
    if automation.enabled {
        let Some(service_url) = automation.service_url.as_deref() else {
            return Err(ConfigError::Validation(
                "automation.enabled is true but automation.service_url is not set".to_string(),
            ));
        };
        if !service_url.starts_with("http://") && !service_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "automation.service_url must start with http:// or https://".to_string(),
            ));
        }
    }

    if automation.queue_capacity == 0 {
        return Err(ConfigError::Validation(
            "automation.queue_capacity must be greater than zero".to_string(),
        ));
    }

    if automation.timeout_secs == 0 || automation.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "automation.timeout_secs must be in range 1..=120".to_string(),
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

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    budget: Option<BudgetPatch>,
    guardrail: Option<GuardrailPatch>,
    chat: Option<ChatPatch>,
    automation: Option<AutomationPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct BudgetPatch {
    system_prompt: Option<usize>,
    context_summary: Option<usize>,
    conversation_history: Option<usize>,
    total: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct GuardrailPatch {
    max_words: Option<usize>,
    short_reply_chars: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatPatch {
    max_message_chars: Option<usize>,
    prompt_dir: Option<PathBuf>,
    prompt_cache_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AutomationPatch {
    enabled: Option<bool>,
    service_url: Option<String>,
    webhook_secret: Option<String>,
    queue_capacity: Option<usize>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_match_documented_budget() -> Result<(), String> {
        let config = AppConfig::default();
        ensure(config.budget.system_prompt == 1500, "system prompt budget defaults to 1500")?;
        ensure(config.budget.context_summary == 600, "summary budget defaults to 600")?;
        ensure(config.budget.conversation_history == 3000, "history budget defaults to 3000")?;
        ensure(config.budget.total == 5100, "total budget defaults to 5100")?;
        ensure(config.guardrail.max_words == 200, "reply word limit defaults to 200")?;
        ensure(config.chat.max_message_chars == 500, "inbound message limit defaults to 500")?;
        config.validate().map_err(|err| format!("default config should validate: {err}"))
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_TELOS_WEBHOOK_SECRET", "whsec-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("telos.toml");
            fs::write(
                &path,
                r#"
[automation]
enabled = true
service_url = "https://automation.internal"
webhook_secret = "${TEST_TELOS_WEBHOOK_SECRET}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config
                    .automation
                    .webhook_secret
                    .as_ref()
                    .is_some_and(|secret| secret.expose_secret() == "whsec-from-env"),
                "webhook secret should be interpolated from environment",
            )?;
            ensure(config.automation.enabled, "automation should be enabled from file")?;
            Ok(())
        })();

        clear_vars(&["TEST_TELOS_WEBHOOK_SECRET"]);
        result
    }

    #[test]
    fn missing_interpolation_variable_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&["TEST_TELOS_ABSENT_VAR"]);

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("telos.toml");
        fs::write(&path, "[llm]\nmodel = \"${TEST_TELOS_ABSENT_VAR}\"\n")
            .map_err(|err| err.to_string())?;

        let outcome =
            AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() });
        ensure(
            matches!(
                outcome,
                Err(ConfigError::MissingEnvInterpolation { ref var }) if var == "TEST_TELOS_ABSENT_VAR"
            ),
            "missing interpolation variable should be named in the error",
        )
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TELOS_LOG_LEVEL", "warn");
        env::set_var("TELOS_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["TELOS_LOG_LEVEL", "TELOS_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TELOS_BUDGET_CONVERSATION_HISTORY", "2500");
        env::set_var("TELOS_GUARDRAIL_MAX_WORDS", "150");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("telos.toml");
            fs::write(
                &path,
                r#"
[budget]
system_prompt = 1200
conversation_history = 2000

[guardrail]
max_words = 120

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    history_budget: Some(1800),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.budget.system_prompt == 1200, "file value should beat the default")?;
            ensure(config.budget.context_summary == 600, "untouched default should survive")?;
            ensure(config.guardrail.max_words == 150, "env value should beat the file")?;
            ensure(
                config.budget.conversation_history == 1800,
                "override history budget should win over env and file",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            Ok(())
        })();

        clear_vars(&["TELOS_BUDGET_CONVERSATION_HISTORY", "TELOS_GUARDRAIL_MAX_WORDS"]);
        result
    }

    #[test]
    fn inconsistent_budget_loads_with_warning_only() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TELOS_BUDGET_TOTAL", "1000");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(!config.budget.is_consistent(), "sub-budgets should exceed the total")?;
            ensure(config.budget.total == 1000, "total budget should come from env")
        })();

        clear_vars(&["TELOS_BUDGET_TOTAL"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TELOS_AUTOMATION_ENABLED", "true");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("automation.service_url")
            );
            ensure(has_message, "validation failure should mention automation.service_url")
        })();

        clear_vars(&["TELOS_AUTOMATION_ENABLED"]);
        result
    }

    #[test]
    fn zero_history_budget_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TELOS_BUDGET_CONVERSATION_HISTORY", "0");
        let outcome = AppConfig::load(LoadOptions::default());
        clear_vars(&["TELOS_BUDGET_CONVERSATION_HISTORY"]);

        ensure(
            matches!(
                outcome,
                Err(ConfigError::Validation(ref message)) if message.contains("conversation_history")
            ),
            "zero history budget should fail validation",
        )
    }

    #[test]
    fn malformed_numeric_env_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TELOS_GUARDRAIL_MAX_WORDS", "two hundred");
        let outcome = AppConfig::load(LoadOptions::default());
        clear_vars(&["TELOS_GUARDRAIL_MAX_WORDS"]);

        ensure(
            matches!(
                outcome,
                Err(ConfigError::InvalidEnvOverride { ref key, .. }) if key == "TELOS_GUARDRAIL_MAX_WORDS"
            ),
            "malformed number should be reported with its key",
        )
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TELOS_LLM_API_KEY", "sk-secret-value");
        env::set_var("TELOS_AUTOMATION_WEBHOOK_SECRET", "whsec-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                !debug.contains("whsec-secret-value"),
                "debug output should not contain webhook secret",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["TELOS_LLM_API_KEY", "TELOS_AUTOMATION_WEBHOOK_SECRET"]);
        result
    }
}
