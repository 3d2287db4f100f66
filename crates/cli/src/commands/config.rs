use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use telos_core::config::{AppConfig, LoadOptions};
use toml::Value;

const UNSET: &str = "<unset>";

/// One rendered row: dotted key, display value, env vars that can set it.
struct Entry {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

impl Entry {
    fn new(key: &'static str, value: impl Into<String>, env_keys: &'static [&'static str]) -> Self {
        Self { key, value: value.into(), env_keys }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for entry in entries(&config) {
        let source = field_source(
            entry.key,
            entry.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(entry.key, &entry.value, source));
    }

    lines.join("\n")
}

fn entries(config: &AppConfig) -> Vec<Entry> {
    let llm = &config.llm;
    let budget = &config.budget;
    let chat = &config.chat;
    let automation = &config.automation;

    vec![
        Entry::new("llm.provider", format!("{:?}", llm.provider), &["TELOS_LLM_PROVIDER"]),
        Entry::new("llm.model", llm.model.clone(), &["TELOS_LLM_MODEL"]),
        Entry::new("llm.base_url", llm.base_url.as_deref().unwrap_or(UNSET), &["TELOS_LLM_BASE_URL"]),
        Entry::new(
            "llm.api_key",
            llm.api_key.as_ref().map_or(UNSET.to_string(), |key| redact_token(key.expose_secret())),
            &["TELOS_LLM_API_KEY"],
        ),
        Entry::new("llm.timeout_secs", llm.timeout_secs.to_string(), &["TELOS_LLM_TIMEOUT_SECS"]),
        Entry::new("llm.max_retries", llm.max_retries.to_string(), &["TELOS_LLM_MAX_RETRIES"]),
        Entry::new(
            "budget.system_prompt",
            budget.system_prompt.to_string(),
            &["TELOS_BUDGET_SYSTEM_PROMPT"],
        ),
        Entry::new(
            "budget.context_summary",
            budget.context_summary.to_string(),
            &["TELOS_BUDGET_CONTEXT_SUMMARY"],
        ),
        Entry::new(
            "budget.conversation_history",
            budget.conversation_history.to_string(),
            &["TELOS_BUDGET_CONVERSATION_HISTORY"],
        ),
        Entry::new("budget.total", budget.total.to_string(), &["TELOS_BUDGET_TOTAL"]),
        Entry::new(
            "guardrail.max_words",
            config.guardrail.max_words.to_string(),
            &["TELOS_GUARDRAIL_MAX_WORDS"],
        ),
        Entry::new(
            "guardrail.short_reply_chars",
            config.guardrail.short_reply_chars.to_string(),
            &["TELOS_GUARDRAIL_SHORT_REPLY_CHARS"],
        ),
        Entry::new(
            "chat.max_message_chars",
            chat.max_message_chars.to_string(),
            &["TELOS_CHAT_MAX_MESSAGE_CHARS"],
        ),
        Entry::new(
            "chat.prompt_dir",
            chat.prompt_dir
                .as_ref()
                .map_or(UNSET.to_string(), |dir| dir.display().to_string()),
            &["TELOS_CHAT_PROMPT_DIR"],
        ),
        Entry::new(
            "chat.prompt_cache_ttl_secs",
            chat.prompt_cache_ttl_secs.to_string(),
            &["TELOS_CHAT_PROMPT_CACHE_TTL_SECS"],
        ),
        Entry::new(
            "automation.enabled",
            automation.enabled.to_string(),
            &["TELOS_AUTOMATION_ENABLED"],
        ),
        Entry::new(
            "automation.service_url",
            automation.service_url.as_deref().unwrap_or(UNSET),
            &["TELOS_AUTOMATION_SERVICE_URL"],
        ),
        Entry::new(
            "automation.webhook_secret",
            if automation.webhook_secret.is_some() { "<redacted>" } else { UNSET },
            &["TELOS_AUTOMATION_WEBHOOK_SECRET"],
        ),
        Entry::new(
            "automation.queue_capacity",
            automation.queue_capacity.to_string(),
            &["TELOS_AUTOMATION_QUEUE_CAPACITY"],
        ),
        Entry::new(
            "automation.timeout_secs",
            automation.timeout_secs.to_string(),
            &["TELOS_AUTOMATION_TIMEOUT_SECS"],
        ),
        Entry::new(
            "logging.level",
            config.logging.level.clone(),
            &["TELOS_LOGGING_LEVEL", "TELOS_LOG_LEVEL"],
        ),
        Entry::new(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["TELOS_LOGGING_FORMAT", "TELOS_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["telos.toml", "config/telos.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps a recognisable key prefix such as `sk-`; never the key material.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, redact_token};

    #[test]
    fn redaction_keeps_only_the_prefix() {
        assert_eq!(redact_token("sk-live-abcdef"), "sk-***");
        assert_eq!(redact_token("abcdef"), "<redacted>");
        assert_eq!(redact_token("  "), "<empty>");
    }

    #[test]
    fn dotted_paths_resolve_nested_tables() {
        let doc: Value = "[budget]\ntotal = 4000\n".parse().expect("toml");
        assert!(contains_path(&doc, "budget.total"));
        assert!(!contains_path(&doc, "budget.context_summary"));
        assert!(!contains_path(&doc, "llm.model"));
    }
}
