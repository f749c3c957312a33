use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use parley_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

/// One effective setting: key path, rendered value and the env var that can override it.
struct Setting {
    key: &'static str,
    value: String,
    env_key: &'static str,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: override > env > file > default):".to_string()];
    for setting in settings(&config) {
        let source = field_source(
            setting.key,
            setting.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", setting.key, setting.value));
    }

    lines.join("\n")
}

fn settings(config: &AppConfig) -> Vec<Setting> {
    let setting = |key: &'static str, value: String, env_key: &'static str| Setting { key, value, env_key };
    let unset = || "<unset>".to_string();

    vec![
        setting("database.url", config.database.url.clone(), "PARLEY_DATABASE_URL"),
        setting(
            "database.max_connections",
            config.database.max_connections.to_string(),
            "PARLEY_DATABASE_MAX_CONNECTIONS",
        ),
        setting(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            "PARLEY_DATABASE_TIMEOUT_SECS",
        ),
        setting(
            "memory.url",
            config.memory.url.clone().unwrap_or_else(|| format!("<database.url> {}", config.database.url)),
            "PARLEY_MEMORY_URL",
        ),
        setting("memory.required", config.memory.required.to_string(), "PARLEY_MEMORY_REQUIRED"),
        setting("llm.provider", config.llm.provider.as_str().to_string(), "PARLEY_LLM_PROVIDER"),
        setting("llm.model", config.llm.model.clone(), "PARLEY_LLM_MODEL"),
        setting(
            "llm.embedding_model",
            config.llm.embedding_model.clone(),
            "PARLEY_LLM_EMBEDDING_MODEL",
        ),
        setting(
            "llm.base_url",
            config.llm.base_url.clone().unwrap_or_else(unset),
            "PARLEY_LLM_BASE_URL",
        ),
        setting(
            "llm.api_key",
            config.llm.api_key.as_ref().map(|key| redact_secret(key.expose_secret())).unwrap_or_else(unset),
            "PARLEY_LLM_API_KEY",
        ),
        setting("llm.temperature", config.llm.temperature.to_string(), "PARLEY_LLM_TEMPERATURE"),
        setting("llm.max_tokens", config.llm.max_tokens.to_string(), "PARLEY_LLM_MAX_TOKENS"),
        setting("llm.timeout_secs", config.llm.timeout_secs.to_string(), "PARLEY_LLM_TIMEOUT_SECS"),
        setting("llm.max_retries", config.llm.max_retries.to_string(), "PARLEY_LLM_MAX_RETRIES"),
        setting(
            "agent.history_window",
            config.agent.history_window.to_string(),
            "PARLEY_AGENT_HISTORY_WINDOW",
        ),
        setting(
            "agent.history_char_cap",
            config.agent.history_char_cap.to_string(),
            "PARLEY_AGENT_HISTORY_CHAR_CAP",
        ),
        setting(
            "agent.retrieval_top_k",
            config.agent.retrieval_top_k.to_string(),
            "PARLEY_AGENT_RETRIEVAL_TOP_K",
        ),
        setting(
            "agent.analysis_record_cap",
            config.agent.analysis_record_cap.to_string(),
            "PARLEY_AGENT_ANALYSIS_RECORD_CAP",
        ),
        setting("server.bind_address", config.server.bind_address.clone(), "PARLEY_SERVER_BIND_ADDRESS"),
        setting("server.port", config.server.port.to_string(), "PARLEY_SERVER_PORT"),
        setting(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            "PARLEY_SERVER_GRACEFUL_SHUTDOWN_SECS",
        ),
        setting("logging.level", config.logging.level.clone(), "PARLEY_LOGGING_LEVEL"),
        setting("logging.format", format!("{:?}", config.logging.format), "PARLEY_LOGGING_FORMAT"),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("parley.toml"), PathBuf::from("config/parley.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
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

/// Keeps a short recognisable prefix (`sk-`, `sk-ant-`) and hides the rest.
fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.split_once('-') {
        Some((prefix, _)) if prefix.len() <= 4 => format!("{prefix}-***"),
        _ => "<redacted>".to_string(),
    }
}
