use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use benefitflow_core::config::{AppConfig, LoadOptions, LogFormat};
use toml::Value;

use crate::commands::CommandResult;

struct Entry {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            )
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for entry in entries(&config) {
        let source = field_source(
            entry.key,
            entry.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", entry.key, entry.value));
    }

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn entries(config: &AppConfig) -> Vec<Entry> {
    let entry = |key, env_key, value: String| Entry { key, env_key, value };
    vec![
        entry("database.url", "BENEFITFLOW_DATABASE_URL", config.database.url.clone()),
        entry(
            "database.max_connections",
            "BENEFITFLOW_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        entry(
            "database.timeout_secs",
            "BENEFITFLOW_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        entry(
            "server.bind_address",
            "BENEFITFLOW_SERVER_BIND_ADDRESS",
            config.server.bind_address.clone(),
        ),
        entry("server.port", "BENEFITFLOW_SERVER_PORT", config.server.port.to_string()),
        entry(
            "server.graceful_shutdown_secs",
            "BENEFITFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS",
            config.server.graceful_shutdown_secs.to_string(),
        ),
        entry("logging.level", "BENEFITFLOW_LOGGING_LEVEL", config.logging.level.clone()),
        entry(
            "logging.format",
            "BENEFITFLOW_LOGGING_FORMAT",
            log_format_name(config.logging.format).to_string(),
        ),
        entry(
            "workflow.max_conflict_retries",
            "BENEFITFLOW_WORKFLOW_MAX_CONFLICT_RETRIES",
            config.workflow.max_conflict_retries.to_string(),
        ),
        entry(
            "site.utc_offset_minutes",
            "BENEFITFLOW_SITE_UTC_OFFSET_MINUTES",
            config.site.utc_offset_minutes.to_string(),
        ),
        entry(
            "benefits.standard_medical_ceiling",
            "BENEFITFLOW_BENEFITS_STANDARD_MEDICAL_CEILING",
            config.benefits.standard_medical_ceiling.to_string(),
        ),
        entry(
            "benefits.executive_medical_ceiling",
            "BENEFITFLOW_BENEFITS_EXECUTIVE_MEDICAL_CEILING",
            config.benefits.executive_medical_ceiling.to_string(),
        ),
    ]
}

fn log_format_name(format: LogFormat) -> &'static str {
    match format {
        LogFormat::Compact => "compact",
        LogFormat::Pretty => "pretty",
        LogFormat::Json => "json",
    }
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("benefitflow.toml"), PathBuf::from("config/benefitflow.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
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

    if config_file_doc.is_some_and(|doc| contains_path(doc, key_path)) {
        let file_path = config_file_path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_string());
        return format!("file ({file_path})");
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
