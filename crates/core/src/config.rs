use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::FixedOffset;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::eligibility::EligibilityPolicy;

const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub workflow: WorkflowConfig,
    pub site: SiteConfig,
    pub benefits: BenefitsConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    /// Re-read and re-apply attempts after an optimistic-concurrency conflict.
    pub max_conflict_retries: u32,
}

/// Wall-clock frame for booking times and "today".
#[derive(Clone, Debug)]
pub struct SiteConfig {
    pub utc_offset_minutes: i32,
}

#[derive(Clone, Debug)]
pub struct BenefitsConfig {
    pub standard_medical_ceiling: Decimal,
    pub executive_medical_ceiling: Decimal,
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
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
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
        let policy = EligibilityPolicy::default();
        Self {
            database: DatabaseConfig {
                url: "sqlite://benefitflow.db?mode=rwc".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            workflow: WorkflowConfig { max_conflict_retries: 3 },
            site: SiteConfig { utc_offset_minutes: 0 },
            benefits: BenefitsConfig {
                standard_medical_ceiling: policy.standard_medical_ceiling,
                executive_medical_ceiling: policy.executive_medical_ceiling,
            },
        }
    }
}

impl FromStr for LogFormat {
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

impl SiteConfig {
    pub fn offset(&self) -> Result<FixedOffset, ConfigError> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            ConfigError::Validation(format!(
                "site.utc_offset_minutes must be in range -{MAX_UTC_OFFSET_MINUTES}..={MAX_UTC_OFFSET_MINUTES}"
            ))
        })
    }
}

impl BenefitsConfig {
    pub fn eligibility_policy(&self) -> EligibilityPolicy {
        EligibilityPolicy {
            standard_medical_ceiling: self.standard_medical_ceiling,
            executive_medical_ceiling: self.executive_medical_ceiling,
            ..EligibilityPolicy::default()
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
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("benefitflow.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
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

        if let Some(retries) = patch.workflow.and_then(|workflow| workflow.max_conflict_retries) {
            self.workflow.max_conflict_retries = retries;
        }

        if let Some(offset) = patch.site.and_then(|site| site.utc_offset_minutes) {
            self.site.utc_offset_minutes = offset;
        }

        if let Some(benefits) = patch.benefits {
            if let Some(ceiling) = benefits.standard_medical_ceiling {
                self.benefits.standard_medical_ceiling = ceiling;
            }
            if let Some(ceiling) = benefits.executive_medical_ceiling {
                self.benefits.executive_medical_ceiling = ceiling;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("BENEFITFLOW_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("BENEFITFLOW_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_env("BENEFITFLOW_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("BENEFITFLOW_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("BENEFITFLOW_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("BENEFITFLOW_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("BENEFITFLOW_SERVER_PORT") {
            self.server.port = parse_env("BENEFITFLOW_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("BENEFITFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_env("BENEFITFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("BENEFITFLOW_LOGGING_LEVEL").or_else(|| read_env("BENEFITFLOW_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("BENEFITFLOW_LOGGING_FORMAT").or_else(|| read_env("BENEFITFLOW_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        if let Some(value) = read_env("BENEFITFLOW_WORKFLOW_MAX_CONFLICT_RETRIES") {
            self.workflow.max_conflict_retries =
                parse_env("BENEFITFLOW_WORKFLOW_MAX_CONFLICT_RETRIES", &value)?;
        }
        if let Some(value) = read_env("BENEFITFLOW_SITE_UTC_OFFSET_MINUTES") {
            self.site.utc_offset_minutes = parse_env("BENEFITFLOW_SITE_UTC_OFFSET_MINUTES", &value)?;
        }
        if let Some(value) = read_env("BENEFITFLOW_BENEFITS_STANDARD_MEDICAL_CEILING") {
            self.benefits.standard_medical_ceiling =
                parse_env("BENEFITFLOW_BENEFITS_STANDARD_MEDICAL_CEILING", &value)?;
        }
        if let Some(value) = read_env("BENEFITFLOW_BENEFITS_EXECUTIVE_MEDICAL_CEILING") {
            self.benefits.executive_medical_ceiling =
                parse_env("BENEFITFLOW_BENEFITS_EXECUTIVE_MEDICAL_CEILING", &value)?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        validate_workflow(&self.workflow)?;
        self.site.offset()?;
        validate_benefits(&self.benefits)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("benefitflow.toml"), PathBuf::from("config/benefitflow.toml")]
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

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
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

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    if workflow.max_conflict_retries > 20 {
        return Err(ConfigError::Validation(
            "workflow.max_conflict_retries must be in range 0..=20".to_string(),
        ));
    }
    Ok(())
}

fn validate_benefits(benefits: &BenefitsConfig) -> Result<(), ConfigError> {
    if benefits.standard_medical_ceiling <= Decimal::ZERO
        || benefits.executive_medical_ceiling <= Decimal::ZERO
    {
        return Err(ConfigError::Validation(
            "benefits medical ceilings must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
{
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
    workflow: Option<WorkflowPatch>,
    site: Option<SitePatch>,
    benefits: Option<BenefitsPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    max_conflict_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct SitePatch {
    utc_offset_minutes: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
struct BenefitsPatch {
    standard_medical_ceiling: Option<Decimal>,
    executive_medical_ceiling: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use rust_decimal::Decimal;
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
    fn defaults_load_without_a_file() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let config = AppConfig::load(LoadOptions {
            config_path: Some(dir.path().join("absent.toml")),
            ..LoadOptions::default()
        })
        .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.database.url == "sqlite://benefitflow.db?mode=rwc", "default database url")?;
        ensure(matches!(config.logging.format, LogFormat::Compact), "default format is compact")?;
        ensure(config.workflow.max_conflict_retries == 3, "default retry budget is three")?;
        ensure(
            config.benefits.standard_medical_ceiling == Decimal::from(60_000),
            "standard ceiling defaults to 60,000",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_BENEFITFLOW_DB", "sqlite://interpolated.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("benefitflow.toml");
            fs::write(
                &path,
                r#"
[database]
url = "${TEST_BENEFITFLOW_DB}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://interpolated.db",
                "database url should be loaded from environment",
            )
        })();

        clear_vars(&["TEST_BENEFITFLOW_DB"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BENEFITFLOW_LOG_LEVEL", "warn");
        env::set_var("BENEFITFLOW_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )
        })();

        clear_vars(&["BENEFITFLOW_LOG_LEVEL", "BENEFITFLOW_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BENEFITFLOW_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("BENEFITFLOW_WORKFLOW_MAX_CONFLICT_RETRIES", "5");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("benefitflow.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[workflow]
max_conflict_retries = 1

[site]
utc_offset_minutes = 480

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.workflow.max_conflict_retries == 5,
                "env retry budget should win over file",
            )?;
            ensure(config.site.utc_offset_minutes == 480, "file site offset should apply")
        })();

        clear_vars(&["BENEFITFLOW_DATABASE_URL", "BENEFITFLOW_WORKFLOW_MAX_CONFLICT_RETRIES"]);
        result
    }

    #[test]
    fn benefit_ceilings_flow_into_eligibility_policy() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("benefitflow.toml");
        fs::write(
            &path,
            r#"
[benefits]
standard_medical_ceiling = 75000
executive_medical_ceiling = "150000.50"
"#,
        )
        .map_err(|err| err.to_string())?;

        let config =
            AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                .map_err(|err| format!("config load failed: {err}"))?;
        let policy = config.benefits.eligibility_policy();

        ensure(policy.standard_medical_ceiling == Decimal::from(75_000), "standard ceiling")?;
        ensure(
            policy.executive_medical_ceiling == Decimal::new(15_000_050, 2),
            "executive ceiling",
        )?;
        ensure(policy.salary_loan_floor == Decimal::from(10_000), "floor keeps its default")
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BENEFITFLOW_SITE_UTC_OFFSET_MINUTES", "1500");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("site.utc_offset_minutes")
            );
            ensure(has_message, "validation failure should mention site.utc_offset_minutes")
        })();

        clear_vars(&["BENEFITFLOW_SITE_UTC_OFFSET_MINUTES"]);
        result
    }

    #[test]
    fn malformed_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BENEFITFLOW_SERVER_PORT", "eighty");

        let result = (|| -> Result<(), String> {
            let error = AppConfig::load(LoadOptions::default())
                .err()
                .ok_or_else(|| "expected env override failure".to_string())?;
            ensure(
                matches!(error, ConfigError::InvalidEnvOverride { ref key, .. } if key == "BENEFITFLOW_SERVER_PORT"),
                "invalid port should name the env var",
            )
        })();

        clear_vars(&["BENEFITFLOW_SERVER_PORT"]);
        result
    }
}
