use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::search::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// Searched in order when no explicit path is given.
pub const DEFAULT_CONFIG_FILES: [&str; 2] = ["overtime.toml", "config/overtime.toml"];

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const MAX_TIMEOUT_SECS: u64 = 300;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub workflow: WorkflowConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowConfig {
    pub default_page_size: u32,
    /// Lets requests start in the past; only meant for importing history.
    pub allow_past_start: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

/// Per-invocation values from command-line flags. These win over every other source.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub default_page_size: Option<u32>,
    pub allow_past_start: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("`{path}` is not valid config TOML: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("config file `{0}` does not exist")]
    MissingConfigFile(PathBuf),
    #[error("`${{{var}}}` is referenced in the config file but not set")]
    MissingEnvInterpolation { var: String },
    #[error("`${{` in the config file has no closing `}}`")]
    UnterminatedInterpolation,
    #[error("{key}={value} cannot be parsed")]
    InvalidEnvOverride { key: String, value: String },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://overtime.db".to_owned(),
                max_connections: 5,
                timeout_secs: 30,
            },
            workflow: WorkflowConfig {
                default_page_size: DEFAULT_PAGE_SIZE,
                allow_past_start: false,
            },
            logging: LoggingConfig { level: "info".to_owned(), format: LogFormat::Compact },
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let format = match raw.trim().to_ascii_lowercase().as_str() {
            "compact" => Self::Compact,
            "pretty" => Self::Pretty,
            "json" => Self::Json,
            other => {
                return Err(ConfigError::Validation(format!(
                    "logging.format `{other}` is not one of compact, pretty or json"
                )))
            }
        };
        Ok(format)
    }
}

impl AppConfig {
    /// Builds the effective config. Sources are layered defaults, then file, then
    /// `OVERTIME_*` environment, then flags, and the result is validated once.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        match Self::resolved_path(&options) {
            Some(path) => config.merge(file_layer(&path)?),
            None if options.require_file => {
                let wanted = options
                    .config_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILES[0]));
                return Err(ConfigError::MissingConfigFile(wanted));
            }
            None => {}
        }

        config.merge(env_layer()?);
        config.merge(Layer::from(options.overrides));
        config.validate()?;
        Ok(config)
    }

    /// The file `load` would read for these options, if any.
    pub fn resolved_path(options: &LoadOptions) -> Option<PathBuf> {
        match options.config_path.as_deref() {
            Some(explicit) => explicit.exists().then(|| explicit.to_path_buf()),
            None => DEFAULT_CONFIG_FILES.iter().map(PathBuf::from).find(|path| path.exists()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.database.url.trim();
        if !(url.starts_with("sqlite:") || url == ":memory:") {
            return Err(invalid(format!(
                "database.url `{url}` is not a sqlite URL \
                 (sqlite://path, sqlite::memory: or :memory:)"
            )));
        }
        if self.database.max_connections == 0 {
            return Err(invalid("database.max_connections must be at least 1".to_owned()));
        }
        if !(1..=MAX_TIMEOUT_SECS).contains(&self.database.timeout_secs) {
            return Err(invalid(format!(
                "database.timeout_secs must be between 1 and {MAX_TIMEOUT_SECS}"
            )));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.workflow.default_page_size) {
            return Err(invalid(format!(
                "workflow.default_page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        let level = self.logging.level.trim().to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(invalid(format!(
                "logging.level `{level}` is not one of {}",
                LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }

    fn merge(&mut self, layer: Layer) {
        let Layer {
            database_url,
            max_connections,
            timeout_secs,
            default_page_size,
            allow_past_start,
            log_level,
            log_format,
        } = layer;

        replace(&mut self.database.url, database_url);
        replace(&mut self.database.max_connections, max_connections);
        replace(&mut self.database.timeout_secs, timeout_secs);
        replace(&mut self.workflow.default_page_size, default_page_size);
        replace(&mut self.workflow.allow_past_start, allow_past_start);
        replace(&mut self.logging.level, log_level);
        replace(&mut self.logging.format, log_format);
    }
}

fn replace<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn invalid(message: String) -> ConfigError {
    ConfigError::Validation(message)
}

/// One source's worth of settings; `None` leaves the lower layer in place.
#[derive(Debug, Default)]
struct Layer {
    database_url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
    default_page_size: Option<u32>,
    allow_past_start: Option<bool>,
    log_level: Option<String>,
    log_format: Option<LogFormat>,
}

impl From<ConfigOverrides> for Layer {
    fn from(flags: ConfigOverrides) -> Self {
        Self {
            database_url: flags.database_url,
            default_page_size: flags.default_page_size,
            allow_past_start: flags.allow_past_start,
            log_level: flags.log_level,
            log_format: flags.log_format,
            ..Self::default()
        }
    }
}

/// On-disk shape of `overtime.toml`. Every table and key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileDocument {
    database: DatabaseSection,
    workflow: WorkflowSection,
    logging: LoggingSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DatabaseSection {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct WorkflowSection {
    default_page_size: Option<u32>,
    allow_past_start: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LoggingSection {
    level: Option<String>,
    format: Option<LogFormat>,
}

fn file_layer(path: &Path) -> Result<Layer, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    let document: FileDocument = toml::from_str(&expand_env_refs(&raw)?)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })?;

    let FileDocument { database, workflow, logging } = document;
    Ok(Layer {
        database_url: database.url,
        max_connections: database.max_connections,
        timeout_secs: database.timeout_secs,
        default_page_size: workflow.default_page_size,
        allow_past_start: workflow.allow_past_start,
        log_level: logging.level,
        log_format: logging.format,
    })
}

/// Replaces every `${NAME}` with the value of that environment variable.
fn expand_env_refs(raw: &str) -> Result<String, ConfigError> {
    let mut expanded = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(open) = rest.find("${") {
        expanded.push_str(&rest[..open]);
        let tail = &rest[open + 2..];
        let close = tail.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let name = &tail[..close];
        let value = env::var(name)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: name.to_owned() })?;
        expanded.push_str(&value);
        rest = &tail[close + 1..];
    }

    expanded.push_str(rest);
    Ok(expanded)
}

fn env_layer() -> Result<Layer, ConfigError> {
    Ok(Layer {
        database_url: env_value(&["OVERTIME_DATABASE_URL"])?,
        max_connections: env_value(&["OVERTIME_DATABASE_MAX_CONNECTIONS"])?,
        timeout_secs: env_value(&["OVERTIME_DATABASE_TIMEOUT_SECS"])?,
        default_page_size: env_value(&["OVERTIME_WORKFLOW_DEFAULT_PAGE_SIZE"])?,
        allow_past_start: env_value(&["OVERTIME_WORKFLOW_ALLOW_PAST_START"])?,
        log_level: env_value(&["OVERTIME_LOGGING_LEVEL", "OVERTIME_LOG_LEVEL"])?,
        log_format: env_value(&["OVERTIME_LOGGING_FORMAT", "OVERTIME_LOG_FORMAT"])?,
    })
}

/// Reads the first non-blank variable among `keys`; later keys are aliases.
fn env_value<T: FromStr>(keys: &[&str]) -> Result<Option<T>, ConfigError> {
    let found = keys.iter().find_map(|key| {
        env::var(key).ok().filter(|value| !value.trim().is_empty()).map(|value| (*key, value))
    });

    match found {
        None => Ok(None),
        Some((key, value)) => value.trim().parse::<T>().map(Some).map_err(|_| {
            ConfigError::InvalidEnvOverride { key: key.to_owned(), value }
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

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
    fn defaults_are_valid_and_conservative() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.workflow.default_page_size == 10, "default page size should be 10")?;
        ensure(!config.workflow.allow_past_start, "past starts should be refused by default")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_OVERTIME_DB_PATH", "plant-7.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("overtime.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://${TEST_OVERTIME_DB_PATH}"

[workflow]
default_page_size = 25
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://plant-7.db",
                "database url should be interpolated from environment",
            )?;
            ensure(config.workflow.default_page_size == 25, "page size should come from file")?;
            Ok(())
        })();

        clear_vars(&["TEST_OVERTIME_DB_PATH"]);
        result
    }

    #[test]
    fn missing_interpolation_variable_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("overtime.toml");
        fs::write(&path, "[database]\nurl = \"${TEST_OVERTIME_UNSET_VAR}\"\n")
            .map_err(|err| err.to_string())?;

        let result =
            AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() });

        ensure(
            matches!(
                result,
                Err(ConfigError::MissingEnvInterpolation { ref var })
                    if var == "TEST_OVERTIME_UNSET_VAR"
            ),
            "unset interpolation variable should fail the load",
        )
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("OVERTIME_LOG_LEVEL", "warn");
        env::set_var("OVERTIME_LOG_FORMAT", "pretty");

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

        clear_vars(&["OVERTIME_LOG_LEVEL", "OVERTIME_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("OVERTIME_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("OVERTIME_WORKFLOW_ALLOW_PAST_START", "true");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("overtime.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"
max_connections = 3

[workflow]
default_page_size = 20
allow_past_start = false

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
            ensure(config.database.max_connections == 3, "file max_connections should apply")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.workflow.allow_past_start, "env flag should win over file")?;
            ensure(config.workflow.default_page_size == 20, "file page size should apply")?;
            Ok(())
        })();

        clear_vars(&["OVERTIME_DATABASE_URL", "OVERTIME_WORKFLOW_ALLOW_PAST_START"]);
        result
    }

    #[test]
    fn invalid_env_numbers_are_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("OVERTIME_DATABASE_MAX_CONNECTIONS", "many");

        let result = AppConfig::load(LoadOptions::default());
        clear_vars(&["OVERTIME_DATABASE_MAX_CONNECTIONS"]);

        ensure(
            matches!(
                result,
                Err(ConfigError::InvalidEnvOverride { ref key, .. })
                    if key == "OVERTIME_DATABASE_MAX_CONNECTIONS"
            ),
            "non-numeric max connections should be rejected",
        )
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = match AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                default_page_size: Some(51),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }) {
            Ok(_) => {
                return Err("expected validation failure but config load succeeded".to_string())
            }
            Err(error) => error,
        };
        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("workflow.default_page_size")
        );
        ensure(has_message, "validation failure should mention workflow.default_page_size")?;

        let error = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("postgres://nope".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });
        ensure(
            matches!(
                error,
                Err(ConfigError::Validation(ref message)) if message.contains("database.url")
            ),
            "non-sqlite url should be rejected",
        )
    }

    #[test]
    fn required_file_must_exist() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let missing = dir.path().join("absent.toml");
        let result = AppConfig::load(LoadOptions {
            config_path: Some(missing),
            require_file: true,
            ..LoadOptions::default()
        });

        ensure(
            matches!(result, Err(ConfigError::MissingConfigFile(_))),
            "missing required file should be reported",
        )
    }

    #[test]
    fn unclosed_interpolation_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("overtime.toml");
        fs::write(&path, "[database]\nurl = \"sqlite://${PLANT\"\n")
            .map_err(|err| err.to_string())?;

        let result =
            AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() });
        ensure(
            matches!(result, Err(ConfigError::UnterminatedInterpolation)),
            "a `${` without `}` should fail the load",
        )
    }

    #[test]
    fn unknown_log_format_in_env_names_the_variable() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("OVERTIME_LOGGING_FORMAT", "xml");
        let result = AppConfig::load(LoadOptions::default());
        clear_vars(&["OVERTIME_LOGGING_FORMAT"]);

        ensure(
            matches!(
                result,
                Err(ConfigError::InvalidEnvOverride { ref key, ref value })
                    if key == "OVERTIME_LOGGING_FORMAT" && value == "xml"
            ),
            "unsupported env log format should be rejected",
        )
    }
}
