use std::env;
use std::fs;
use std::path::Path;

use overtime_core::config::{AppConfig, LoadOptions};
use toml::Value;

struct Field {
    key_path: &'static str,
    env_keys: &'static [&'static str],
    overridden: bool,
    value: String,
}

pub fn run(options: &LoadOptions) -> String {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = AppConfig::resolved_path(options);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let overrides = &options.overrides;

    let fields = [
        Field {
            key_path: "database.url",
            env_keys: &["OVERTIME_DATABASE_URL"],
            overridden: overrides.database_url.is_some(),
            value: config.database.url.clone(),
        },
        Field {
            key_path: "database.max_connections",
            env_keys: &["OVERTIME_DATABASE_MAX_CONNECTIONS"],
            overridden: false,
            value: config.database.max_connections.to_string(),
        },
        Field {
            key_path: "database.timeout_secs",
            env_keys: &["OVERTIME_DATABASE_TIMEOUT_SECS"],
            overridden: false,
            value: config.database.timeout_secs.to_string(),
        },
        Field {
            key_path: "workflow.default_page_size",
            env_keys: &["OVERTIME_WORKFLOW_DEFAULT_PAGE_SIZE"],
            overridden: overrides.default_page_size.is_some(),
            value: config.workflow.default_page_size.to_string(),
        },
        Field {
            key_path: "workflow.allow_past_start",
            env_keys: &["OVERTIME_WORKFLOW_ALLOW_PAST_START"],
            overridden: overrides.allow_past_start.is_some(),
            value: config.workflow.allow_past_start.to_string(),
        },
        Field {
            key_path: "logging.level",
            env_keys: &["OVERTIME_LOGGING_LEVEL", "OVERTIME_LOG_LEVEL"],
            overridden: overrides.log_level.is_some(),
            value: config.logging.level.clone(),
        },
        Field {
            key_path: "logging.format",
            env_keys: &["OVERTIME_LOGGING_FORMAT", "OVERTIME_LOG_FORMAT"],
            overridden: overrides.log_format.is_some(),
            value: format!("{:?}", config.logging.format).to_ascii_lowercase(),
        },
    ];

    let mut lines = vec![
        "effective config (source precedence: flag > env > file > default):".to_string(),
    ];
    lines.extend(fields.iter().map(|field| {
        render_line(
            field.key_path,
            &field.value,
            field_source(field, config_file_doc.as_ref(), config_file_path.as_deref()),
        )
    }));

    lines.join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    field: &Field,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if field.overridden {
        return "flag".to_string();
    }

    if let Some(env_key) = field.env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, field.key_path) {
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
