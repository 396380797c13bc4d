use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use devolucion_core::config::{AppConfig, LoadOptions};
use serde::Serialize;
use toml::Value;

use crate::commands::CommandResult;

const COMMAND: &str = "config";

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            );
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let fields: [(&'static str, String, &[&str]); 7] = [
        ("database.url", config.database.url.clone(), &["DEVOLUCION_DATABASE_URL"]),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["DEVOLUCION_DATABASE_MAX_CONNECTIONS"],
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["DEVOLUCION_DATABASE_TIMEOUT_SECS"],
        ),
        (
            "lifecycle.estimated_resolution_days",
            config.lifecycle.estimated_resolution_days.to_string(),
            &["DEVOLUCION_LIFECYCLE_ESTIMATED_RESOLUTION_DAYS"],
        ),
        (
            "lifecycle.folio_prefix",
            config.lifecycle.folio_prefix.clone(),
            &["DEVOLUCION_LIFECYCLE_FOLIO_PREFIX"],
        ),
        (
            "logging.level",
            config.logging.level.clone(),
            &["DEVOLUCION_LOGGING_LEVEL", "DEVOLUCION_LOG_LEVEL"],
        ),
        (
            "logging.format",
            config.logging.format.as_str().to_string(),
            &["DEVOLUCION_LOGGING_FORMAT", "DEVOLUCION_LOG_FORMAT"],
        ),
    ];

    let entries: Vec<ConfigEntry> = fields
        .into_iter()
        .map(|(key, value, env_keys)| {
            let source =
                field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
            ConfigEntry { key, value, source }
        })
        .collect();

    CommandResult::success_with_data(
        COMMAND,
        "effective config (source precedence: env > file > default)",
        entries,
    )
}

fn detect_config_path() -> Option<PathBuf> {
    ["devolucion.toml", "config/devolucion.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
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

#[cfg(test)]
mod tests {
    use super::contains_path;

    #[test]
    fn contains_path_walks_nested_tables() {
        let doc: toml::Value = "[lifecycle]\nfolio_prefix = \"SAT\"\n".parse().expect("toml");

        assert!(contains_path(&doc, "lifecycle.folio_prefix"));
        assert!(!contains_path(&doc, "lifecycle.estimated_resolution_days"));
        assert!(!contains_path(&doc, "database.url"));
    }
}
