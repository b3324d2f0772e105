use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use feedstock_core::config::AppConfig;
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::{load_config, CommandResult};

/// One rendered setting: dotted key, displayed value and the env keys that can override it.
struct Setting {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run() -> CommandResult {
    let config = match load_config("config") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    CommandResult::plain(render(&config))
}

fn render(config: &AppConfig) -> String {
    let file_path = detect_config_path();
    let file_doc = file_path.as_deref().and_then(load_config_file_doc);

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for setting in settings(config) {
        let source = field_source(&setting, file_doc.as_ref(), file_path.as_deref());
        lines.push(format!("- {} = {} (source: {source})", setting.key, setting.value));
    }
    lines.join("\n")
}

fn settings(config: &AppConfig) -> Vec<Setting> {
    vec![
        Setting {
            key: "database.url",
            value: config.database.url.clone(),
            env_keys: &["FEEDSTOCK_DATABASE_URL"],
        },
        Setting {
            key: "database.max_connections",
            value: config.database.max_connections.to_string(),
            env_keys: &["FEEDSTOCK_DATABASE_MAX_CONNECTIONS"],
        },
        Setting {
            key: "database.timeout_secs",
            value: config.database.timeout_secs.to_string(),
            env_keys: &["FEEDSTOCK_DATABASE_TIMEOUT_SECS"],
        },
        Setting {
            key: "server.bind_address",
            value: config.server.bind_address.clone(),
            env_keys: &["FEEDSTOCK_SERVER_BIND_ADDRESS"],
        },
        Setting {
            key: "server.port",
            value: config.server.port.to_string(),
            env_keys: &["FEEDSTOCK_SERVER_PORT", "PORT"],
        },
        Setting {
            key: "server.health_check_port",
            value: config.server.health_check_port.to_string(),
            env_keys: &["FEEDSTOCK_SERVER_HEALTH_CHECK_PORT"],
        },
        Setting {
            key: "server.graceful_shutdown_secs",
            value: config.server.graceful_shutdown_secs.to_string(),
            env_keys: &["FEEDSTOCK_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        },
        Setting {
            key: "auth.jwt_secret",
            value: redact_secret(config.auth.jwt_secret.expose_secret()),
            env_keys: &["FEEDSTOCK_AUTH_JWT_SECRET", "FEEDSTOCK_JWT_SECRET"],
        },
        Setting {
            key: "auth.token_ttl_secs",
            value: config.auth.token_ttl_secs.to_string(),
            env_keys: &["FEEDSTOCK_AUTH_TOKEN_TTL_SECS"],
        },
        Setting {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["FEEDSTOCK_LOGGING_LEVEL", "FEEDSTOCK_LOG_LEVEL"],
        },
        Setting {
            key: "logging.format",
            value: format!("{:?}", config.logging.format).to_ascii_lowercase(),
            env_keys: &["FEEDSTOCK_LOGGING_FORMAT", "FEEDSTOCK_LOG_FORMAT"],
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("feedstock.toml"), PathBuf::from("config/feedstock.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: &Path) -> Option<Value> {
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(setting: &Setting, file_doc: Option<&Value>, file_path: Option<&Path>) -> String {
    if let Some(env_key) = setting.env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = file_doc {
        if contains_path(doc, setting.key) {
            let file_path = file_path
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

fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    format!("<redacted, {} chars>", trimmed.chars().count())
}
