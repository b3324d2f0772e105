use std::env;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use feedstock_cli::commands::{config, doctor, migrate, seed, token};
use serde_json::Value;

const SECRET: &str = "cli-test-signing-secret-0123456789abcdef";

#[test]
fn migrate_applies_schema_then_reports_up_to_date() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(dir.path());

    with_env(&[("FEEDSTOCK_DATABASE_URL", &url), ("FEEDSTOCK_AUTH_JWT_SECRET", SECRET)], || {
        let first = migrate::run();
        assert_eq!(first.exit_code, 0, "expected successful migrate run: {}", first.output);
        let payload = parse_payload(&first.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert!(payload["message"].as_str().unwrap_or_default().starts_with("applied"));

        let second = migrate::run();
        let payload = parse_payload(&second.output);
        assert_eq!(payload["message"], "schema already up to date");
    });
}

#[test]
fn migrate_returns_config_failure_without_a_jwt_secret() {
    with_env(&[("FEEDSTOCK_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_loads_demo_tenant_and_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(dir.path());

    with_env(&[("FEEDSTOCK_DATABASE_URL", &url), ("FEEDSTOCK_AUTH_JWT_SECRET", SECRET)], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected seed success: {}", first.output);
        let first_payload = parse_payload(&first.output);
        assert_eq!(first_payload["command"], "seed");
        let message = first_payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("demo-tenant"));
        assert!(message.contains("c15a7d20-6e4f-4a1b-9d3c-2e1f0a9b8c71"));

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed success: {}", second.output);
        assert_eq!(first_payload["message"], parse_payload(&second.output)["message"]);
    });
}

#[test]
fn doctor_passes_after_migrations_and_flags_a_fresh_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(dir.path());

    with_env(&[("FEEDSTOCK_DATABASE_URL", &url), ("FEEDSTOCK_AUTH_JWT_SECRET", SECRET)], || {
        let before = doctor::run(true);
        assert_eq!(before.exit_code, 1);
        let report = parse_payload(&before.output);
        assert_eq!(report["overall_status"], "fail");
        assert_eq!(check_status(&report, "database_connectivity"), "pass");
        assert_eq!(check_status(&report, "schema_migrations"), "fail");

        assert_eq!(migrate::run().exit_code, 0);

        let after = doctor::run(true);
        assert_eq!(after.exit_code, 0, "doctor should pass: {}", after.output);
        let report = parse_payload(&after.output);
        assert_eq!(check_status(&report, "token_signing"), "pass");
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_fails() {
    with_env(&[], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 1);
        assert!(result.output.contains("[fail] config_validation"));
        assert!(result.output.contains("[skip] database_connectivity"));
    });
}

#[test]
fn config_redacts_the_signing_secret_and_attributes_sources() {
    with_env(
        &[("FEEDSTOCK_AUTH_JWT_SECRET", SECRET), ("FEEDSTOCK_SERVER_PORT", "7100")],
        || {
            let result = config::run();
            assert_eq!(result.exit_code, 0);
            assert!(!result.output.contains(SECRET));
            assert!(result.output.contains("- server.port = 7100 (source: env (FEEDSTOCK_SERVER_PORT))"));
            assert!(result.output.contains("- database.url = sqlite://feedstock.db (source: default)"));
        },
    );
}

#[test]
fn token_issues_a_jwt_and_rejects_unknown_roles() {
    with_env(&[("FEEDSTOCK_AUTH_JWT_SECRET", SECRET)], || {
        let issued = token::run("demo-tenant", "ops-user", "operations");
        assert_eq!(issued.exit_code, 0);
        let payload = parse_payload(&issued.output);
        assert_eq!(payload["message"].as_str().unwrap_or_default().split('.').count(), 3);

        let rejected = token::run("demo-tenant", "ops-user", "superuser");
        assert_eq!(rejected.exit_code, 2);
        assert_eq!(parse_payload(&rejected.output)["error_class"], "invalid_argument");
    });
}

fn database_url(dir: &Path) -> String {
    format!("sqlite://{}", dir.join("feedstock.db").display())
}

fn check_status(report: &Value, name: &str) -> String {
    report["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .and_then(|check| check["status"].as_str())
        .unwrap_or_default()
        .to_string()
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let keys = [
        "FEEDSTOCK_DATABASE_URL",
        "FEEDSTOCK_DATABASE_MAX_CONNECTIONS",
        "FEEDSTOCK_DATABASE_TIMEOUT_SECS",
        "FEEDSTOCK_SERVER_BIND_ADDRESS",
        "FEEDSTOCK_SERVER_PORT",
        "PORT",
        "FEEDSTOCK_SERVER_HEALTH_CHECK_PORT",
        "FEEDSTOCK_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "FEEDSTOCK_AUTH_JWT_SECRET",
        "FEEDSTOCK_JWT_SECRET",
        "FEEDSTOCK_AUTH_TOKEN_TTL_SECS",
        "FEEDSTOCK_LOGGING_LEVEL",
        "FEEDSTOCK_LOGGING_FORMAT",
        "FEEDSTOCK_LOG_LEVEL",
        "FEEDSTOCK_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
