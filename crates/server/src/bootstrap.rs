use feedstock_core::auth::TokenService;
use feedstock_core::config::{AppConfig, ConfigError, LoadOptions, LogFormat};
use feedstock_core::errors::ApplicationError;
use feedstock_db::{connect_from_config, migrations, DbPool};
use thiserror::Error;
use tracing::info;
use tracing::Level;

use crate::api::AppState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("token service setup failed: {0}")]
    Auth(#[source] ApplicationError),
}

pub fn init_logging(config: &AppConfig) {
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt().with_target(false).with_max_level(log_level);

    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let tokens = TokenService::from_config(&config.auth).map_err(BootstrapError::Auth)?;

    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        max_connections = config.database.max_connections,
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let state = AppState::new(db_pool.clone(), tokens);
    Ok(Application { config, db_pool, state })
}

#[cfg(test)]
mod tests {
    use feedstock_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    const SECRET: &str = "bootstrap-test-secret-0123456789abcdef";

    fn overrides(database_url: &str, jwt_secret: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                jwt_secret: Some(jwt_secret.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_with_a_short_jwt_secret() {
        let result = bootstrap(overrides("sqlite::memory:", "short")).await;

        let message = result.err().map(|error| error.to_string()).unwrap_or_default();
        assert!(message.contains("auth.jwt_secret"), "unexpected error: {message}");
    }

    #[tokio::test]
    async fn bootstrap_connects_and_applies_the_schema() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("feedstock.db").display());
        let app = bootstrap(overrides(&url, SECRET))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
             ('rate_card', 'plant_intake_entry', 'center_receipt_lot', \
              'center_stock_ledger', 'invoice_cycle', 'invoice')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema lookup");
        assert_eq!(table_count, 6);

        let token = app
            .state
            .tokens
            .issue("tenant-a", "ops-user", feedstock_core::domain::tenant::Role::Operations)
            .expect("token");
        let claims = app.state.tokens.verify(&token).expect("claims");
        assert_eq!(claims.tenant_id, "tenant-a");

        app.db_pool.close().await;
    }
}
