use std::sync::Arc;

use parley_agent::{ChatRuntime, RuntimeBuildError};
use parley_core::config::{AppConfig, ConfigError};
use parley_db::{connect_with_settings, migrations, DbPool};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<ChatRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("chat runtime initialisation failed: {0}")]
    Runtime(#[from] RuntimeBuildError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        thread_id = "unknown",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        thread_id = "unknown",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        thread_id = "unknown",
        "database migrations applied"
    );

    let runtime = ChatRuntime::from_config(&config, db_pool.clone()).await?;
    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        thread_id = "unknown",
        llm_provider = config.llm.provider.as_str(),
        memory_backend = runtime.memory_backend().as_str(),
        "chat runtime initialised"
    );

    Ok(Application { config, db_pool, runtime: Arc::new(runtime) })
}

#[cfg(test)]
mod tests {
    use parley_core::config::{AppConfig, ConfigOverrides, LlmProvider, LoadOptions};
    use parley_db::StoreBackend;

    use crate::bootstrap::{bootstrap_with_config, Application, BootstrapError};

    async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
        bootstrap_with_config(AppConfig::load(options)?).await
    }

    fn options(overrides: ConfigOverrides) -> LoadOptions {
        LoadOptions {
            config_path: Some("does-not-exist/parley.toml".into()),
            overrides,
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_api_key_for_hosted_provider() {
        let result = bootstrap(options(ConfigOverrides {
            database_url: Some("sqlite::memory:".to_string()),
            llm_provider: Some(LlmProvider::OpenAi),
            ..ConfigOverrides::default()
        }))
        .await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("llm.api_key"));
    }

    #[tokio::test]
    async fn bootstrap_wires_comment_schema_apart_from_durable_memory() {
        let app = bootstrap(options(ConfigOverrides {
            database_url: Some("sqlite::memory:?cache=shared".to_string()),
            llm_provider: Some(LlmProvider::Ollama),
            ..ConfigOverrides::default()
        }))
        .await
        .expect("bootstrap should succeed with a local provider");

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' \
             AND name IN ('comments', 'comment_embeddings', 'conversation_checkpoints') \
             ORDER BY name",
        )
        .fetch_all(&app.db_pool)
        .await
        .expect("tables should exist after bootstrap");
        assert_eq!(
            tables,
            vec![("comment_embeddings".to_string(),), ("comments".to_string(),)],
            "checkpoints live in their own database"
        );
        assert_eq!(app.runtime.memory_backend(), StoreBackend::Durable);
        assert!(app.runtime.memory_degradations().is_empty());

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_falls_back_to_volatile_memory_when_store_is_unreachable() {
        let app = bootstrap(options(ConfigOverrides {
            database_url: Some("sqlite::memory:".to_string()),
            memory_url: Some("sqlite:///nonexistent-parley-dir/checkpoints.db".to_string()),
            llm_provider: Some(LlmProvider::Ollama),
            ..ConfigOverrides::default()
        }))
        .await
        .expect("volatile fallback keeps the service up");

        assert_eq!(app.runtime.memory_backend(), StoreBackend::Volatile);
        assert_eq!(app.runtime.memory_degradations().len(), 1);
    }

    #[tokio::test]
    async fn bootstrap_refuses_volatile_memory_when_durability_is_required() {
        let result = bootstrap(options(ConfigOverrides {
            database_url: Some("sqlite::memory:".to_string()),
            memory_url: Some("sqlite:///nonexistent-parley-dir/checkpoints.db".to_string()),
            memory_required: Some(true),
            llm_provider: Some(LlmProvider::Ollama),
            ..ConfigOverrides::default()
        }))
        .await;

        assert!(matches!(result, Err(BootstrapError::Runtime(_))));
    }
}
