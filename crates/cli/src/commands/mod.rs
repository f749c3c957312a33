pub mod ask;
pub mod config;
pub mod doctor;
pub mod history;
pub mod migrate;

use parley_core::config::{AppConfig, LoadOptions};
use parley_core::errors::ApplicationError;
use parley_db::{connect_with_settings, migrations, DbPool};
use serde::Serialize;
use tokio::runtime::Runtime;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME_INIT: u8 = 3;
pub const EXIT_DB_CONNECTIVITY: u8 = 4;
pub const EXIT_MIGRATION: u8 = 5;
pub const EXIT_INVALID_INPUT: u8 = 6;
pub const EXIT_MODEL_UNAVAILABLE: u8 = 7;
pub const EXIT_PERSISTENCE: u8 = 8;
pub const EXIT_INTERNAL: u8 = 9;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Turn failures keep the class the HTTP surface would give them.
    pub fn from_application_error(command: &str, error: ApplicationError) -> Self {
        let (error_class, exit_code) = match &error {
            ApplicationError::InvalidInput(_) => ("invalid_input", EXIT_INVALID_INPUT),
            ApplicationError::ModelUnavailable(_) | ApplicationError::Integration(_) => {
                ("model_unavailable", EXIT_MODEL_UNAVAILABLE)
            }
            ApplicationError::Persistence(_) => ("persistence", EXIT_PERSISTENCE),
            ApplicationError::Configuration(_) => ("config_validation", EXIT_CONFIG),
            ApplicationError::Domain(_) => ("internal", EXIT_INTERNAL),
        };
        Self::failure(command, error_class, error.to_string(), exit_code)
    }
}

pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            EXIT_CONFIG,
        )
    })
}

pub(crate) fn async_runtime(command: &str) -> Result<Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            EXIT_RUNTIME_INIT,
        )
    })
}

/// Which migration set a database carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Schema {
    Comments,
    Checkpoints,
}

/// Connects to `url` and brings its `schema` up to date.
pub(crate) async fn open_migrated(
    command: &str,
    url: &str,
    schema: Schema,
    config: &AppConfig,
) -> Result<DbPool, CommandResult> {
    let pool =
        connect_with_settings(url, config.database.max_connections, config.database.timeout_secs)
            .await
            .map_err(|error| {
                CommandResult::failure(
                    command,
                    "db_connectivity",
                    error.to_string(),
                    EXIT_DB_CONNECTIVITY,
                )
            })?;
    let migrated = match schema {
        Schema::Comments => migrations::run_pending(&pool).await,
        Schema::Checkpoints => migrations::run_memory_pending(&pool).await,
    };
    migrated.map_err(|error| {
        CommandResult::failure(command, "migration", error.to_string(), EXIT_MIGRATION)
    })?;
    Ok(pool)
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
