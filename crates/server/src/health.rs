use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use parley_agent::ChatRuntime;
use parley_db::{ping, DbPool, StoreBackend};
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    memory: MemoryHealth,
}

impl HealthState {
    pub fn new(db_pool: DbPool, runtime: &ChatRuntime) -> Self {
        Self { db_pool, memory: MemoryHealth::from_runtime(runtime) }
    }
}

/// How the checkpoint store was chosen at startup. It does not change while the process runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryHealth {
    pub backend: StoreBackend,
    pub reason: Option<String>,
}

impl MemoryHealth {
    pub fn from_runtime(runtime: &ChatRuntime) -> Self {
        Self {
            backend: runtime.memory_backend(),
            reason: runtime
                .memory_degradations()
                .first()
                .map(|degradation| degradation.reason().to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub memory: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

/// `503` only when the comment database is unreachable. Volatile memory still serves
/// answers, so it reports `degraded` with `200`.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let memory = memory_check(&state.memory);
    let database_ready = database.status == "ready";
    let ready = database_ready && memory.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "parley-server runtime initialized".to_string(),
        },
        database,
        memory,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if database_ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match ping(pool).await {
        Ok(()) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

fn memory_check(memory: &MemoryHealth) -> HealthCheck {
    match memory.backend {
        StoreBackend::Durable => {
            HealthCheck { status: "ready", detail: "durable checkpoint store".to_string() }
        }
        StoreBackend::Volatile => HealthCheck {
            status: "degraded",
            detail: format!(
                "volatile checkpoint store; conversations will not survive a restart ({})",
                memory.reason.as_deref().unwrap_or("durable store unavailable")
            ),
        },
    }
}
