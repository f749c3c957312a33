use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use parley_core::config::{DatabaseConfig, MemoryConfig};
use parley_core::domain::degradation::{Degradable, Degradation};

use crate::repositories::{CheckpointStore, InMemoryCheckpointStore, SqlCheckpointStore};
use crate::{connect_with_settings, migrations, ping};

#[derive(Debug, Error)]
pub enum MemoryStoreError {
    #[error("durable checkpoint store `{url}` is unreachable and memory.required is set: {reason}")]
    Unreachable { url: String, reason: String },
}

/// Opens the durable checkpoint store, or the volatile one when it is unreachable.
///
/// The volatile choice is returned as a degradation and logged at warn so operators can see that
/// conversations will not survive a restart. With `memory.required` the failure is fatal instead.
pub async fn select_checkpoint_store(
    database: &DatabaseConfig,
    memory: &MemoryConfig,
) -> Result<Degradable<Arc<dyn CheckpointStore>>, MemoryStoreError> {
    let url = memory.effective_url(database);

    match open_durable(&url, database).await {
        Ok(store) => {
            info!(
                event_name = "system.memory.ready",
                correlation_id = "bootstrap",
                thread_id = "unknown",
                backend = "durable",
                "checkpoint store ready"
            );
            let store: Arc<dyn CheckpointStore> = Arc::new(store);
            Ok(Degradable::clean(store))
        }
        Err(reason) if memory.required => {
            Err(MemoryStoreError::Unreachable { url, reason })
        }
        Err(reason) => {
            warn!(
                event_name = "system.memory.degraded",
                correlation_id = "bootstrap",
                thread_id = "unknown",
                backend = "volatile",
                reason = %reason,
                "durable checkpoint store unreachable; conversations will not survive a restart"
            );
            let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::default());
            Ok(Degradable::degraded(store, Degradation::VolatileMemory { reason }))
        }
    }
}

async fn open_durable(url: &str, database: &DatabaseConfig) -> Result<SqlCheckpointStore, String> {
    let pool = connect_with_settings(url, database.max_connections, database.timeout_secs)
        .await
        .map_err(|error| format!("connect failed: {error}"))?;
    migrations::run_memory_pending(&pool).await.map_err(|error| format!("migration failed: {error}"))?;
    ping(&pool).await.map_err(|error| format!("ping failed: {error}"))?;
    Ok(SqlCheckpointStore::new(pool))
}
