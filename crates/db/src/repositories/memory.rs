use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use parley_core::domain::checkpoint::{Checkpoint, ConversationSummary};

use super::{CheckpointStore, RepositoryError, StoreBackend};

/// Process-local checkpoints. Lost on restart.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: RwLock<HashMap<String, StoredCheckpoint>>,
}

struct StoredCheckpoint {
    checkpoint: Checkpoint,
    created_at: DateTime<Utc>,
}

#[async_trait::async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::Volatile
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, RepositoryError> {
        let checkpoints = self.checkpoints.read().await;
        Ok(checkpoints.get(thread_id).map(|stored| stored.checkpoint.clone()))
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), RepositoryError> {
        let mut checkpoints = self.checkpoints.write().await;
        let created_at = checkpoints
            .get(&checkpoint.thread_id)
            .map(|stored| stored.created_at)
            .unwrap_or(checkpoint.updated_at);
        checkpoints
            .insert(checkpoint.thread_id.clone(), StoredCheckpoint { checkpoint, created_at });
        Ok(())
    }

    async fn delete(&self, thread_id: &str) -> Result<bool, RepositoryError> {
        let mut checkpoints = self.checkpoints.write().await;
        Ok(checkpoints.remove(thread_id).is_some())
    }

    async fn list(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ConversationSummary>, RepositoryError> {
        let checkpoints = self.checkpoints.read().await;
        let mut summaries = checkpoints
            .values()
            .filter(|stored| stored.checkpoint.state.user_id == user_id)
            .map(|stored| ConversationSummary::from_checkpoint(&stored.checkpoint, stored.created_at))
            .collect::<Vec<_>>();

        summaries.sort_by(|a, b| {
            b.last_message_at.cmp(&a.last_message_at).then_with(|| a.thread_id.cmp(&b.thread_id))
        });
        Ok(summaries.into_iter().skip(offset as usize).take(limit as usize).collect())
    }
}
