use std::sync::Arc;

use thiserror::Error;
use tracing::{info_span, Instrument};

use parley_core::config::{is_in_memory_url, AppConfig, DatabaseConfig};
use parley_core::domain::checkpoint::ConversationSummary;
use parley_core::domain::conversation::ChatMessage;
use parley_core::domain::degradation::Degradation;
use parley_core::errors::ApplicationError;
use parley_db::{
    connect_read_only, select_checkpoint_store, CheckpointStore, DbPool, EmbeddingIndex,
    MemoryStoreError, QueryExecutor, RepositoryError, SqlEmbeddingIndex, SqlQueryExecutor,
    StoreBackend,
};

use crate::embeddings::{EmbeddingClient, HttpEmbeddingClient};
use crate::llm::{HttpLlmClient, LlmClient, LlmError};
use crate::orchestrator::{AgentDependencies, Orchestrator, TurnOutcome};
use crate::prompts::PromptError;
use crate::rag::{IndexedSearch, SemanticSearch};

#[derive(Debug, Error)]
pub enum RuntimeBuildError {
    #[error("language model client: {0}")]
    Llm(#[from] LlmError),
    #[error("prompt templates: {0}")]
    Prompt(#[from] PromptError),
    #[error(transparent)]
    Memory(#[from] MemoryStoreError),
    #[error("read-only query pool: {0}")]
    QueryPool(#[from] RepositoryError),
}

/// Entry point used by the interfaces. Wraps the orchestrator with the checkpoint-store choice
/// made at startup, so every answer can carry the degradations that apply to it.
pub struct ChatRuntime {
    orchestrator: Orchestrator,
    memory_backend: StoreBackend,
    memory_degradations: Vec<Degradation>,
}

impl ChatRuntime {
    pub async fn from_config(config: &AppConfig, pool: DbPool) -> Result<Self, RuntimeBuildError> {
        let llm: Arc<dyn LlmClient> = Arc::new(HttpLlmClient::from_config(&config.llm)?);
        let embeddings: Arc<dyn EmbeddingClient> =
            Arc::new(HttpEmbeddingClient::from_config(&config.llm)?);
        let index: Arc<dyn EmbeddingIndex> = Arc::new(SqlEmbeddingIndex::new(pool.clone()));
        let search: Arc<dyn SemanticSearch> = Arc::new(IndexedSearch::new(embeddings, index));
        let executor: Arc<dyn QueryExecutor> =
            Arc::new(SqlQueryExecutor::new(query_pool(&config.database, pool).await?));
        let memory = select_checkpoint_store(&config.database, &config.memory).await?;

        let (store, degradations) = memory.into_parts();
        let orchestrator = Orchestrator::new(
            AgentDependencies { llm, executor, search, store },
            &config.agent,
        )?;
        Ok(Self::new(orchestrator, degradations))
    }

    /// Builds a runtime around an already-wired orchestrator. `memory_degradations` records how
    /// its checkpoint store was chosen.
    pub fn new(orchestrator: Orchestrator, memory_degradations: Vec<Degradation>) -> Self {
        let memory_backend = orchestrator.store().backend();
        Self { orchestrator, memory_backend, memory_degradations }
    }

    pub async fn run_turn(
        &self,
        thread_id: &str,
        user_id: &str,
        question: &str,
        correlation_id: &str,
    ) -> Result<TurnOutcome, ApplicationError> {
        let span = info_span!("chat_turn", correlation_id, thread_id);
        let mut outcome =
            self.orchestrator.run_turn(thread_id, user_id, question).instrument(span).await?;
        self.attach_memory_degradations(&mut outcome);
        Ok(outcome)
    }

    pub async fn resume_turn(
        &self,
        thread_id: &str,
        correlation_id: &str,
    ) -> Result<Option<TurnOutcome>, ApplicationError> {
        let span = info_span!("chat_resume", correlation_id, thread_id);
        let mut outcome = self.orchestrator.resume_turn(thread_id).instrument(span).await?;
        if let Some(outcome) = outcome.as_mut() {
            self.attach_memory_degradations(outcome);
        }
        Ok(outcome)
    }

    pub async fn get_history(&self, thread_id: &str) -> Result<Vec<ChatMessage>, ApplicationError> {
        Ok(self.orchestrator.get_history(thread_id).await?)
    }

    pub async fn list_conversations(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ConversationSummary>, ApplicationError> {
        Ok(self.orchestrator.list_conversations(user_id, limit, offset).await?)
    }

    pub async fn delete_conversation(
        &self,
        thread_id: &str,
        owner: Option<&str>,
        correlation_id: &str,
    ) -> Result<bool, ApplicationError> {
        let span = info_span!("chat_delete", correlation_id, thread_id);
        Ok(self.orchestrator.delete_conversation(thread_id, owner).instrument(span).await?)
    }

    pub fn memory_backend(&self) -> StoreBackend {
        self.memory_backend
    }

    pub fn memory_degradations(&self) -> &[Degradation] {
        &self.memory_degradations
    }

    pub fn checkpoint_store(&self) -> &Arc<dyn CheckpointStore> {
        self.orchestrator.store()
    }

    fn attach_memory_degradations(&self, outcome: &mut TurnOutcome) {
        let mut degradations = self.memory_degradations.clone();
        degradations.append(&mut outcome.degradations);
        outcome.degradations = degradations;
    }
}

/// Generated statements run on their own read-only connections. An in-memory comment store only
/// exists inside `pool`, so it is shared there and the executor's single-statement rollback is
/// the only guard.
async fn query_pool(database: &DatabaseConfig, pool: DbPool) -> Result<DbPool, RepositoryError> {
    if is_in_memory_url(&database.url) {
        return Ok(pool);
    }
    Ok(connect_read_only(&database.url, database.max_connections, database.timeout_secs).await?)
}
