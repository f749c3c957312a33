use async_trait::async_trait;
use thiserror::Error;

use parley_core::domain::checkpoint::{Checkpoint, ConversationSummary};
use parley_core::domain::comment::{RetrievedRecord, Sentiment};
use parley_core::domain::conversation::SqlRow;

pub mod checkpoint;
pub mod embedding;
pub mod memory;
pub mod query;

pub use checkpoint::SqlCheckpointStore;
pub use embedding::SqlEmbeddingIndex;
pub use memory::InMemoryCheckpointStore;
pub use query::{statement_count, SqlQueryExecutor};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("statement rejected: {0}")]
    Rejected(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Durable,
    Volatile,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Durable => "durable",
            Self::Volatile => "volatile",
        }
    }
}

/// Latest checkpoint per thread. Each thread id is its own partition.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    fn backend(&self) -> StoreBackend;
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, RepositoryError>;
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), RepositoryError>;
    /// `false` when the thread had no checkpoint.
    async fn delete(&self, thread_id: &str) -> Result<bool, RepositoryError>;
    /// Threads last written for `user_id`, most recently updated first.
    async fn list(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ConversationSummary>, RepositoryError>;
}

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, statement: &str) -> Result<Vec<SqlRow>, RepositoryError>;
}

#[async_trait]
pub trait EmbeddingIndex: Send + Sync {
    async fn upsert(
        &self,
        comment_id: i64,
        embedding: &[f32],
        model: &str,
    ) -> Result<(), RepositoryError>;

    /// Records ordered by ascending cosine distance, at most `top_k` of them. Only vectors
    /// stored under `model` are compared.
    async fn nearest(
        &self,
        query: &[f32],
        model: &str,
        top_k: usize,
        sentiment: Option<Sentiment>,
    ) -> Result<Vec<RetrievedRecord>, RepositoryError>;
}
