pub mod connection;
pub mod memory_store;
pub mod migrations;
pub mod repositories;

pub use connection::{connect_read_only, connect_with_settings, ping, DbPool};
pub use memory_store::{select_checkpoint_store, MemoryStoreError};
pub use repositories::{
    statement_count, CheckpointStore, EmbeddingIndex, InMemoryCheckpointStore, QueryExecutor,
    RepositoryError, SqlCheckpointStore, SqlEmbeddingIndex, SqlQueryExecutor, StoreBackend,
};
