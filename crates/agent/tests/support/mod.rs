#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};

use parley_agent::llm::{LlmClient, LlmError};
use parley_agent::rag::{SearchError, SemanticSearch};
use parley_agent::{AgentDependencies, Orchestrator};
use parley_core::config::AgentConfig;
use parley_core::domain::checkpoint::{Checkpoint, ConversationSummary};
use parley_core::domain::comment::{RetrievedRecord, Sentiment};
use parley_core::domain::conversation::{ChatMessage, MessageRole, SqlRow};
use parley_db::{
    CheckpointStore, InMemoryCheckpointStore, QueryExecutor, RepositoryError, StoreBackend,
};

/// Replies in order; every call is recorded.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedLlm {
    pub fn replying(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|reply| Ok(reply.to_string())).collect()),
            calls: Mutex::default(),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }

    /// The human message of call `index`.
    pub fn prompt(&self, index: usize) -> String {
        self.calls()[index]
            .iter()
            .find(|message| message.role == MessageRole::Human)
            .map(|message| message.content.clone())
            .expect("human message in prompt")
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.calls.lock().expect("calls lock").push(messages.to_vec());
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Transport("connection refused".to_string())))
    }
}

pub struct RecordingExecutor {
    rows: Result<Vec<SqlRow>, String>,
    statements: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    pub fn returning(rows: Vec<SqlRow>) -> Arc<Self> {
        Arc::new(Self { rows: Ok(rows), statements: Mutex::default() })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self { rows: Err(message.to_string()), statements: Mutex::default() })
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().expect("statements lock").clone()
    }
}

#[async_trait]
impl QueryExecutor for RecordingExecutor {
    async fn execute(&self, statement: &str) -> Result<Vec<SqlRow>, RepositoryError> {
        self.statements.lock().expect("statements lock").push(statement.to_string());
        self.rows.clone().map_err(RepositoryError::Decode)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SearchCall {
    pub query: String,
    pub top_k: usize,
    pub sentiment: Option<Sentiment>,
}

pub struct ScriptedSearch {
    records: Option<Vec<RetrievedRecord>>,
    calls: Mutex<Vec<SearchCall>>,
}

impl ScriptedSearch {
    pub fn returning(records: Vec<RetrievedRecord>) -> Arc<Self> {
        Arc::new(Self { records: Some(records), calls: Mutex::default() })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self { records: None, calls: Mutex::default() })
    }

    pub fn calls(&self) -> Vec<SearchCall> {
        self.calls.lock().expect("search lock").clone()
    }
}

#[async_trait]
impl SemanticSearch for ScriptedSearch {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        sentiment: Option<Sentiment>,
    ) -> Result<Vec<RetrievedRecord>, SearchError> {
        self.calls.lock().expect("search lock").push(SearchCall {
            query: query.to_string(),
            top_k,
            sentiment,
        });
        self.records.clone().ok_or_else(|| {
            SearchError::Embedding(LlmError::Configuration("no embeddings endpoint".to_string()))
        })
    }
}

/// In-memory store whose reads or writes can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryCheckpointStore,
    fail_loads: bool,
    fail_saves: bool,
}

impl FlakyStore {
    pub fn failing_loads() -> Arc<Self> {
        Arc::new(Self { fail_loads: true, ..Self::default() })
    }

    pub fn failing_saves() -> Arc<Self> {
        Arc::new(Self { fail_saves: true, ..Self::default() })
    }
}

#[async_trait]
impl CheckpointStore for FlakyStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::Durable
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, RepositoryError> {
        if self.fail_loads {
            return Err(RepositoryError::Decode("corrupted checkpoint".to_string()));
        }
        self.inner.load(thread_id).await
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), RepositoryError> {
        if self.fail_saves {
            return Err(RepositoryError::Encode("disk full".to_string()));
        }
        self.inner.save(checkpoint).await
    }

    async fn delete(&self, thread_id: &str) -> Result<bool, RepositoryError> {
        self.inner.delete(thread_id).await
    }

    async fn list(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ConversationSummary>, RepositoryError> {
        self.inner.list(user_id, limit, offset).await
    }
}

pub fn settings() -> AgentConfig {
    AgentConfig {
        history_window: 6,
        history_char_cap: 500,
        retrieval_top_k: 500,
        analysis_record_cap: 500,
    }
}

pub fn orchestrator(
    llm: Arc<ScriptedLlm>,
    executor: Arc<RecordingExecutor>,
    search: Arc<ScriptedSearch>,
    store: Arc<dyn CheckpointStore>,
) -> Orchestrator {
    orchestrator_with(llm, executor, search, store, &settings())
}

pub fn orchestrator_with(
    llm: Arc<ScriptedLlm>,
    executor: Arc<RecordingExecutor>,
    search: Arc<ScriptedSearch>,
    store: Arc<dyn CheckpointStore>,
    settings: &AgentConfig,
) -> Orchestrator {
    Orchestrator::new(AgentDependencies { llm, executor, search, store }, settings)
        .expect("embedded prompts compile")
}

pub fn memory_store() -> Arc<dyn CheckpointStore> {
    Arc::new(InMemoryCheckpointStore::default())
}

pub fn row(pairs: &[(&str, Value)]) -> SqlRow {
    let mut row = Map::new();
    for (column, value) in pairs {
        row.insert(column.to_string(), value.clone());
    }
    row
}

pub fn comment_row(id: i64, content: &str, sentiment: &str) -> SqlRow {
    row(&[
        ("id", Value::from(id)),
        ("content", Value::from(content)),
        ("company", Value::from("Hızlı Kargo")),
        ("category", Value::from("Kargo")),
        ("sentiment_result", Value::from(sentiment)),
    ])
}

pub fn record(id: usize, text: &str, distance: f32) -> RetrievedRecord {
    RetrievedRecord {
        identifier: id.to_string(),
        text: text.to_string(),
        source_label: "Hızlı Kargo".to_string(),
        category: "Kargo".to_string(),
        sentiment_label: "Olumsuz".to_string(),
        distance: Some(distance),
    }
}
