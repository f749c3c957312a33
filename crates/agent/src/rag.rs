use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tera::Context;
use thiserror::Error;
use tracing::{debug, warn};

use parley_core::domain::comment::{RetrievedRecord, Sentiment};
use parley_core::domain::conversation::{ConversationState, SqlRow};
use parley_core::domain::degradation::{Degradable, Degradation};
use parley_db::{EmbeddingIndex, RepositoryError};

use crate::conversation::answer_or;
use crate::embeddings::EmbeddingClient;
use crate::errors::NodeError;
use crate::llm::{LlmClient, LlmError};
use crate::prompts::{PromptKind, PromptLibrary};

pub const NOTHING_FOUND_MESSAGE: &str =
    "I could not find any comments related to your question.";
pub const ANALYSIS_FALLBACK: &str =
    "I could not produce an analysis of the retrieved comments. Please try rephrasing the question.";

const SENTIMENT_COLUMNS: [&str; 2] = ["sentiment_result", "sentiment"];

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] LlmError),
    #[error("index query failed: {0}")]
    Index(#[from] RepositoryError),
}

#[async_trait]
pub trait SemanticSearch: Send + Sync {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        sentiment: Option<Sentiment>,
    ) -> Result<Vec<RetrievedRecord>, SearchError>;
}

/// Embeds the query, then ranks the stored comment vectors.
pub struct IndexedSearch {
    embeddings: Arc<dyn EmbeddingClient>,
    index: Arc<dyn EmbeddingIndex>,
}

impl IndexedSearch {
    pub fn new(embeddings: Arc<dyn EmbeddingClient>, index: Arc<dyn EmbeddingIndex>) -> Self {
        Self { embeddings, index }
    }
}

#[async_trait]
impl SemanticSearch for IndexedSearch {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        sentiment: Option<Sentiment>,
    ) -> Result<Vec<RetrievedRecord>, SearchError> {
        let vector = self.embeddings.embed(query).await?;
        Ok(self.index.nearest(&vector, self.embeddings.model(), top_k, sentiment).await?)
    }
}

pub struct RetrievalPath {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
    search: Arc<dyn SemanticSearch>,
    top_k: usize,
    analysis_cap: usize,
}

impl RetrievalPath {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptLibrary>,
        search: Arc<dyn SemanticSearch>,
        top_k: usize,
        analysis_cap: usize,
    ) -> Self {
        Self { llm, prompts, search, top_k, analysis_cap }
    }

    /// Similarity search filtered by the first SQL row's sentiment, falling back to the SQL rows.
    pub async fn retrieve(&self, state: &mut ConversationState) -> Vec<Degradation> {
        let rows = state.sql_rows();
        let sentiment = sentiment_filter(rows);

        let outcome = match self.search.search(&state.last_question, self.top_k, sentiment).await {
            Ok(mut records) => {
                records.truncate(self.top_k);
                Degradable::clean(records)
            }
            Err(error) => {
                warn!(
                    event_name = "agent.rag.retrieval_fallback",
                    thread_id = %state.thread_id,
                    error = %error,
                    fallback_rows = rows.len(),
                    "similarity search failed; using SQL rows"
                );
                let mut records = rows.iter().map(record_from_row).collect::<Vec<_>>();
                records.truncate(self.top_k);
                Degradable::degraded(
                    records,
                    Degradation::RetrievalFallback { reason: error.to_string() },
                )
            }
        };

        debug!(
            event_name = "agent.rag.retrieved",
            thread_id = %state.thread_id,
            sentiment = sentiment.as_ref().map(Sentiment::label).unwrap_or("none"),
            records = outcome.value.len(),
            "retrieval finished"
        );
        let (records, degradations) = outcome.into_parts();
        state.rag_results = Some(records);
        degradations
    }

    /// Asks the model to answer from at most `analysis_cap` records. Nothing retrieved means a
    /// fixed answer and no model call, whether the records came from search or the fallback.
    pub async fn analyze(&self, state: &mut ConversationState) -> Result<(), NodeError> {
        let records = state.rag_results.as_deref().unwrap_or_default();
        if records.is_empty() {
            state.last_answer = NOTHING_FOUND_MESSAGE.to_string();
            return Ok(());
        }

        let shown = &records[..records.len().min(self.analysis_cap)];
        let mut context = Context::new();
        context.insert("question", &state.last_question);
        context.insert("records", &format_records(shown));
        context.insert("shown", &shown.len());
        context.insert("total", &records.len());

        let messages = self.prompts.render(PromptKind::Analysis, &context)?;
        let answer = self.llm.complete(&messages).await?;
        state.last_answer = answer_or(&answer, ANALYSIS_FALLBACK);
        Ok(())
    }
}

pub fn sentiment_filter(rows: &[SqlRow]) -> Option<Sentiment> {
    let first = rows.first()?;
    SENTIMENT_COLUMNS
        .iter()
        .find_map(|column| first.get(*column).and_then(Value::as_str))
        .and_then(Sentiment::from_label)
}

fn record_from_row(row: &SqlRow) -> RetrievedRecord {
    RetrievedRecord {
        identifier: field_text(row, &["id", "comment_id"]),
        text: field_text(row, &["content", "text"]),
        source_label: field_text(row, &["company"]),
        category: field_text(row, &["category"]),
        sentiment_label: field_text(row, &SENTIMENT_COLUMNS),
        distance: None,
    }
}

fn field_text(row: &SqlRow, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| row.get(*key))
        .map(|value| match value {
            Value::String(text) => text.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        })
        .unwrap_or_default()
}

/// One line per record; similarity is `1 - distance` to two decimals, `-` when unscored.
pub fn format_records(records: &[RetrievedRecord]) -> String {
    records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let similarity = record
                .similarity()
                .map(|score| format!("{score:.2}"))
                .unwrap_or_else(|| "-".to_string());
            format!(
                "{}. [{} | {} | {}] (similarity {similarity}) {}",
                index + 1,
                record.sentiment_label,
                record.source_label,
                record.category,
                record.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::{json, Map};

    use parley_core::domain::comment::{RetrievedRecord, Sentiment};
    use parley_db::{EmbeddingIndex, RepositoryError};

    use super::{
        format_records, record_from_row, sentiment_filter, IndexedSearch, SemanticSearch,
    };
    use crate::embeddings::EmbeddingClient;
    use crate::llm::LlmError;

    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingClient for FixedEmbedder {
        fn model(&self) -> &str {
            "nomic-embed-text"
        }

        async fn embed(&self, _input: &str) -> Result<Vec<f32>, LlmError> {
            Ok(vec![1.0, 0.0])
        }
    }

    #[derive(Default)]
    struct RecordingIndex {
        queries: Mutex<Vec<(Vec<f32>, String, usize, Option<Sentiment>)>>,
    }

    #[async_trait]
    impl EmbeddingIndex for RecordingIndex {
        async fn upsert(&self, _: i64, _: &[f32], _: &str) -> Result<(), RepositoryError> {
            Ok(())
        }

        async fn nearest(
            &self,
            query: &[f32],
            model: &str,
            top_k: usize,
            sentiment: Option<Sentiment>,
        ) -> Result<Vec<RetrievedRecord>, RepositoryError> {
            self.queries
                .lock()
                .expect("queries lock")
                .push((query.to_vec(), model.to_string(), top_k, sentiment));
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn indexed_search_compares_only_vectors_of_the_query_model() {
        let index = Arc::new(RecordingIndex::default());
        let search = IndexedSearch::new(Arc::new(FixedEmbedder), index.clone());

        search.search("kargo", 500, Some(Sentiment::Negative)).await.expect("search");

        let queries = index.queries.lock().expect("queries lock").clone();
        assert_eq!(
            queries,
            vec![(vec![1.0, 0.0], "nomic-embed-text".to_string(), 500, Some(Sentiment::Negative))]
        );
    }

    fn row(pairs: &[(&str, serde_json::Value)]) -> Map<String, serde_json::Value> {
        pairs.iter().map(|(key, value)| (key.to_string(), value.clone())).collect()
    }

    #[test]
    fn filter_comes_from_the_first_row_only() {
        let rows = vec![
            row(&[("sentiment_result", json!("Olumsuz"))]),
            row(&[("sentiment_result", json!("Olumlu"))]),
        ];
        assert_eq!(sentiment_filter(&rows), Some(Sentiment::Negative));
    }

    #[test]
    fn unrecognised_or_missing_labels_do_not_filter() {
        assert_eq!(sentiment_filter(&[]), None);
        assert_eq!(sentiment_filter(&[row(&[("sentiment_result", json!("Nötr"))])]), None);
        assert_eq!(sentiment_filter(&[row(&[("total", json!(4))])]), None);
    }

    #[test]
    fn fallback_rows_become_unscored_records() {
        let record = record_from_row(&row(&[
            ("id", json!(7)),
            ("content", json!("Kargo geç geldi")),
            ("company", json!("Acme")),
            ("category", json!("Kargo")),
            ("sentiment_result", json!("Olumsuz")),
        ]));

        assert_eq!(record.identifier, "7");
        assert_eq!(record.text, "Kargo geç geldi");
        assert_eq!(record.distance, None);
    }

    #[test]
    fn records_format_with_two_decimal_similarity() {
        let records = vec![
            RetrievedRecord {
                identifier: "1".to_string(),
                text: "Paket ezik".to_string(),
                source_label: "Acme".to_string(),
                category: "Kargo".to_string(),
                sentiment_label: "Olumsuz".to_string(),
                distance: Some(0.1234),
            },
            RetrievedRecord {
                identifier: "2".to_string(),
                text: "Geç teslimat".to_string(),
                source_label: "Globex".to_string(),
                category: "Kargo".to_string(),
                sentiment_label: "Olumsuz".to_string(),
                distance: None,
            },
        ];

        assert_eq!(
            format_records(&records),
            "1. [Olumsuz | Acme | Kargo] (similarity 0.88) Paket ezik\n\
             2. [Olumsuz | Globex | Kargo] (similarity -) Geç teslimat"
        );
    }
}
