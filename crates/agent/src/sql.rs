use std::sync::Arc;

use serde_json::Value;
use tera::Context;
use tracing::warn;

use parley_core::domain::conversation::{ConversationState, SqlRow};
use parley_db::QueryExecutor;

use crate::conversation::{answer_or, ConversationWindow};
use crate::errors::NodeError;
use crate::guardrails::{GuardrailDecision, GuardrailPolicy};
use crate::llm::LlmClient;
use crate::prompts::{PromptKind, PromptLibrary};

pub const COMMENTS_SCHEMA: &str = "\
comments(
  id INTEGER PRIMARY KEY,
  content TEXT NOT NULL,          -- the customer's comment
  company TEXT NOT NULL,          -- company the comment is about
  category TEXT NOT NULL,         -- topic, e.g. Kargo, Ürün, Müşteri Hizmetleri
  product_category TEXT,          -- nullable
  sentiment_result TEXT NOT NULL, -- 'Olumlu' or 'Olumsuz'
  created_at TEXT NOT NULL,       -- RFC 3339 timestamp
  updated_at TEXT NOT NULL
)";

pub const NO_RESULTS_MARKER: &str = "No results found.";
pub const INTERPRETATION_FALLBACK: &str =
    "I could not produce an answer from the query results. Please try rephrasing the question.";

/// Generate, guard, execute and interpret. No stage retries.
pub struct SqlPath {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
    window: ConversationWindow,
    executor: Arc<dyn QueryExecutor>,
    guard: GuardrailPolicy,
}

impl SqlPath {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptLibrary>,
        window: ConversationWindow,
        executor: Arc<dyn QueryExecutor>,
        guard: GuardrailPolicy,
    ) -> Self {
        Self { llm, prompts, window, executor, guard }
    }

    pub async fn generate(&self, state: &mut ConversationState) -> Result<(), NodeError> {
        let mut context = Context::new();
        context.insert("history", &self.window.render(state.prior_messages()));
        context.insert("question", &state.last_question);
        context.insert("schema", COMMENTS_SCHEMA);

        let messages = self.prompts.render(PromptKind::SqlGenerate, &context)?;
        let raw = self.llm.complete(&messages).await?;
        state.sql_query = Some(strip_code_fence(&raw));
        Ok(())
    }

    /// Guard then execute. Rejections and executor failures are recorded, never raised.
    pub async fn execute(&self, state: &mut ConversationState) {
        let statement = state.sql_query.clone().unwrap_or_default();

        if let GuardrailDecision::Deny { reason_code, user_message, .. } =
            self.guard.evaluate_sql(&statement)
        {
            warn!(
                event_name = "agent.sql.rejected",
                thread_id = %state.thread_id,
                reason_code,
                statement = %statement,
                "generated statement rejected before execution"
            );
            state.record_error(format!("sql rejected: {reason_code}"));
            state.sql_results = Some(user_message);
            state.sql_results_for_rag = Some(Vec::new());
            return;
        }

        match self.executor.execute(&statement).await {
            Ok(rows) => {
                state.sql_results = Some(render_rows(&rows));
                state.sql_results_for_rag = Some(rows);
            }
            Err(error) => {
                warn!(
                    event_name = "agent.sql.execution_failed",
                    thread_id = %state.thread_id,
                    error = %error,
                    "query execution failed; continuing with empty results"
                );
                state.record_error(format!("sql execution failed: {error}"));
                state.sql_results = Some(format!("Query failed: {error}"));
                state.sql_results_for_rag = Some(Vec::new());
            }
        }
    }

    pub async fn interpret(&self, state: &mut ConversationState) -> Result<(), NodeError> {
        let statement = state.sql_query.as_deref().unwrap_or_default();
        if let GuardrailDecision::Deny { user_message, .. } = self.guard.evaluate_sql(statement) {
            state.last_answer = user_message;
            return Ok(());
        }

        let mut context = Context::new();
        context.insert("question", &state.last_question);
        context.insert("sql", statement);
        context.insert("results", state.sql_results.as_deref().unwrap_or(NO_RESULTS_MARKER));

        let messages = self.prompts.render(PromptKind::Interpret, &context)?;
        let answer = self.llm.complete(&messages).await?;
        state.last_answer = answer_or(&answer, INTERPRETATION_FALLBACK);
        Ok(())
    }
}

const FENCE_LANGUAGE_TAGS: &[&str] = &["sql", "sqlite", "sqlite3", "postgresql", "mysql", "text"];

/// Removes a surrounding Markdown code fence and its language tag. The tag may be followed by a
/// newline or, on one-line fences, by a space.
pub fn strip_code_fence(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };

    let tag_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let tag = &rest[..tag_end];
    let body = if FENCE_LANGUAGE_TAGS.iter().any(|known| tag.eq_ignore_ascii_case(known)) {
        &rest[tag_end..]
    } else {
        rest
    };
    let body = body.trim();
    body.strip_suffix("```").unwrap_or(body).trim().to_string()
}

/// One numbered line per row, `column=value` pairs in column order.
pub fn render_rows(rows: &[SqlRow]) -> String {
    if rows.is_empty() {
        return NO_RESULTS_MARKER.to_string();
    }

    rows.iter()
        .enumerate()
        .map(|(index, row)| {
            let fields = row
                .iter()
                .map(|(column, value)| format!("{column}={}", display_value(value)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{}. {fields}", index + 1)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
