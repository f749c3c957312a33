use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use parley_core::domain::checkpoint::{Checkpoint, ConversationSummary};
use parley_core::domain::conversation::ConversationState;
use parley_core::flows::GraphNode;

use super::{CheckpointStore, RepositoryError, StoreBackend};
use crate::DbPool;

pub struct SqlCheckpointStore {
    pool: DbPool,
}

impl SqlCheckpointStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl CheckpointStore for SqlCheckpointStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::Durable
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                thread_id,
                state_json,
                next_node,
                step,
                updated_at
             FROM conversation_checkpoints
             WHERE thread_id = ?",
        )
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(checkpoint_from_row).transpose()
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), RepositoryError> {
        let state_json = serde_json::to_string(&checkpoint.state).map_err(|error| {
            RepositoryError::Encode(format!(
                "conversation state for `{}`: {error}",
                checkpoint.thread_id
            ))
        })?;

        let updated_at = timestamp(checkpoint.updated_at);
        let message_count = i64::try_from(checkpoint.state.messages().len()).map_err(|_| {
            RepositoryError::Encode(format!("message count overflow for `{}`", checkpoint.thread_id))
        })?;

        sqlx::query(
            "INSERT INTO conversation_checkpoints (
                thread_id,
                user_id,
                title,
                message_count,
                state_json,
                next_node,
                step,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(thread_id) DO UPDATE SET
                user_id = excluded.user_id,
                title = excluded.title,
                message_count = excluded.message_count,
                state_json = excluded.state_json,
                next_node = excluded.next_node,
                step = excluded.step,
                updated_at = excluded.updated_at",
        )
        .bind(&checkpoint.thread_id)
        .bind(&checkpoint.state.user_id)
        .bind(checkpoint.state.title())
        .bind(message_count)
        .bind(state_json)
        .bind(checkpoint.next_node.as_ref().map(GraphNode::as_str))
        .bind(i64::from(checkpoint.step))
        .bind(&updated_at)
        .bind(&updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, thread_id: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM conversation_checkpoints WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ConversationSummary>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                thread_id,
                user_id,
                title,
                message_count,
                created_at,
                updated_at
             FROM conversation_checkpoints
             WHERE user_id = ?
             ORDER BY updated_at DESC, thread_id ASC
             LIMIT ? OFFSET ?",
        )
        .bind(user_id)
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(summary_from_row).collect()
    }
}

/// Fixed-width UTC so `ORDER BY updated_at` sorts chronologically.
fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn summary_from_row(row: SqliteRow) -> Result<ConversationSummary, RepositoryError> {
    let count_raw = row.try_get::<i64, _>("message_count")?;
    let message_count = usize::try_from(count_raw).map_err(|_| {
        RepositoryError::Decode(format!("invalid value for `message_count`: {count_raw}"))
    })?;

    Ok(ConversationSummary {
        thread_id: row.try_get("thread_id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        message_count,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        last_message_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn checkpoint_from_row(row: SqliteRow) -> Result<Checkpoint, RepositoryError> {
    let thread_id = row.try_get::<String, _>("thread_id")?;
    let state_json = row.try_get::<String, _>("state_json")?;
    let state = serde_json::from_str::<ConversationState>(&state_json).map_err(|error| {
        RepositoryError::Decode(format!("invalid state_json for `{thread_id}`: {error}"))
    })?;

    let next_node = row
        .try_get::<Option<String>, _>("next_node")?
        .map(|value| {
            GraphNode::parse(&value)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown next_node `{value}`")))
        })
        .transpose()?;

    let step_raw = row.try_get::<i64, _>("step")?;
    let step = u32::try_from(step_raw).map_err(|_| {
        RepositoryError::Decode(format!("invalid value for `step` (expected u32): {step_raw}"))
    })?;

    Ok(Checkpoint {
        thread_id,
        state,
        next_node,
        step,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}
