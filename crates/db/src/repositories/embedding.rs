use std::cmp::Ordering;

use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use parley_core::domain::comment::{RetrievedRecord, Sentiment};

use super::{EmbeddingIndex, RepositoryError};
use crate::DbPool;

/// Brute-force cosine index over `comment_embeddings` joined with `comments`.
pub struct SqlEmbeddingIndex {
    pool: DbPool,
}

impl SqlEmbeddingIndex {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl EmbeddingIndex for SqlEmbeddingIndex {
    async fn upsert(
        &self,
        comment_id: i64,
        embedding: &[f32],
        model: &str,
    ) -> Result<(), RepositoryError> {
        let embedding_json = serde_json::to_string(embedding).map_err(|error| {
            RepositoryError::Encode(format!("embedding for comment {comment_id}: {error}"))
        })?;

        sqlx::query(
            "INSERT INTO comment_embeddings (comment_id, embedding_json, model, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(comment_id) DO UPDATE SET
                embedding_json = excluded.embedding_json,
                model = excluded.model,
                created_at = excluded.created_at",
        )
        .bind(comment_id)
        .bind(embedding_json)
        .bind(model)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn nearest(
        &self,
        query: &[f32],
        model: &str,
        top_k: usize,
        sentiment: Option<Sentiment>,
    ) -> Result<Vec<RetrievedRecord>, RepositoryError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let label = sentiment.as_ref().map(Sentiment::label);
        let rows = sqlx::query(
            "SELECT
                c.id,
                c.content,
                c.company,
                c.category,
                c.sentiment_result,
                e.embedding_json
             FROM comment_embeddings e
             JOIN comments c ON c.id = e.comment_id
             WHERE e.model = ?
               AND (? IS NULL OR c.sentiment_result = ?)",
        )
        .bind(model)
        .bind(label)
        .bind(label)
        .fetch_all(&self.pool)
        .await?;

        let mut scored = rows
            .into_iter()
            .map(|row| scored_record(row, query))
            .collect::<Result<Vec<_>, _>>()?;

        scored.sort_by(|a, b| {
            a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }
}

fn scored_record(row: SqliteRow, query: &[f32]) -> Result<RetrievedRecord, RepositoryError> {
    let id = row.try_get::<i64, _>("id")?;
    let embedding_json = row.try_get::<String, _>("embedding_json")?;
    let embedding = serde_json::from_str::<Vec<f32>>(&embedding_json).map_err(|error| {
        RepositoryError::Decode(format!("invalid embedding for comment {id}: {error}"))
    })?;

    Ok(RetrievedRecord {
        identifier: id.to_string(),
        text: row.try_get("content")?,
        source_label: row.try_get("company")?,
        category: row.try_get("category")?,
        sentiment_label: row.try_get("sentiment_result")?,
        distance: Some(cosine_distance(query, &embedding)),
    })
}

/// `1 - cosine_similarity`; mismatched or zero vectors are maximally unrelated.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 1.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    1.0 - dot / (norm_a * norm_b)
}
