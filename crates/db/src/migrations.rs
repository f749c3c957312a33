use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

/// Comment store schema: `comments` and `comment_embeddings`.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations/store");

/// Checkpoint store schema. Kept in its own database so generated queries against the comment
/// store cannot read other threads' transcripts.
pub static MEMORY_MIGRATOR: Migrator = sqlx::migrate!("../../migrations/memory");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

pub async fn run_memory_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MEMORY_MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::migrate::Migrator;
    use sqlx::Row;

    use super::{run_memory_pending, run_pending, MEMORY_MIGRATOR, MIGRATOR};
    use crate::connect_with_settings;

    const STORE_SCHEMA_OBJECTS: &[&str] = &[
        "comments",
        "comment_embeddings",
        "idx_comments_company",
        "idx_comments_category",
        "idx_comments_sentiment_result",
    ];

    const MEMORY_SCHEMA_OBJECTS: &[&str] =
        &["conversation_checkpoints", "idx_conversation_checkpoints_user_updated_at"];

    async fn table_count(pool: &sqlx::SqlitePool, name: &str) -> i64 {
        sqlx::query(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(name)
        .fetch_one(pool)
        .await
        .expect("check table")
        .get::<i64, _>("count")
    }

    #[tokio::test]
    async fn store_migrations_create_comment_tables_only() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        assert_eq!(table_count(&pool, "comments").await, 1);
        assert_eq!(table_count(&pool, "comment_embeddings").await, 1);
        assert_eq!(table_count(&pool, "conversation_checkpoints").await, 0);
    }

    #[tokio::test]
    async fn memory_migrations_create_checkpoint_table_only() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_memory_pending(&pool).await.expect("run memory migrations");

        assert_eq!(table_count(&pool, "conversation_checkpoints").await, 1);
        assert_eq!(table_count(&pool, "comments").await, 0);
    }

    #[tokio::test]
    async fn sentiment_column_rejects_unknown_labels() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let result = sqlx::query(
            "INSERT INTO comments (content, company, category, sentiment_result, created_at, updated_at)
             VALUES ('fine', 'Acme', 'Kargo', 'Nötr', '2026-03-01T00:00:00Z', '2026-03-01T00:00:00Z')",
        )
        .execute(&pool)
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn migrations_up_down_up_preserves_schema_signature() {
        for (migrator, managed) in [
            (&MIGRATOR, STORE_SCHEMA_OBJECTS),
            (&MEMORY_MIGRATOR, MEMORY_SCHEMA_OBJECTS),
        ] {
            assert_up_down_up(migrator, managed).await;
        }
    }

    async fn assert_up_down_up(migrator: &Migrator, managed: &[&str]) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrator.run(&pool).await.expect("run migrations");

        let initial_signature = managed_schema_signature(&pool, managed).await;
        assert_eq!(
            initial_signature.len(),
            managed.len(),
            "initial migration pass should create all managed schema objects",
        );

        migrator.undo(&pool, 0).await.expect("undo migrations");

        let after_down_signature = managed_schema_signature(&pool, managed).await;
        assert!(
            after_down_signature.is_empty(),
            "managed schema objects should be removed after full undo",
        );

        migrator.run(&pool).await.expect("re-run migrations");

        let after_second_up_signature = managed_schema_signature(&pool, managed).await;
        assert_eq!(
            after_second_up_signature, initial_signature,
            "up/down/up should preserve migration-managed schema signature",
        );
    }

    async fn managed_schema_signature(
        pool: &sqlx::SqlitePool,
        managed: &[&str],
    ) -> Vec<(String, String, String)> {
        let mut signature: Vec<(String, String, String)> = sqlx::query(
            "SELECT type, name, IFNULL(sql, '') AS sql
             FROM sqlite_master
             WHERE type IN ('table', 'index')",
        )
        .fetch_all(pool)
        .await
        .expect("load schema objects")
        .into_iter()
        .filter_map(|row| {
            let name = row.get::<String, _>("name");
            if managed.contains(&name.as_str()) {
                Some((row.get::<String, _>("type"), name, row.get::<String, _>("sql")))
            } else {
                None
            }
        })
        .collect();
        signature.sort();
        signature
    }
}
