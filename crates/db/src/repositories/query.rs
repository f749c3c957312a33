use std::iter::Peekable;
use std::str::Chars;

use serde_json::{Map, Number, Value};
use sqlx::{sqlite::SqliteRow, Column, Row, TypeInfo, ValueRef};

use parley_core::domain::conversation::SqlRow;

use super::{QueryExecutor, RepositoryError};
use crate::DbPool;

/// Runs model-generated statements against the comment store.
///
/// Give it a pool from [`crate::connect_read_only`]. Each call runs exactly one statement inside
/// a transaction that is always rolled back.
pub struct SqlQueryExecutor {
    pool: DbPool,
}

impl SqlQueryExecutor {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl QueryExecutor for SqlQueryExecutor {
    async fn execute(&self, statement: &str) -> Result<Vec<SqlRow>, RepositoryError> {
        let statements = statement_count(statement);
        if statements != 1 {
            return Err(RepositoryError::Rejected(format!(
                "expected exactly one statement, found {statements}"
            )));
        }

        let mut transaction = self.pool.begin().await?;
        let rows = sqlx::query(statement).fetch_all(&mut *transaction).await;
        transaction.rollback().await?;

        rows?.iter().map(row_to_object).collect()
    }
}

/// Number of non-empty statements, splitting on `;` outside literals, quoted identifiers
/// and comments.
pub fn statement_count(sql: &str) -> usize {
    let mut count = 0;
    let mut significant = false;
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\'' | '"' | '`' => {
                significant = true;
                skip_past(&mut chars, ch);
            }
            '[' => {
                significant = true;
                skip_past(&mut chars, ']');
            }
            '-' if chars.peek() == Some(&'-') => skip_past(&mut chars, '\n'),
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut previous = '\0';
                for next in chars.by_ref() {
                    if previous == '*' && next == '/' {
                        break;
                    }
                    previous = next;
                }
            }
            ';' => {
                if significant {
                    count += 1;
                }
                significant = false;
            }
            other if other.is_whitespace() => {}
            _ => significant = true,
        }
    }

    if significant {
        count += 1;
    }
    count
}

fn skip_past(chars: &mut Peekable<Chars<'_>>, close: char) {
    for next in chars.by_ref() {
        if next == close {
            break;
        }
    }
}

/// Decodes a row by the storage class of each value, keeping column order.
fn row_to_object(row: &SqliteRow) -> Result<SqlRow, RepositoryError> {
    let mut object = Map::with_capacity(row.columns().len());

    for column in row.columns() {
        let index = column.ordinal();
        let (is_null, type_name) = {
            let raw = row.try_get_raw(index)?;
            (raw.is_null(), raw.type_info().name().to_ascii_uppercase())
        };

        let value = if is_null {
            Value::Null
        } else {
            match type_name.as_str() {
                "INTEGER" | "INT" | "BIGINT" | "BOOLEAN" => Value::from(row.try_get::<i64, _>(index)?),
                "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
                    let number = row.try_get::<f64, _>(index)?;
                    Number::from_f64(number).map(Value::Number).unwrap_or(Value::Null)
                }
                "TEXT" | "DATETIME" | "DATE" | "TIME" => Value::String(row.try_get::<String, _>(index)?),
                "BLOB" => {
                    let bytes = row.try_get::<Vec<u8>, _>(index)?;
                    Value::String(format!("<{} bytes>", bytes.len()))
                }
                other => {
                    return Err(RepositoryError::Decode(format!(
                        "unsupported column type `{other}` in `{}`",
                        column.name()
                    )))
                }
            }
        };

        object.insert(column.name().to_string(), value);
    }

    Ok(object)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{statement_count, SqlQueryExecutor};
    use crate::repositories::{QueryExecutor, RepositoryError};
    use crate::{connect_read_only, connect_with_settings, migrations, DbPool};

    async fn seeded_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        for (content, company, category, sentiment) in [
            ("Kargo çok geç geldi", "Acme", "Kargo", "Olumsuz"),
            ("Ürün harika", "Acme", "Ürün", "Olumlu"),
            ("Paket hasarlı ulaştı", "Globex", "Kargo", "Olumsuz"),
        ] {
            sqlx::query(
                "INSERT INTO comments (content, company, category, sentiment_result, created_at, updated_at)
                 VALUES (?, ?, ?, ?, '2026-03-01T00:00:00Z', '2026-03-01T00:00:00Z')",
            )
            .bind(content)
            .bind(company)
            .bind(category)
            .bind(sentiment)
            .execute(&pool)
            .await
            .expect("insert comment");
        }
        pool
    }

    #[tokio::test]
    async fn count_query_decodes_to_integer() {
        let pool = seeded_pool().await;
        let executor = SqlQueryExecutor::new(pool.clone());

        let rows = executor.execute("SELECT COUNT(*) AS total FROM comments").await.expect("count");

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("total"), Some(&json!(3)));
        pool.close().await;
    }

    #[tokio::test]
    async fn rows_keep_column_order_and_nulls() {
        let pool = seeded_pool().await;
        let executor = SqlQueryExecutor::new(pool.clone());

        let rows = executor
            .execute(
                "SELECT id, content, product_category, sentiment_result, 0.5 AS weight
                 FROM comments WHERE category = 'Kargo' ORDER BY id",
            )
            .await
            .expect("select");

        assert_eq!(rows.len(), 2);
        let columns: Vec<&str> = rows[0].keys().map(String::as_str).collect();
        assert_eq!(columns, vec!["id", "content", "product_category", "sentiment_result", "weight"]);
        assert_eq!(rows[0].get("product_category"), Some(&Value::Null));
        assert_eq!(rows[0].get("sentiment_result"), Some(&json!("Olumsuz")));
        assert_eq!(rows[0].get("weight"), Some(&json!(0.5)));
        pool.close().await;
    }

    #[tokio::test]
    async fn empty_result_is_an_empty_list() {
        let pool = seeded_pool().await;
        let executor = SqlQueryExecutor::new(pool.clone());

        let rows = executor
            .execute("SELECT * FROM comments WHERE company = 'Initech'")
            .await
            .expect("select");

        assert!(rows.is_empty());
        pool.close().await;
    }

    #[test]
    fn statement_count_ignores_literals_and_comments() {
        assert_eq!(statement_count(""), 0);
        assert_eq!(statement_count("SELECT 1"), 1);
        assert_eq!(statement_count("SELECT 1;\n"), 1);
        assert_eq!(statement_count("SELECT ';' AS mark"), 1);
        assert_eq!(statement_count("SELECT 'it''s; fine'"), 1);
        assert_eq!(statement_count("SELECT \"a;b\" FROM comments"), 1);
        assert_eq!(statement_count("SELECT 1 -- ; DELETE FROM comments"), 1);
        assert_eq!(statement_count("SELECT 1 /* ; */ FROM comments;;"), 1);
        assert_eq!(statement_count("SELECT 1; DELETE FROM comments"), 2);
        assert_eq!(statement_count("SELECT 1;/* c */ DROP TABLE comments;"), 2);
    }

    #[tokio::test]
    async fn stacked_statements_are_rejected_before_running() {
        let pool = seeded_pool().await;
        let executor = SqlQueryExecutor::new(pool.clone());

        let error = executor
            .execute("SELECT 1; DELETE FROM comments")
            .await
            .expect_err("second statement must not run");

        assert!(matches!(error, RepositoryError::Rejected(_)));
        let (remaining,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM comments").fetch_one(&pool).await.expect("count");
        assert_eq!(remaining, 3);
        pool.close().await;
    }

    #[tokio::test]
    async fn checkpoints_are_not_in_the_comment_store() {
        let pool = seeded_pool().await;
        let executor = SqlQueryExecutor::new(pool.clone());

        let error = executor
            .execute("SELECT thread_id, state_json FROM conversation_checkpoints")
            .await
            .expect_err("no checkpoint table in the comment store");

        assert!(matches!(error, RepositoryError::Database(_)));
        pool.close().await;
    }

    #[tokio::test]
    async fn writes_through_a_read_only_pool_fail_and_change_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("comments.db").display());
        let writer = connect_with_settings(&url, 1, 5).await.expect("connect writer");
        migrations::run_pending(&writer).await.expect("run migrations");
        sqlx::query(
            "INSERT INTO comments (content, company, category, sentiment_result, created_at, updated_at)
             VALUES ('Kargo geç geldi', 'Acme', 'Kargo', 'Olumsuz', '2026-03-01T00:00:00Z', '2026-03-01T00:00:00Z')",
        )
        .execute(&writer)
        .await
        .expect("insert comment");

        let reader = connect_read_only(&url, 1, 5).await.expect("connect reader");
        let executor = SqlQueryExecutor::new(reader.clone());

        let error = executor.execute("DELETE FROM comments").await.expect_err("read-only");
        assert!(matches!(error, RepositoryError::Database(_)));

        let rows = executor.execute("SELECT COUNT(*) AS total FROM comments").await.expect("count");
        assert_eq!(rows[0].get("total"), Some(&json!(1)));
        reader.close().await;
        writer.close().await;
    }

    #[tokio::test]
    async fn malformed_statement_is_a_database_error() {
        let pool = seeded_pool().await;
        let executor = SqlQueryExecutor::new(pool.clone());

        let error = executor.execute("SELECT FROM WHERE").await.expect_err("syntax error");

        assert!(matches!(error, RepositoryError::Database(_)));
        pool.close().await;
    }
}
