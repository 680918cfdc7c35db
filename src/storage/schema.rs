//! Database schema definitions.
//!
//! The schema has one fixed table: `metric_stores`, a registry mapping each
//! metric-type identifier to its data table. Data tables themselves are
//! created lazily by the [`StoreRouter`](crate::storage::StoreRouter) the
//! first time a type is written.

use sqlx::SqlitePool;

use crate::storage::StorageError;

/// SQL statement for creating the store registry table.
///
/// `name` holds the metric-type identifier exactly as received; SQLite's
/// default BINARY collation keeps lookups case-sensitive, so `HeartRate`
/// and `heartrate` resolve to different stores.
pub const METRIC_STORES_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS metric_stores (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    name       TEXT NOT NULL UNIQUE,
    created_at BIGINT NOT NULL
);
"#;

/// Name of the data table backing store `id`.
pub fn store_table_name(id: i64) -> String {
    format!("store_{id}")
}

/// DDL for the data table backing store `id`.
///
/// Every store has the same generic shape: the (source, date) natural key
/// plus a JSON field map. Timestamps are stored as microseconds since epoch.
pub fn store_table_ddl(id: i64) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
    source TEXT NOT NULL,
    date   BIGINT NOT NULL,
    fields TEXT NOT NULL DEFAULT '{{}}',
    PRIMARY KEY (source, date)
);
"#,
        table = store_table_name(id)
    )
}

/// Initialize the database schema.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query(METRIC_STORES_TABLE_DDL).execute(pool).await?;

    tracing::info!("Database schema initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db;

    async fn test_pool() -> SqlitePool {
        db::connect("sqlite::memory:", 1, std::time::Duration::from_secs(5))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_schema_initialization() {
        let pool = test_pool().await;
        init_schema(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'metric_stores'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_registry_name_is_case_sensitive() {
        let pool = test_pool().await;
        init_schema(&pool).await.unwrap();

        sqlx::query("INSERT INTO metric_stores (name, created_at) VALUES ('HeartRate', 0)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO metric_stores (name, created_at) VALUES ('heartrate', 0)")
            .execute(&pool)
            .await
            .unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM metric_stores")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_store_table_upsert_keeps_key_unique() {
        let pool = test_pool().await;
        init_schema(&pool).await.unwrap();

        sqlx::query(&store_table_ddl(1)).execute(&pool).await.unwrap();

        let upsert = "INSERT INTO store_1 (source, date, fields) VALUES (?, ?, ?)
             ON CONFLICT (source, date) DO UPDATE SET fields = excluded.fields";
        sqlx::query(upsert)
            .bind("Watch")
            .bind(1_000i64)
            .bind(r#"{"bpm":60.0}"#)
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(upsert)
            .bind("Watch")
            .bind(1_000i64)
            .bind(r#"{"bpm":65.0}"#)
            .execute(&pool)
            .await
            .unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM store_1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);

        let fields: String = sqlx::query_scalar("SELECT fields FROM store_1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(fields, r#"{"bpm":65.0}"#);
    }
}
