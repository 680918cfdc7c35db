//! Idempotent batch writes.
//!
//! One upsert per entity, matched on the (source, date) natural key within
//! the type's store. A hit replaces all fields with the incoming entity
//! (full overwrite, not merge); a miss inserts. Entities within a batch
//! have no required relative order, and there is no cross-entity
//! transaction: correctness rests on each upsert being an atomic
//! single-key operation.

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::metrics::MetricRow;
use crate::storage::StorageError;
use crate::storage::router::StoreRouter;

/// Outcome of writing one per-type batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Entities were upserted into the type's store.
    Written { type_id: String, count: usize },
    /// The batch carried no entities; distinguishable from failure.
    NoData { type_id: String },
}

impl WriteOutcome {
    /// The metric-type identifier this outcome belongs to.
    pub fn type_id(&self) -> &str {
        match self {
            Self::Written { type_id, .. } | Self::NoData { type_id } => type_id,
        }
    }

    /// Human-readable description for the combined ingest response.
    pub fn describe(&self) -> String {
        match self {
            Self::Written { type_id, count } => format!("{type_id}: {count} saved"),
            Self::NoData { type_id } => format!("{type_id}: no data"),
        }
    }
}

/// Writes pre-partitioned per-type batches.
///
/// Partitioning by type is the mapper's output contract; the writer is
/// handed one type at a time.
#[derive(Clone)]
pub struct UpsertWriter {
    pool: SqlitePool,
    router: Arc<StoreRouter>,
}

impl std::fmt::Debug for UpsertWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpsertWriter").finish_non_exhaustive()
    }
}

impl UpsertWriter {
    pub(crate) fn new(pool: SqlitePool, router: Arc<StoreRouter>) -> Self {
        Self { pool, router }
    }

    /// Upsert one per-type batch.
    ///
    /// Resolves (and if needed creates) the type's store, then issues one
    /// keyed upsert per entity. An empty batch reports
    /// [`WriteOutcome::NoData`] without touching storage.
    pub async fn write(
        &self,
        type_id: &str,
        rows: Vec<MetricRow>,
    ) -> Result<WriteOutcome, StorageError> {
        if rows.is_empty() {
            return Ok(WriteOutcome::NoData {
                type_id: type_id.to_string(),
            });
        }

        let store = self.router.resolve(type_id).await?;
        let sql = format!(
            "INSERT INTO {table} (source, date, fields) VALUES (?, ?, ?)
             ON CONFLICT (source, date) DO UPDATE SET fields = excluded.fields",
            table = store.table()
        );

        let count = rows.len();
        for row in rows {
            sqlx::query(&sql)
                .bind(&row.source)
                .bind(row.date.timestamp_micros())
                .bind(serde_json::to_string(&row.fields)?)
                .execute(&self.pool)
                .await?;
        }

        tracing::debug!(type_id, count, "metric batch upserted");
        Ok(WriteOutcome::Written {
            type_id: type_id.to_string(),
            count,
        })
    }
}
