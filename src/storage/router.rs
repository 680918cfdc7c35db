//! Store resolution and lazy creation.
//!
//! Each metric-type identifier owns exactly one store: a row in the
//! `metric_stores` registry plus a data table. Known and unknown types are
//! routed identically; the registry is what makes an arbitrary new type
//! usable without declaration. Resolution is idempotent and safe under
//! concurrent fan-out: the registry insert is `INSERT OR IGNORE` keyed on
//! the exact type name, and table creation is `IF NOT EXISTS`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::RwLock;

use crate::storage::StorageError;
use crate::storage::schema::{store_table_ddl, store_table_name};

/// Handle to one resolved store.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    type_id: String,
    table: String,
}

impl StoreHandle {
    /// The metric-type identifier this store is scoped to.
    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    /// The backing data table name.
    pub fn table(&self) -> &str {
        &self.table
    }
}

/// Routes metric-type identifiers to their stores.
///
/// Handles are cached for the process lifetime; the cache starts empty and
/// has no teardown requirement.
pub struct StoreRouter {
    pool: SqlitePool,
    cache: RwLock<HashMap<String, StoreHandle>>,
}

impl std::fmt::Debug for StoreRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRouter").finish_non_exhaustive()
    }
}

impl StoreRouter {
    pub(crate) fn new(pool: SqlitePool) -> Arc<Self> {
        Arc::new(Self {
            pool,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Resolve a type to its store, creating the store on first use.
    ///
    /// Repeated calls with the same identifier return a handle to the same
    /// store. Creation failure surfaces as [`StorageError`] and is not
    /// retried here.
    pub async fn resolve(&self, type_id: &str) -> Result<StoreHandle, StorageError> {
        if let Some(handle) = self.cache.read().await.get(type_id) {
            return Ok(handle.clone());
        }

        sqlx::query("INSERT OR IGNORE INTO metric_stores (name, created_at) VALUES (?, ?)")
            .bind(type_id)
            .bind(Utc::now().timestamp_micros())
            .execute(&self.pool)
            .await?;

        let id: i64 = sqlx::query_scalar("SELECT id FROM metric_stores WHERE name = ?")
            .bind(type_id)
            .fetch_one(&self.pool)
            .await?;

        sqlx::query(&store_table_ddl(id)).execute(&self.pool).await?;

        let handle = StoreHandle {
            type_id: type_id.to_string(),
            table: store_table_name(id),
        };

        let mut cache = self.cache.write().await;
        // A concurrent resolve may have won the race; both handles point at
        // the same table, so last insert wins harmlessly.
        cache.insert(type_id.to_string(), handle.clone());

        tracing::debug!(type_id, table = %handle.table, "store resolved");
        Ok(handle)
    }

    /// Look up a type's store without creating it.
    ///
    /// Returns `None` for types that have never been written; the read path
    /// treats that as an empty result set rather than an error.
    pub async fn lookup(&self, type_id: &str) -> Result<Option<StoreHandle>, StorageError> {
        if let Some(handle) = self.cache.read().await.get(type_id) {
            return Ok(Some(handle.clone()));
        }

        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM metric_stores WHERE name = ?")
            .bind(type_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(id) = id else {
            return Ok(None);
        };

        // The registry row exists, so a writer created this store; the DDL
        // is idempotent and heals a crash between registration and creation.
        sqlx::query(&store_table_ddl(id)).execute(&self.pool).await?;

        let handle = StoreHandle {
            type_id: type_id.to_string(),
            table: store_table_name(id),
        };
        self.cache
            .write()
            .await
            .insert(type_id.to_string(), handle.clone());

        Ok(Some(handle))
    }
}
