//! Store and source discovery.
//!
//! Enumerates which metric types exist (have ever received data) and which
//! `source` identifiers have been observed across the well-known stores.

use std::collections::BTreeSet;
use std::sync::Arc;

use sqlx::SqlitePool;

use crate::metrics::{KNOWN_KINDS, MetricKind};
use crate::storage::StorageError;
use crate::storage::router::StoreRouter;

/// Read-only discovery facade.
#[derive(Clone)]
pub struct Discovery {
    pool: SqlitePool,
    router: Arc<StoreRouter>,
}

impl std::fmt::Debug for Discovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Discovery").finish_non_exhaustive()
    }
}

impl Discovery {
    pub(crate) fn new(pool: SqlitePool, router: Arc<StoreRouter>) -> Self {
        Self { pool, router }
    }

    /// All metric types with an existing store, sorted, without duplicates.
    ///
    /// Only metric stores live in the registry, so system tables are
    /// structurally excluded.
    pub async fn list_available_types(&self) -> Result<Vec<String>, StorageError> {
        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM metric_stores ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }

    /// Distinct `source` values across the well-known stores, sorted.
    ///
    /// Deliberately limited to the statically known types
    /// ([`KNOWN_KINDS`]); stores created for dynamic metric types are not
    /// scanned. The three lookups run concurrently and are combined at the
    /// end.
    pub async fn list_sources(&self) -> Result<Vec<String>, StorageError> {
        let [heart_rate, blood_pressure, sleep] = KNOWN_KINDS;
        let (a, b, c) = tokio::try_join!(
            self.distinct_sources(heart_rate),
            self.distinct_sources(blood_pressure),
            self.distinct_sources(sleep),
        )?;

        let merged: BTreeSet<String> = a.into_iter().chain(b).chain(c).collect();
        Ok(merged.into_iter().collect())
    }

    async fn distinct_sources(&self, kind: MetricKind) -> Result<Vec<String>, StorageError> {
        let Some(store) = self.router.lookup(kind.as_ref()).await? else {
            return Ok(Vec::new());
        };
        let sources =
            sqlx::query_scalar(&format!("SELECT DISTINCT source FROM {}", store.table()))
                .fetch_all(&self.pool)
                .await?;
        Ok(sources)
    }
}
