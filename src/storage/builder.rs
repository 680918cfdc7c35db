//! Storage builder and handles.
//!
//! Provides a builder pattern for constructing the storage layer and a
//! handles struct exposing the facades that share one pool and router.

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;

use crate::storage::db::{self, DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_MAX_CONNECTIONS};
use crate::storage::discovery::Discovery;
use crate::storage::query::QueryEngine;
use crate::storage::router::StoreRouter;
use crate::storage::schema::init_schema;
use crate::storage::writer::UpsertWriter;
use crate::storage::StorageError;

/// Builder for constructing the storage layer.
pub struct StorageBuilder {
    url: String,
    max_connections: u32,
    acquire_timeout: Duration,
}

impl StorageBuilder {
    /// Create a new storage builder for a SQLite URL
    /// (e.g., `sqlite:data/vitals.db` or `sqlite::memory:`).
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }

    /// Set the maximum pool connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the connection acquire timeout.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Build the storage layer and return handles.
    pub async fn build(self) -> Result<StorageHandles, StorageError> {
        // Create the parent directory for file-backed databases so that
        // create-if-missing can succeed on a fresh deployment.
        if let Some(path) = self
            .url
            .strip_prefix("sqlite:")
            .filter(|p| !p.starts_with(':') && !p.is_empty())
            && let Some(parent) = std::path::Path::new(path.trim_start_matches("//")).parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Internal(format!(
                    "failed to create database directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let pool = db::connect(&self.url, self.max_connections, self.acquire_timeout).await?;
        init_schema(&pool).await?;

        let router = StoreRouter::new(pool.clone());

        Ok(StorageHandles {
            writer: UpsertWriter::new(pool.clone(), Arc::clone(&router)),
            query: QueryEngine::new(pool.clone(), Arc::clone(&router)),
            discovery: Discovery::new(pool.clone(), Arc::clone(&router)),
            router,
            pool,
        })
    }
}

/// Handles to all storage layer facades.
#[derive(Clone)]
pub struct StorageHandles {
    /// Idempotent per-type batch writer.
    pub writer: UpsertWriter,
    /// Filtered, projected reads.
    pub query: QueryEngine,
    /// Store and source enumeration.
    pub discovery: Discovery,
    /// Store resolution (shared by the facades).
    pub router: Arc<StoreRouter>,
    pool: SqlitePool,
}

impl StorageHandles {
    /// Gracefully close the connection pool.
    pub async fn shutdown(self) {
        self.pool.close().await;
    }
}
