//! vitals - Health Metric Ingestion & Query Library
//!
//! This crate normalizes heterogeneous health-metric exports into canonical
//! per-type records, persists them idempotently, and serves them back
//! through filtered, projected queries. It can be used as a library or run
//! as a standalone service with the `vitals` executable.
//!
//! # Architecture
//!
//! - **Metrics**: schema registry and raw-payload mapping into canonical rows
//! - **Storage**: SQLite-backed stores, one per metric type, created lazily
//! - **Server**: REST API for ingestion, queries, and discovery
//!
//! # Example
//!
//! ```rust,ignore
//! use vitals::{StorageBuilder, server::{AppState, create_router}};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let handles = StorageBuilder::new("sqlite:data/vitals.db").build().await?;
//!     let state = AppState {
//!         writer: handles.writer.clone(),
//!         query: handles.query.clone(),
//!         discovery: handles.discovery.clone(),
//!     };
//!     let app = create_router(state);
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod metrics;
pub mod server;
pub mod storage;

pub use config::AppConfig;
pub use metrics::{MetricKind, MetricRow};
pub use storage::{
    Discovery, MetricFilter, QueryEngine, StorageBuilder, StorageError, StorageHandles,
    UpsertWriter, WriteOutcome,
};
