//! Storage Layer
//!
//! SQLite-backed persistence with one store per metric type:
//!
//! - [`StoreRouter`]: metric-type identifier → store handle, created lazily
//! - [`UpsertWriter`]: idempotent batch writes keyed by (source, date)
//! - [`QueryEngine`]: filtered, projected reads over any resolved store
//! - [`Discovery`]: store and source enumeration
//! - [`StorageBuilder`] / [`StorageHandles`]: initialization and lifecycle

mod builder;
pub mod db;
mod discovery;
mod error;
mod query;
mod router;
mod schema;
mod writer;

pub use builder::{StorageBuilder, StorageHandles};
pub use discovery::Discovery;
pub use error::StorageError;
pub use query::{MetricFilter, QueryEngine};
pub use router::{StoreHandle, StoreRouter};
pub use schema::init_schema;
pub use writer::{UpsertWriter, WriteOutcome};
