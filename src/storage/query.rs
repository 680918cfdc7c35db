//! Filtered, projected queries over resolved stores.
//!
//! Filters come in as raw request strings and are normalized here:
//!
//! - `from`/`to`: the inclusive date bound applies only when BOTH parse;
//!   otherwise the date filter is omitted entirely (no partial ranges)
//! - `source`: comma-separated allow-list; `$__all` or `All` disables it
//! - `include`/`exclude`: post-query field projection, include first, then
//!   exclude subtracts; the key fields `source` and `date` always survive
//!
//! Results are opaque field maps, so stores created for never-declared
//! metric types query exactly like the well-known ones.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool, sqlite::SqliteRow};

use crate::metrics::parse_timestamp;
use crate::storage::StorageError;
use crate::storage::router::StoreRouter;

/// Sentinel source values meaning "all sources".
const ALL_SOURCES_SENTINELS: [&str; 2] = ["$__all", "All"];

/// Field names that always survive projection.
const KEY_FIELDS: [&str; 2] = ["source", "date"];

/// Raw query parameters for a metric read, as received from the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricFilter {
    /// Range start timestamp (inclusive).
    pub from: Option<String>,
    /// Range end timestamp (inclusive).
    pub to: Option<String>,
    /// Comma-separated source allow-list.
    pub source: Option<String>,
    /// Comma-separated fields to keep.
    pub include: Option<String>,
    /// Comma-separated fields to remove.
    pub exclude: Option<String>,
}

/// Which sources a query is restricted to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SourceSelection {
    All,
    Subset(Vec<String>),
}

impl MetricFilter {
    /// The inclusive date bound, or `None` unless both ends parse.
    fn date_bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let from = parse_timestamp(self.from.as_deref()?)?;
        let to = parse_timestamp(self.to.as_deref()?)?;
        Some((from, to))
    }

    fn source_selection(&self) -> SourceSelection {
        let Some(raw) = self.source.as_deref() else {
            return SourceSelection::All;
        };
        let entries = split_list(raw);
        if entries.is_empty()
            || entries
                .iter()
                .any(|e| ALL_SOURCES_SENTINELS.contains(&e.as_str()))
        {
            return SourceSelection::All;
        }
        SourceSelection::Subset(entries)
    }
}

/// Split a comma-separated parameter, trimming entries and discarding
/// empty or whitespace-only ones.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// Apply include/exclude projection to one result row.
///
/// Include runs first and keeps the named fields plus the key fields;
/// exclude then subtracts named fields, but never the key fields.
fn project(mut row: Map<String, Value>, include: &[String], exclude: &[String]) -> Map<String, Value> {
    if !include.is_empty() {
        row.retain(|key, _| {
            KEY_FIELDS.contains(&key.as_str()) || include.iter().any(|inc| inc == key)
        });
    }
    for field in exclude {
        if !KEY_FIELDS.contains(&field.as_str()) {
            row.remove(field);
        }
    }
    row
}

/// Read facade over any resolved store.
#[derive(Clone)]
pub struct QueryEngine {
    pool: SqlitePool,
    router: Arc<StoreRouter>,
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine").finish_non_exhaustive()
    }
}

impl QueryEngine {
    pub(crate) fn new(pool: SqlitePool, router: Arc<StoreRouter>) -> Self {
        Self { pool, router }
    }

    /// Fetch entities of one metric type, filtered and projected.
    ///
    /// A type that has never been written yields an empty result, not an
    /// error, and creates nothing.
    pub async fn fetch(
        &self,
        type_id: &str,
        filter: &MetricFilter,
    ) -> Result<Vec<Map<String, Value>>, StorageError> {
        let Some(store) = self.router.lookup(type_id).await? else {
            return Ok(Vec::new());
        };

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT source, date, fields FROM {} WHERE 1 = 1",
            store.table()
        ));

        if let Some((from, to)) = filter.date_bounds() {
            qb.push(" AND date >= ")
                .push_bind(from.timestamp_micros())
                .push(" AND date <= ")
                .push_bind(to.timestamp_micros());
        }

        match filter.source_selection() {
            SourceSelection::All => {}
            SourceSelection::Subset(sources) if sources.len() == 1 => {
                qb.push(" AND source = ")
                    .push_bind(sources.into_iter().next().unwrap());
            }
            SourceSelection::Subset(sources) => {
                qb.push(" AND source IN (");
                let mut separated = qb.separated(", ");
                for source in sources {
                    separated.push_bind(source);
                }
                qb.push(")");
            }
        }

        qb.push(" ORDER BY date ASC");

        let include = filter.include.as_deref().map(split_list).unwrap_or_default();
        let exclude = filter.exclude.as_deref().map(split_list).unwrap_or_default();

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|row| project(decode_row(&row), &include, &exclude))
            .collect())
    }
}

/// Decode one stored row into its field-map form.
fn decode_row(row: &SqliteRow) -> Map<String, Value> {
    let source: String = row.get(0);
    let micros: i64 = row.get(1);
    let fields_json: String = row.get(2);

    let date = DateTime::from_timestamp_micros(micros).unwrap_or(DateTime::UNIX_EPOCH);

    let mut map = Map::new();
    map.insert("source".to_string(), Value::String(source));
    map.insert("date".to_string(), Value::String(date.to_rfc3339()));
    map.extend(parse_fields(&fields_json));
    map
}

/// Parse a stored JSON field map, falling back to empty on bad data.
fn parse_fields(raw: &str) -> Map<String, Value> {
    if raw.is_empty() || raw == "{}" {
        return Map::new();
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::debug!(error = %e, raw, "failed to parse stored field map, returning empty");
        Map::new()
    })
}
