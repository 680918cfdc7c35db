//! Web server module for vitals.
//!
//! Provides the HTTP API: metric ingestion, per-type queries, discovery
//! endpoints, and health probes. Handlers convert every failure into a
//! JSON result object; nothing on a request path panics.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use tokio::task::JoinSet;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::metrics::{self, IngestBatch, MetricRow};
use crate::storage::{Discovery, MetricFilter, QueryEngine, UpsertWriter, WriteOutcome};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub writer: UpsertWriter,
    pub query: QueryEngine,
    pub discovery: Discovery,
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    db: Option<String>,
}

/// Result object for the ingestion endpoint.
#[derive(Serialize)]
struct SaveStatus {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct SaveResponse {
    metrics: SaveStatus,
}

impl SaveResponse {
    fn ok(message: String) -> Self {
        Self {
            metrics: SaveStatus {
                success: true,
                message: Some(message),
                error: None,
            },
        }
    }

    fn error(error: String) -> Self {
        Self {
            metrics: SaveStatus {
                success: false,
                message: None,
                error: Some(error),
            },
        }
    }
}

/// Response for the available-metrics endpoint.
#[derive(Serialize)]
struct AvailableMetricsResponse {
    metrics: Vec<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let app_state = Arc::new(state);

    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route(
            "/api/metrics",
            get(available_metrics_handler).post(save_metrics_handler),
        )
        .route("/api/metrics/{name}", get(get_metrics_handler))
        .route("/api/sources", get(sources_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

/// Liveness probe.
async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        db: None,
    })
}

/// Readiness probe that checks the store registry is reachable.
async fn readyz_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.discovery.list_available_types().await {
        Ok(_) => Json(HealthResponse {
            status: "ok".to_string(),
            db: Some("ready".to_string()),
        })
        .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "not_ready".to_string(),
                    db: Some(err.to_string()),
                }),
            )
                .into_response()
        }
    }
}

/// Ingestion endpoint: map the batch, fan writes out per type, join all.
async fn save_metrics_handler(
    State(state): State<Arc<AppState>>,
    Json(batch): Json<IngestBatch>,
) -> Response {
    // Map every record first; one per-type batch per metric type across
    // the whole call, with the mapper's drop counts carried through.
    let mut grouped: HashMap<String, Vec<MetricRow>> = HashMap::new();
    let mut dropped = 0usize;

    for raw in &batch.metrics {
        match metrics::map(raw) {
            Ok(mapped) => {
                dropped += mapped.dropped;
                grouped.entry(mapped.type_id).or_default().extend(mapped.rows);
            }
            Err(err) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(SaveResponse::error(format!(
                        "failed while saving metrics: {err}"
                    ))),
                )
                    .into_response();
            }
        }
    }

    // Per-type batches run concurrently; the response is only assembled
    // after every batch has settled.
    let mut set = JoinSet::new();
    for (type_id, rows) in grouped {
        let writer = state.writer.clone();
        set.spawn(async move { writer.write(&type_id, rows).await });
    }

    let mut outcomes: Vec<WriteOutcome> = Vec::new();
    let mut failure: Option<String> = None;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(outcome)) => outcomes.push(outcome),
            Ok(Err(err)) => {
                tracing::error!(error = %err, "metric batch write failed");
                failure = Some(err.to_string());
            }
            Err(err) => {
                tracing::error!(error = %err, "metric batch task failed");
                failure = Some(err.to_string());
            }
        }
    }

    if let Some(err) = failure {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(SaveResponse::error(format!(
                "failed while saving metrics: {err}"
            ))),
        )
            .into_response();
    }

    outcomes.sort_by(|a, b| a.type_id().cmp(b.type_id()));
    let mut message = if outcomes.is_empty() {
        "no data".to_string()
    } else {
        outcomes
            .iter()
            .map(WriteOutcome::describe)
            .collect::<Vec<_>>()
            .join("; ")
    };
    if dropped > 0 {
        message.push_str(&format!("; {dropped} malformed sample(s) dropped"));
    }

    Json(SaveResponse::ok(message)).into_response()
}

/// Per-type query endpoint.
async fn get_metrics_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(filter): Query<MetricFilter>,
) -> Response {
    match state.query.fetch(&name, &filter).await {
        Ok(rows) => Json(rows).into_response(),
        Err(err) => {
            tracing::error!(error = %err, metric = %name, "metric query failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("failed while getting metrics: {err}"),
                }),
            )
                .into_response()
        }
    }
}

/// Available metric types endpoint.
async fn available_metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.discovery.list_available_types().await {
        Ok(types) => Json(AvailableMetricsResponse { metrics: types }).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "available metrics lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("failed while getting metrics: {err}"),
                }),
            )
                .into_response()
        }
    }
}

/// Observed sources endpoint.
async fn sources_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.discovery.list_sources().await {
        Ok(sources) => Json(sources).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "source lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("failed while getting sources: {err}"),
                }),
            )
                .into_response()
        }
    }
}
