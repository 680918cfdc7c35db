//! API Integration Tests for vitals
//!
//! End-to-end coverage of the HTTP API: ingestion, idempotent re-ingestion,
//! filtered queries, and discovery endpoints against a real server.

use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;
use vitals::StorageBuilder;
use vitals::server::{AppState, create_router};

// =============================================================================
// Test Helpers
// =============================================================================

/// Start a test server backed by a file database and return its base URL.
async fn start_test_server() -> (String, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let url = format!("sqlite:{}", dir.path().join("test.db").display());

    let handles = StorageBuilder::new(&url)
        .max_connections(2)
        .build()
        .await
        .expect("Failed to build storage");

    let state = AppState {
        writer: handles.writer.clone(),
        query: handles.query.clone(),
        discovery: handles.discovery.clone(),
    };
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let addr = listener.local_addr().expect("Failed to get local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    // Give server time to start
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    // Keep the tempdir alive for the duration of the test
    (format!("http://{}", addr), dir)
}

async fn post_metrics(client: &reqwest::Client, base_url: &str, body: Value) -> Value {
    let resp = client
        .post(format!("{}/api/metrics", base_url))
        .json(&body)
        .send()
        .await
        .expect("Failed to post metrics");
    assert!(resp.status().is_success(), "save failed: {}", resp.status());
    resp.json().await.expect("Failed to parse save response")
}

async fn get_json(client: &reqwest::Client, url: String) -> Value {
    let resp = client.get(url).send().await.expect("Failed to send GET");
    assert_eq!(resp.status(), 200);
    resp.json().await.expect("Failed to parse response")
}

fn heart_rate_batch(bpm: f64) -> Value {
    json!({
        "metrics": [{
            "name": "HeartRate",
            "samples": [
                {"source": "Watch", "date": "2024-01-01T00:00:00Z", "bpm": bpm},
            ],
        }],
    })
}

// =============================================================================
// Health Probe Tests
// =============================================================================

#[tokio::test]
async fn test_health_probes() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let body = get_json(&client, format!("{}/healthz", base_url)).await;
    assert_eq!(body["status"], "ok");

    let body = get_json(&client, format!("{}/readyz", base_url)).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["db"], "ready");
}

// =============================================================================
// Ingestion + Query Tests
// =============================================================================

#[tokio::test]
async fn test_ingest_then_query_roundtrip() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let saved = post_metrics(&client, &base_url, heart_rate_batch(60.0)).await;
    assert_eq!(saved["metrics"]["success"], json!(true));
    assert_eq!(saved["metrics"]["message"], json!("HeartRate: 1 saved"));

    let rows = get_json(&client, format!("{}/api/metrics/HeartRate", base_url)).await;
    let rows = rows.as_array().expect("expected array");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["source"], json!("Watch"));
    assert_eq!(rows[0]["date"], json!("2024-01-01T00:00:00+00:00"));
    assert_eq!(rows[0]["bpm"], json!(60.0));
}

#[tokio::test]
async fn test_reingest_overwrites_same_key() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    post_metrics(&client, &base_url, heart_rate_batch(60.0)).await;
    post_metrics(&client, &base_url, heart_rate_batch(65.0)).await;

    let rows = get_json(&client, format!("{}/api/metrics/HeartRate", base_url)).await;
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1, "re-ingest must not duplicate the entity");
    assert_eq!(rows[0]["bpm"], json!(65.0), "second write's value must win");
}

#[tokio::test]
async fn test_multi_type_batch_fans_out() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let saved = post_metrics(
        &client,
        &base_url,
        json!({
            "metrics": [
                {
                    "name": "HeartRate",
                    "samples": [
                        {"source": "Watch", "date": "2024-01-01T00:00:00Z", "bpm": 60.0},
                        {"source": "Watch", "date": "2024-01-01T00:01:00Z", "bpm": 61.0},
                    ],
                },
                {
                    "name": "BloodGlucose",
                    "samples": [
                        {"source": "Meter", "date": "2024-01-01T07:30:00Z", "mgdl": 94.0},
                    ],
                },
                {"name": "StepCount", "samples": []},
            ],
        }),
    )
    .await;
    assert_eq!(saved["metrics"]["success"], json!(true));
    assert_eq!(
        saved["metrics"]["message"],
        json!("BloodGlucose: 1 saved; HeartRate: 2 saved; StepCount: no data")
    );

    let rows = get_json(&client, format!("{}/api/metrics/BloodGlucose", base_url)).await;
    assert_eq!(rows.as_array().unwrap().len(), 1);
    assert_eq!(rows[0]["mgdl"], json!(94.0));
}

#[tokio::test]
async fn test_dropped_samples_reported() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let saved = post_metrics(
        &client,
        &base_url,
        json!({
            "metrics": [{
                "name": "HeartRate",
                "samples": [
                    {"source": "Watch", "date": "2024-01-01T00:00:00Z", "bpm": 60.0},
                    {"date": "2024-01-01T00:01:00Z", "bpm": 61.0},
                ],
            }],
        }),
    )
    .await;
    assert_eq!(saved["metrics"]["success"], json!(true));
    assert_eq!(
        saved["metrics"]["message"],
        json!("HeartRate: 1 saved; 1 malformed sample(s) dropped")
    );
}

#[tokio::test]
async fn test_query_filters_and_projection() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    post_metrics(
        &client,
        &base_url,
        json!({
            "metrics": [{
                "name": "HeartRate",
                "samples": [
                    {"source": "Watch", "date": "2024-01-01T00:00:00Z", "bpm": 60.0},
                    {"source": "Strap", "date": "2024-01-02T00:00:00Z", "bpm": 61.0},
                    {"source": "Ring", "date": "2024-01-03T00:00:00Z", "bpm": 62.0},
                ],
            }],
        }),
    )
    .await;

    // Source allow-list
    let rows = get_json(
        &client,
        format!("{}/api/metrics/HeartRate?source=Watch,Strap", base_url),
    )
    .await;
    assert_eq!(rows.as_array().unwrap().len(), 2);

    // Sentinel disables source filtering
    let rows = get_json(
        &client,
        format!("{}/api/metrics/HeartRate?source=$__all", base_url),
    )
    .await;
    assert_eq!(rows.as_array().unwrap().len(), 3);

    // Inclusive date range
    let rows = get_json(
        &client,
        format!(
            "{}/api/metrics/HeartRate?from=2024-01-01T00:00:00Z&to=2024-01-02T00:00:00Z",
            base_url
        ),
    )
    .await;
    assert_eq!(rows.as_array().unwrap().len(), 2);

    // Broken range bound falls back to unfiltered
    let rows = get_json(
        &client,
        format!(
            "{}/api/metrics/HeartRate?from=garbage&to=2024-01-02T00:00:00Z",
            base_url
        ),
    )
    .await;
    assert_eq!(rows.as_array().unwrap().len(), 3);

    // Projection: include keeps key fields
    let rows = get_json(
        &client,
        format!("{}/api/metrics/HeartRate?include=date", base_url),
    )
    .await;
    for row in rows.as_array().unwrap() {
        let obj = row.as_object().unwrap();
        assert!(obj.contains_key("date"));
        assert!(obj.contains_key("source"));
        assert!(!obj.contains_key("bpm"));
    }
}

// =============================================================================
// Discovery Tests
// =============================================================================

#[tokio::test]
async fn test_available_metrics_after_dynamic_ingestion() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    post_metrics(
        &client,
        &base_url,
        json!({
            "metrics": [
                {"name": "Vo2Max", "samples": [
                    {"source": "Watch", "date": "2024-01-01T00:00:00Z", "value": 41.0},
                ]},
                {"name": "BloodGlucose", "samples": [
                    {"source": "Meter", "date": "2024-01-01T00:00:00Z", "mgdl": 94.0},
                ]},
            ],
        }),
    )
    .await;
    // A second call for an already-known dynamic type must not duplicate it.
    post_metrics(
        &client,
        &base_url,
        json!({
            "metrics": [{"name": "Vo2Max", "samples": [
                {"source": "Watch", "date": "2024-01-02T00:00:00Z", "value": 42.0},
            ]}],
        }),
    )
    .await;

    let body = get_json(&client, format!("{}/api/metrics", base_url)).await;
    assert_eq!(body["metrics"], json!(["BloodGlucose", "Vo2Max"]));
}

#[tokio::test]
async fn test_sources_scan_well_known_stores() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    post_metrics(
        &client,
        &base_url,
        json!({
            "metrics": [
                {"name": "HeartRate", "samples": [
                    {"source": "Watch", "date": "2024-01-01T00:00:00Z", "bpm": 60.0},
                ]},
                {"name": "BloodPressure", "samples": [
                    {"source": "Cuff", "date": "2024-01-01T00:00:00Z",
                     "systolic": 120.0, "diastolic": 80.0},
                ]},
                {"name": "SleepAnalysis", "samples": [
                    {"source": "Watch", "date": "2024-01-01T23:00:00Z",
                     "asleep": 7.5, "inBed": 8.0},
                ]},
                // Dynamic store; its source must not appear in the scan.
                {"name": "BloodGlucose", "samples": [
                    {"source": "Meter", "date": "2024-01-01T00:00:00Z", "mgdl": 94.0},
                ]},
            ],
        }),
    )
    .await;

    let sources = get_json(&client, format!("{}/api/sources", base_url)).await;
    assert_eq!(sources, json!(["Cuff", "Watch"]));
}

#[tokio::test]
async fn test_case_distinct_type_ids_get_distinct_stores() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    post_metrics(
        &client,
        &base_url,
        json!({
            "metrics": [
                {"name": "heartrate", "samples": [
                    {"source": "Phone", "date": "2024-01-01T00:00:00Z", "bpm": 70.0},
                ]},
            ],
        }),
    )
    .await;

    // The lowercase id is its own generic store.
    let rows = get_json(&client, format!("{}/api/metrics/heartrate", base_url)).await;
    assert_eq!(rows.as_array().unwrap().len(), 1);

    // The well-known store remains empty.
    let rows = get_json(&client, format!("{}/api/metrics/HeartRate", base_url)).await;
    assert!(rows.as_array().unwrap().is_empty());
}
