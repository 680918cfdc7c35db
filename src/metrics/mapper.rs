//! Raw payload to canonical record mapping.
//!
//! One [`RawMetricPayload`] carries zero or more samples in whatever shape
//! the exporting device chose. Mapping expands nested reading arrays,
//! extracts the fixed field set for known types, and passes unknown types
//! through as generic field maps. Samples missing their natural key are
//! dropped, not errored: partial loss of malformed samples is preferred
//! over failing a whole batch, and the drop count is part of the result.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::metrics::registry::{self, MetricSchema};
use crate::metrics::types::{
    BloodPressureRecord, GenericRecord, HeartRateRecord, MetricKind, MetricRecord, MetricRow,
    SleepRecord, parse_timestamp,
};

/// Key under which a sample may nest an array of sub-readings
/// (e.g., several blood pressure readings delivered in one sample).
const NESTED_READINGS_KEY: &str = "readings";

/// An untrusted ingestion record: one metric type and its raw samples.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMetricPayload {
    /// Metric-type identifier, e.g. `"HeartRate"` or any unseen name.
    #[serde(default)]
    pub name: String,
    /// Raw samples in device-specific shape.
    #[serde(default)]
    pub samples: Vec<Value>,
}

/// The POST body of an ingestion call: a batch of raw records.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestBatch {
    #[serde(default)]
    pub metrics: Vec<RawMetricPayload>,
}

/// Mapping failures that reject the record outright.
///
/// Per-sample problems never surface here; they drop the sample and bump
/// [`MappedRecord::dropped`] instead.
#[derive(Debug, Error)]
pub enum MapError {
    /// The record has no metric-type name.
    #[error("metric record is missing a name")]
    MissingName,
}

/// Result of mapping one raw record.
#[derive(Debug)]
pub struct MappedRecord {
    /// The metric-type identifier, exactly as received.
    pub type_id: String,
    /// Canonical rows, one per accepted sample.
    pub rows: Vec<MetricRow>,
    /// Samples dropped for a missing or unparseable field set.
    pub dropped: usize,
}

/// Map one raw record into canonical rows.
///
/// Pure transformation: no I/O, and a record with zero samples maps to zero
/// rows without error.
pub fn map(raw: &RawMetricPayload) -> Result<MappedRecord, MapError> {
    if raw.name.is_empty() {
        return Err(MapError::MissingName);
    }

    let schema = registry::schema_for(&raw.name);
    let mut rows = Vec::new();
    let mut dropped = 0usize;

    for sample in &raw.samples {
        for candidate in expand_readings(sample) {
            match extract(schema, candidate) {
                Some(record) => rows.push(record.into_row()),
                None => dropped += 1,
            }
        }
    }

    if dropped > 0 {
        tracing::debug!(
            metric = %raw.name,
            dropped,
            kept = rows.len(),
            "malformed samples dropped during mapping"
        );
    }

    Ok(MappedRecord {
        type_id: raw.name.clone(),
        rows,
        dropped,
    })
}

/// Expand a sample's nested `readings` array into standalone candidates.
///
/// Each object reading inherits the parent sample's fields and overrides
/// them with its own; samples without a readings array pass through as a
/// single candidate.
fn expand_readings(sample: &Value) -> Vec<Value> {
    let Some(obj) = sample.as_object() else {
        return vec![sample.clone()];
    };
    let Some(readings) = obj.get(NESTED_READINGS_KEY).and_then(Value::as_array) else {
        return vec![sample.clone()];
    };

    let mut parent = obj.clone();
    parent.remove(NESTED_READINGS_KEY);

    readings
        .iter()
        .map(|reading| {
            let mut merged = parent.clone();
            if let Some(fields) = reading.as_object() {
                for (key, value) in fields {
                    merged.insert(key.clone(), value.clone());
                }
                Value::Object(merged)
            } else {
                // Non-object readings carry no fields of their own and fail
                // extraction downstream, counting as dropped.
                reading.clone()
            }
        })
        .collect()
}

/// Extract one canonical record from a candidate sample, or `None` to drop.
fn extract(schema: MetricSchema, candidate: Value) -> Option<MetricRecord> {
    match schema {
        MetricSchema::Known(MetricKind::HeartRate) => {
            serde_json::from_value::<HeartRateRecord>(candidate)
                .ok()
                .map(MetricRecord::HeartRate)
        }
        MetricSchema::Known(MetricKind::BloodPressure) => {
            serde_json::from_value::<BloodPressureRecord>(candidate)
                .ok()
                .map(MetricRecord::BloodPressure)
        }
        MetricSchema::Known(MetricKind::Sleep) => serde_json::from_value::<SleepRecord>(candidate)
            .ok()
            .map(MetricRecord::Sleep),
        MetricSchema::Generic => extract_generic(candidate),
    }
}

/// Generic extraction: source/date mandatory, everything else kept as-is.
fn extract_generic(candidate: Value) -> Option<MetricRecord> {
    let Value::Object(mut fields) = candidate else {
        return None;
    };

    let source = match fields.remove("source") {
        Some(Value::String(s)) if !s.is_empty() => s,
        _ => return None,
    };
    let date = fields
        .remove("date")
        .as_ref()
        .and_then(Value::as_str)
        .and_then(parse_timestamp)?;

    Some(MetricRecord::Generic(GenericRecord {
        source,
        date,
        fields,
    }))
}
