//! Canonical metric record types.
//!
//! This module defines the shapes health samples are normalized into:
//!
//! - [`MetricKind`]: the closed set of statically known metric types
//! - [`HeartRateRecord`] / [`BloodPressureRecord`] / [`SleepRecord`]: typed
//!   variants with fixed field sets
//! - [`GenericRecord`]: open field-map variant for unknown metric types
//! - [`MetricRow`]: the storage-facing flat form keyed by (source, date)

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use strum_macros::{AsRefStr, Display, EnumString};

/// Statically known metric types.
///
/// Identifiers are matched exactly, case preserved: `"heartrate"` is NOT
/// [`MetricKind::HeartRate`] and resolves to a generic store of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, AsRefStr)]
pub enum MetricKind {
    /// Heart rate samples (bpm).
    HeartRate,
    /// Blood pressure readings (systolic/diastolic).
    BloodPressure,
    /// Sleep analysis intervals with stage durations.
    #[strum(serialize = "SleepAnalysis")]
    Sleep,
}

/// A heart rate sample.
///
/// # Example
///
/// ```
/// use vitals::metrics::HeartRateRecord;
/// use serde_json::json;
///
/// let rec: HeartRateRecord = serde_json::from_value(json!({
///     "source": "Watch",
///     "date": "2024-01-01T00:00:00Z",
///     "bpm": 60.0,
/// }))
/// .unwrap();
/// assert_eq!(rec.bpm, 60.0);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartRateRecord {
    /// Device or app that produced the sample.
    pub source: String,
    /// Sample timestamp (UTC).
    #[serde(deserialize_with = "de_timestamp", serialize_with = "ser_timestamp")]
    pub date: DateTime<Utc>,
    /// Beats per minute.
    pub bpm: f64,
}

/// A blood pressure reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BloodPressureRecord {
    pub source: String,
    #[serde(deserialize_with = "de_timestamp", serialize_with = "ser_timestamp")]
    pub date: DateTime<Utc>,
    /// Systolic pressure (mmHg).
    pub systolic: f64,
    /// Diastolic pressure (mmHg).
    pub diastolic: f64,
}

/// A sleep analysis interval.
///
/// Stage durations are optional; not every exporter breaks sleep down
/// beyond asleep/inBed totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SleepRecord {
    pub source: String,
    #[serde(deserialize_with = "de_timestamp", serialize_with = "ser_timestamp")]
    pub date: DateTime<Utc>,
    /// Total hours asleep.
    pub asleep: f64,
    /// Total hours in bed.
    #[serde(rename = "inBed")]
    pub in_bed: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deep: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub core: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rem: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub awake: Option<f64>,
}

/// A sample of a metric type with no statically known shape.
///
/// All provided fields are kept unchanged; only `source` and `date` are
/// mandatory and lifted out as the natural key.
#[derive(Debug, Clone)]
pub struct GenericRecord {
    pub source: String,
    pub date: DateTime<Utc>,
    /// Every sample field except `source` and `date`, passed through as-is.
    pub fields: Map<String, Value>,
}

/// A canonical metric record: one of the closed known variants, or the
/// generic fallback for unseen metric types.
#[derive(Debug, Clone)]
pub enum MetricRecord {
    HeartRate(HeartRateRecord),
    BloodPressure(BloodPressureRecord),
    Sleep(SleepRecord),
    Generic(GenericRecord),
}

impl MetricRecord {
    /// Flatten into the storage-facing row form.
    pub fn into_row(self) -> MetricRow {
        match self {
            Self::HeartRate(rec) => typed_row(rec.source.clone(), rec.date, &rec),
            Self::BloodPressure(rec) => typed_row(rec.source.clone(), rec.date, &rec),
            Self::Sleep(rec) => typed_row(rec.source.clone(), rec.date, &rec),
            Self::Generic(rec) => MetricRow {
                source: rec.source,
                date: rec.date,
                fields: rec.fields,
            },
        }
    }
}

/// A canonical entity in its storage-facing form.
///
/// `source` and `date` form the natural key; within one store no two rows
/// share a (source, date) pair. Everything else lives in `fields`.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    pub source: String,
    pub date: DateTime<Utc>,
    pub fields: Map<String, Value>,
}

/// Serialize a typed record and strip the key fields into row form.
fn typed_row<T: Serialize>(source: String, date: DateTime<Utc>, rec: &T) -> MetricRow {
    let mut fields = match serde_json::to_value(rec) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    fields.remove("source");
    fields.remove("date");
    MetricRow {
        source,
        date,
        fields,
    }
}

// =============================================================================
// Timestamp handling
// =============================================================================

/// Timestamp formats accepted from device exports, tried in order after
/// RFC 3339. Naive timestamps are taken as UTC.
const EXPORT_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S %z", "%Y-%m-%d %H:%M:%S"];

/// Parse a device-export timestamp string.
///
/// Accepts RFC 3339 (`2024-01-01T00:00:00Z`) and the space-separated export
/// formats with or without a UTC offset. Returns `None` when nothing matches.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, EXPORT_TIMESTAMP_FORMATS[0]) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, EXPORT_TIMESTAMP_FORMATS[1]) {
        return Some(naive.and_utc());
    }
    None
}

fn de_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognized timestamp: '{raw}'")))
}

fn ser_timestamp<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&date.to_rfc3339())
}
