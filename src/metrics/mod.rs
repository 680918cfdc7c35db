//! Metric Domain Layer
//!
//! Normalization of raw device payloads into canonical per-type records:
//!
//! - [`registry`]: metric-type identifier → canonical schema lookup
//! - [`mapper`]: raw ingestion records → canonical rows + drop accounting
//! - [`types`]: the canonical record variants and timestamp parsing

pub mod mapper;
pub mod registry;
pub mod types;

pub use mapper::{IngestBatch, MapError, MappedRecord, RawMetricPayload, map};
pub use registry::{KNOWN_KINDS, MetricSchema, schema_for};
pub use types::{
    BloodPressureRecord, GenericRecord, HeartRateRecord, MetricKind, MetricRecord, MetricRow,
    SleepRecord, parse_timestamp,
};
