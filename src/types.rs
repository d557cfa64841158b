//! Core types for the synchronization core.

use crate::config::SectionSpec;
use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Name of a section (a bounded, ordered partition of records).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionId(pub String);

impl SectionId {
    pub fn new(name: impl Into<String>) -> Self {
        SectionId(name.into())
    }
}

impl From<&str> for SectionId {
    fn from(s: &str) -> Self {
        SectionId(s.to_string())
    }
}

/// Logical feed a subscription is opened for.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(pub String);

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Topic(name.into())
    }
}

/// Composite identity of one real-world entity within a section.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(pub String);

impl From<&str> for EntityKey {
    fn from(s: &str) -> Self {
        EntityKey(s.to_string())
    }
}

macro_rules! display_inner {
    ($($ty:ty),*) => {$(
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    )*};
}

display_inner!(SectionId, Topic, EntityKey);

/// Identifier of one live subscription handle. Never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HandleId(pub u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current wall-clock time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or_default();
        Timestamp(micros)
    }
}

/// Ordering field of a record, in milliseconds.
///
/// Totally ordered; missing or unparseable values collapse to [`OrderStamp::MIN`]
/// so they sort last and are evicted first.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct OrderStamp(pub f64);

impl OrderStamp {
    pub const MIN: OrderStamp = OrderStamp(f64::NEG_INFINITY);

    /// Parse an ordering field: JSON number, numeric string, or RFC 3339 string.
    pub fn parse(value: Option<&Value>) -> Self {
        let ms = match value {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok().or_else(|| {
                chrono::DateTime::parse_from_rfc3339(s.trim())
                    .ok()
                    .map(|dt| dt.timestamp_millis() as f64)
            }),
            _ => None,
        };
        match ms {
            Some(ms) if ms.is_finite() => OrderStamp(ms),
            _ => Self::MIN,
        }
    }

    pub fn is_min(self) -> bool {
        self == Self::MIN
    }

    /// True when both stamps describe the same logical moment.
    pub fn within(self, other: OrderStamp, epsilon_ms: f64) -> bool {
        self == other || (self.0 - other.0).abs() < epsilon_ms
    }
}

impl PartialEq for OrderStamp {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrderStamp {}

impl PartialOrd for OrderStamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderStamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// One entity in a section: identity, ordering stamp and a schemaless payload.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EntityRecord {
    pub key: EntityKey,
    pub stamp: OrderStamp,
    pub fields: Map<String, Value>,
}

impl EntityRecord {
    /// Build a record from a JSON object using the section's field layout.
    ///
    /// Fails only when the value is not an object or carries none of the
    /// identity fields. A missing ordering field yields `OrderStamp::MIN`.
    pub fn from_value(spec: &SectionSpec, value: Value) -> Result<Self> {
        let Value::Object(fields) = value else {
            return Err(SyncError::MalformedRecord(format!(
                "expected object in section {}",
                spec.id
            )));
        };

        let parts: Vec<Option<String>> = spec
            .identity_fields
            .iter()
            .map(|name| match fields.get(name) {
                Some(Value::String(s)) => Some(s.clone()),
                Some(v @ (Value::Number(_) | Value::Bool(_))) => Some(v.to_string()),
                _ => None,
            })
            .collect();
        if parts.iter().all(Option::is_none) {
            return Err(SyncError::MalformedRecord(format!(
                "record in section {} has none of {:?}",
                spec.id, spec.identity_fields
            )));
        }

        let key = EntityKey(
            parts
                .into_iter()
                .map(Option::unwrap_or_default)
                .collect::<Vec<_>>()
                .join(":"),
        );
        let stamp = OrderStamp::parse(fields.get(&spec.ordering_field));
        Ok(Self { key, stamp, fields })
    }

    /// Shallow merge: incoming fields overwrite existing ones.
    pub fn merge_from(&mut self, incoming: EntityRecord, spec: &SectionSpec) {
        self.fields.extend(incoming.fields);
        self.stamp = OrderStamp::parse(self.fields.get(&spec.ordering_field));
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }
}
