use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AggregateId;

/// Identifies one event across all streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of an event within its stream.
///
/// A stream with no events is at version 0; the first event is version 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Version of a stream that has never been written.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Version carried by the first event of a stream.
    pub fn first() -> Self {
        Self(1)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A persisted event together with its stream coordinates and metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: EventId,
    /// e.g. "OrderPlaced", "PromoCodeRedeemed".
    pub event_type: String,
    pub aggregate_id: AggregateId,
    /// e.g. "Order", "PromoCode".
    pub aggregate_type: String,
    /// Stream version after this event.
    pub version: Version,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
    /// Free-form context such as the acting principal.
    pub metadata: HashMap<String, serde_json::Value>,
    /// Position in the global log, assigned when the event is stored. Zero
    /// for an event not yet appended.
    #[serde(default)]
    pub position: u64,
}

impl EventEnvelope {
    /// A fresh event recorded now.
    pub fn new(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        version: Version,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            event_type: event_type.into(),
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            version,
            timestamp: Utc::now(),
            payload,
            metadata: HashMap::new(),
            position: 0,
        }
    }

    /// Serializes `event` as the payload.
    pub fn encode<E: Serialize>(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        version: Version,
        event_type: impl Into<String>,
        event: &E,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            aggregate_id,
            aggregate_type,
            version,
            event_type,
            serde_json::to_value(event)?,
        ))
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn recorded_at(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp = at;
        self
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn versions_start_at_zero_and_count_events() {
        assert_eq!(Version::initial().as_i64(), 0);
        assert_eq!(Version::initial().next(), Version::first());
        assert!(Version::new(2) < Version::new(3));
    }

    #[test]
    fn new_envelopes_get_fresh_ids_and_empty_metadata() {
        let aggregate_id = AggregateId::new();
        let a = EventEnvelope::new(
            aggregate_id,
            "Order",
            Version::first(),
            "OrderPlaced",
            serde_json::json!({"total": 1100}),
        );
        let b = a.clone().with_metadata("actor", serde_json::json!("admin"));

        assert_eq!(a.aggregate_id, aggregate_id);
        assert!(a.metadata.is_empty());
        assert_eq!(b.metadata_str("actor"), Some("admin"));
        assert_eq!(b.metadata_str("missing"), None);
        assert_ne!(
            a.event_id,
            EventEnvelope::new(aggregate_id, "Order", Version::first(), "X", serde_json::Value::Null)
                .event_id
        );
    }

    #[test]
    fn encode_serializes_the_event() {
        #[derive(Serialize)]
        struct CashCollected {
            collected_by: &'static str,
        }

        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let envelope = EventEnvelope::encode(
            AggregateId::new(),
            "Order",
            Version::new(4),
            "CashCollected",
            &CashCollected { collected_by: "rider-7" },
        )
        .unwrap()
        .recorded_at(at);

        assert_eq!(envelope.payload["collected_by"], "rider-7");
        assert_eq!(envelope.timestamp, at);
    }
}
