use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for name-derived stream ids (UUIDv5).
const STREAM_NAMESPACE: Uuid = Uuid::from_u128(0x6f2c_1d7e_4b1a_4f5e_9a3c_2e8d_0b7f_5a61);

/// Unique identifier for an aggregate stream.
///
/// Wraps a UUID so stream ids cannot be mixed up with other UUID-based ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(Uuid);

impl AggregateId {
    /// Creates a new random aggregate ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Derives a stable id from a natural key.
    ///
    /// The same `(kind, name)` pair always yields the same id, so aggregates
    /// addressed by a business key (such as a promo code) map to one stream.
    pub fn from_name(kind: &str, name: &str) -> Self {
        Self(Uuid::new_v5(
            &STREAM_NAMESPACE,
            format!("{kind}:{name}").as_bytes(),
        ))
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AggregateId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AggregateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AggregateId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for AggregateId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}
