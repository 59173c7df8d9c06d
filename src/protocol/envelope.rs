//! Canonical message envelope and its wire codec
//!
//! Every event crossing the bus is wrapped in a [`MessageEnvelope`] before
//! transmission. The codec is pure: building and parsing never touch I/O and
//! never mutate their inputs.
//!
//! # Examples
//! ```
//! use interbus::protocol::{EventType, MessageEnvelope};
//! use chrono::Utc;
//! use serde_json::json;
//! use uuid::Uuid;
//!
//! let envelope = MessageEnvelope::new(
//!     Uuid::new_v4(),
//!     "billing.invoices",
//!     Utc::now(),
//!     "trace-7f3a",
//!     "req-0091",
//!     EventType::EventLog,
//!     json!({"invoice_id": 42, "state": "issued"}),
//! );
//!
//! let wire = envelope.encode().unwrap();
//! let parsed = MessageEnvelope::decode(&wire).unwrap();
//! assert_eq!(parsed.base_log_id, envelope.base_log_id);
//! ```

use crate::error::{BusError, BusResult};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Reserved wire key carrying the schema version.
pub const SCHEMA_VERSION_KEY: &str = "_schema_version";

/// Current envelope schema version.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Closed enumeration of routable event kinds.
///
/// Consumers filter on this field, so unknown values are rejected at the
/// codec boundary rather than leaking downstream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PromptTrace,
    EventLog,
}

impl EventType {
    /// Wire name for this event type (also used in channel routing)
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PromptTrace => "prompt_trace",
            EventType::EventLog => "event_log",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prompt_trace" => Ok(EventType::PromptTrace),
            "event_log" => Ok(EventType::EventLog),
            other => Err(BusError::validation(format!(
                "unrecognized event_type: {other}"
            ))),
        }
    }
}

/// The unit of transmission on the bus
///
/// Immutable once built. Field order here is the canonical wire order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageEnvelope {
    /// Unique identifier of the originating record, assigned by the producer
    pub base_log_id: Uuid,
    /// Dotted identifier of the producing component
    pub source_module: String,
    /// Event time, UTC, rendered with microsecond precision and a `Z` suffix
    #[serde(with = "wire_timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Producer-supplied correlation string - the codec never generates these
    pub trace_id: String,
    /// Producer-supplied correlation string - the codec never generates these
    pub request_id: String,
    /// Routing/filtering discriminator
    pub event_type: EventType,
    /// Opaque domain payload, round-tripped untouched
    pub data: Value,
    /// Schema tag under a reserved key; the legacy alias is accepted on parse
    #[serde(
        rename = "_schema_version",
        alias = "schema_version",
        default = "default_schema_version"
    )]
    pub schema_version: u32,
}

fn default_schema_version() -> u32 {
    CURRENT_SCHEMA_VERSION
}

impl MessageEnvelope {
    /// Construct an envelope, normalizing the timestamp to UTC.
    ///
    /// Correlation fields are stored as given; validation happens at encode
    /// time so a half-built envelope can still be inspected in tests/logs.
    pub fn new<Tz: TimeZone>(
        base_log_id: Uuid,
        source_module: impl Into<String>,
        timestamp: DateTime<Tz>,
        trace_id: impl Into<String>,
        request_id: impl Into<String>,
        event_type: EventType,
        data: Value,
    ) -> Self {
        Self {
            base_log_id,
            source_module: source_module.into(),
            timestamp: timestamp.with_timezone(&Utc),
            trace_id: trace_id.into(),
            request_id: request_id.into(),
            event_type,
            data,
            schema_version: CURRENT_SCHEMA_VERSION,
        }
    }

    /// Serialize to wire bytes using the default (fast-path) strategy.
    pub fn encode(&self) -> BusResult<Vec<u8>> {
        self.encode_with(EncoderStrategy::Compact)
    }

    /// Serialize to wire bytes with an explicit strategy.
    ///
    /// Both strategies produce identical bytes for identical input; the
    /// fallback exists so the fast path can be audited against it.
    pub fn encode_with(&self, strategy: EncoderStrategy) -> BusResult<Vec<u8>> {
        self.validate()?;
        let bytes = match strategy {
            EncoderStrategy::Compact => serde_json::to_vec(self)
                .map_err(|e| BusError::validation(format!("envelope serialization failed: {e}")))?,
            EncoderStrategy::Canonical => {
                // Relies on serde_json's preserve_order: the intermediate
                // map keeps insertion order, so field order matches the
                // fast path byte-for-byte.
                let value = serde_json::to_value(self)
                    .map_err(|e| BusError::validation(format!("envelope serialization failed: {e}")))?;
                serde_json::to_vec(&value)
                    .map_err(|e| BusError::validation(format!("envelope serialization failed: {e}")))?
            }
        };
        Ok(bytes)
    }

    /// Parse an envelope from a raw broker payload.
    ///
    /// Accepts text or binary input transparently; the input is never
    /// mutated. Malformed JSON, missing required fields, and unrecognized
    /// `event_type` values all surface as [`BusError::Validation`].
    pub fn decode(payload: impl AsRef<[u8]>) -> BusResult<Self> {
        serde_json::from_slice(payload.as_ref())
            .map_err(|e| BusError::validation(format!("envelope parse failed: {e}")))
    }

    /// Enforce the constraints the wire format requires of producers.
    fn validate(&self) -> BusResult<()> {
        if self.source_module.trim().is_empty() {
            return Err(BusError::validation("source_module must be non-empty"));
        }
        if self.trace_id.trim().is_empty() {
            return Err(BusError::validation("trace_id must be non-empty"));
        }
        if self.request_id.trim().is_empty() {
            return Err(BusError::validation("request_id must be non-empty"));
        }
        Ok(())
    }
}

/// Wire serializer selection, fixed once at startup.
///
/// The strategy is detected/configured exactly once and carried as a value;
/// nothing probes serializer availability on the per-call path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EncoderStrategy {
    /// Direct struct-to-bytes serialization (fast path)
    #[default]
    Compact,
    /// Serialization through an intermediate JSON value (audit fallback)
    Canonical,
}

impl EncoderStrategy {
    /// Select the serializer strategy for this process.
    ///
    /// serde_json is always present so the fast path always wins; the
    /// function exists as the single configuration point for the choice.
    pub fn detect() -> Self {
        EncoderStrategy::Compact
    }
}

/// RFC3339 with exactly microsecond precision and a literal `Z` suffix.
mod wire_timestamp {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

    pub fn serialize<S>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&timestamp.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
