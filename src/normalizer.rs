//! Event normalization
//!
//! Turns loosely typed raw records into canonical [`Event`]s and [`User`]s.
//! - Timestamps parsed and converted to UTC
//! - Event types mapped to [`EventType`]
//! - Payloads converted to typed [`EventData`]
//! - Unusable records rejected and reported, never fatal

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::types::{DataValue, Event, EventData, EventType, User};

/// Naive timestamp layouts accepted in addition to RFC 3339; interpreted as UTC
const NAIVE_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Event record as produced by the event store, before validation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEventRecord {
    #[serde(default)]
    pub id: Value,
    #[serde(default, alias = "user_id")]
    pub user_id: Value,
    #[serde(default)]
    pub timestamp: Value,
    #[serde(default, alias = "event_type")]
    pub event_type: Value,
    #[serde(default)]
    pub data: Value,
}

/// User record as produced by the user store, before validation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawUserRecord {
    #[serde(default)]
    pub id: Value,
    #[serde(default, alias = "friends_count")]
    pub friends_count: Value,
}

/// Why a raw event was dropped
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("missing or empty userId")]
    MissingUserId,

    #[error("missing timestamp")]
    MissingTimestamp,

    #[error("unparseable timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("missing or empty eventType")]
    MissingEventType,
}

/// A rejected raw event and where it sat in the input
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedEvent {
    pub index: usize,
    pub event_id: Option<String>,
    #[serde(serialize_with = "serialize_reason")]
    pub reason: RejectReason,
}

fn serialize_reason<S: serde::Serializer>(reason: &RejectReason, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&reason.to_string())
}

/// Outcome counts for one normalization pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizationReport {
    pub total: usize,
    pub accepted: usize,
    pub rejected: Vec<RejectedEvent>,
}

impl NormalizationReport {
    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }
}

/// Canonical events plus the report describing what was dropped
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub events: Vec<Event>,
    pub report: NormalizationReport,
}

/// Normalizer for raw event and user records
pub struct EventNormalizer;

impl EventNormalizer {
    /// Normalize a batch of raw events, preserving input order
    pub fn normalize(records: &[RawEventRecord]) -> NormalizedBatch {
        let mut events = Vec::with_capacity(records.len());
        let mut rejected = Vec::new();

        for (index, record) in records.iter().enumerate() {
            match normalize_event(index, record) {
                Ok(event) => events.push(event),
                Err(reason) => {
                    let event_id = non_empty_str(&record.id).map(str::to_string);
                    warn!(
                        component = "normalizer",
                        event = "event.rejected",
                        index,
                        event_id = event_id.as_deref().unwrap_or("unknown"),
                        reason = %reason
                    );
                    rejected.push(RejectedEvent {
                        index,
                        event_id,
                        reason,
                    });
                }
            }
        }

        let report = NormalizationReport {
            total: records.len(),
            accepted: events.len(),
            rejected,
        };

        NormalizedBatch { events, report }
    }

    /// Normalize user records, skipping those without an id
    pub fn normalize_users(records: &[RawUserRecord]) -> Vec<User> {
        records
            .iter()
            .filter_map(|record| {
                let id = non_empty_str(&record.id)?;
                Some(User::new(id, parse_friends_count(&record.friends_count)))
            })
            .collect()
    }
}

fn normalize_event(index: usize, record: &RawEventRecord) -> Result<Event, RejectReason> {
    let user_id = non_empty_str(&record.user_id).ok_or(RejectReason::MissingUserId)?;
    let timestamp = parse_timestamp(&record.timestamp)?;
    let event_type = non_empty_str(&record.event_type)
        .map(EventType::from_wire)
        .ok_or(RejectReason::MissingEventType)?;

    let id = non_empty_str(&record.id)
        .map(str::to_string)
        .unwrap_or_else(|| format!("event-{index}"));

    Ok(Event::new(id, user_id, timestamp, event_type).with_data(parse_data(&record.data)))
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim).filter(|s| !s.is_empty())
}

/// Parse a timestamp field into UTC
///
/// Accepts RFC 3339 strings, naive ISO-8601 date-times (as UTC) and integer
/// epoch milliseconds.
pub fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>, RejectReason> {
    match value {
        Value::Null => Err(RejectReason::MissingTimestamp),
        Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Err(RejectReason::MissingTimestamp);
            }
            parse_timestamp_str(trimmed).ok_or_else(|| RejectReason::InvalidTimestamp(raw.clone()))
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .ok_or_else(|| RejectReason::InvalidTimestamp(n.to_string())),
        other => Err(RejectReason::InvalidTimestamp(other.to_string())),
    }
}

fn parse_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Object payloads become typed data; anything else is an empty payload
fn parse_data(value: &Value) -> EventData {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| (k.clone(), DataValue::from(v.clone())))
            .collect::<std::collections::BTreeMap<_, _>>()
            .into(),
        _ => EventData::default(),
    }
}

/// Friend counts must be non-negative integers; integral floats are accepted
fn parse_friends_count(value: &Value) -> Option<u32> {
    let Value::Number(n) = value else {
        return None;
    };
    if let Some(u) = n.as_u64() {
        return u32::try_from(u).ok();
    }
    let f = n.as_f64()?;
    if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64 {
        Some(f as u32)
    } else {
        None
    }
}
