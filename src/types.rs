//! Core types for the churn feature pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: canonical events, user reference records, per-user aggregates and
//! the final labeled feature rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Event types recorded by the game backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    UserSignedUp,
    ProfileCompleted,
    FriendAdded,
    MatchStarted,
    MatchFinished,
    ZoneCaptured,
    SessionStatsRecorded,
    /// Types this crate does not know about; they still count as activity
    #[serde(untagged)]
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::UserSignedUp => "USER_SIGNED_UP",
            EventType::ProfileCompleted => "PROFILE_COMPLETED",
            EventType::FriendAdded => "FRIEND_ADDED",
            EventType::MatchStarted => "MATCH_STARTED",
            EventType::MatchFinished => "MATCH_FINISHED",
            EventType::ZoneCaptured => "ZONE_CAPTURED",
            EventType::SessionStatsRecorded => "SESSION_STATS_RECORDED",
            EventType::Other(name) => name.as_str(),
        }
    }

    /// Parse a wire name, keeping unknown names as `Other`
    pub fn from_wire(name: &str) -> Self {
        match name {
            "USER_SIGNED_UP" => EventType::UserSignedUp,
            "PROFILE_COMPLETED" => EventType::ProfileCompleted,
            "FRIEND_ADDED" => EventType::FriendAdded,
            "MATCH_STARTED" => EventType::MatchStarted,
            "MATCH_FINISHED" => EventType::MatchFinished,
            "ZONE_CAPTURED" => EventType::ZoneCaptured,
            "SESSION_STATS_RECORDED" => EventType::SessionStatsRecorded,
            other => EventType::Other(other.to_string()),
        }
    }

    /// Match lifecycle events count toward `matchesPlayed`
    pub fn is_match(&self) -> bool {
        matches!(self, EventType::MatchStarted | EventType::MatchFinished)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loosely typed payload value, as found in event `data` objects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    Null,
    Integer(i64),
    Number(f64),
    Text(String),
    Boolean(bool),
    Array(Vec<DataValue>),
    Object(BTreeMap<String, DataValue>),
}

impl DataValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DataValue::Integer(i) => Some(*i as f64),
            DataValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for DataValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => DataValue::Null,
            serde_json::Value::Bool(b) => DataValue::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => DataValue::Integer(i),
                None => n.as_f64().map(DataValue::Number).unwrap_or(DataValue::Null),
            },
            serde_json::Value::String(s) => DataValue::Text(s),
            serde_json::Value::Array(items) => {
                DataValue::Array(items.into_iter().map(DataValue::from).collect())
            }
            serde_json::Value::Object(map) => DataValue::Object(
                map.into_iter().map(|(k, v)| (k, DataValue::from(v))).collect(),
            ),
        }
    }
}

/// Event payload: field name to loosely typed value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventData(BTreeMap<String, DataValue>);

impl EventData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: DataValue) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&DataValue> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Numeric field accessor that never fails.
    ///
    /// Returns 0.0 when the field is absent, null, non-numeric, negative or
    /// not finite, so one bad payload cannot poison a sum.
    pub fn numeric(&self, key: &str) -> f64 {
        match self.0.get(key).and_then(DataValue::as_f64) {
            Some(v) if v.is_finite() && v >= 0.0 => v,
            _ => 0.0,
        }
    }
}

impl From<BTreeMap<String, DataValue>> for EventData {
    fn from(map: BTreeMap<String, DataValue>) -> Self {
        Self(map)
    }
}

/// Canonical, validated event. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub user_id: String,
    /// UTC-normalized timestamp
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    #[serde(default)]
    pub data: EventData,
}

impl Event {
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        event_type: EventType,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            timestamp,
            event_type,
            data: EventData::default(),
        }
    }

    pub fn with_data(mut self, data: EventData) -> Self {
        self.data = data;
        self
    }
}

/// Externally owned user reference record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friends_count: Option<u32>,
}

impl User {
    pub fn new(id: impl Into<String>, friends_count: Option<u32>) -> Self {
        Self {
            id: id.into(),
            friends_count,
        }
    }
}

/// Per-user reduction of the observation window, before labeling and join
#[derive(Debug, Clone, PartialEq)]
pub struct UserAggregate {
    pub user_id: String,
    pub active_days: u32,
    pub matches_played: u32,
    pub total_distance: f64,
    pub total_calories: f64,
    pub current_streak: u32,
    /// Provisional friend count: FRIEND_ADDED events seen in the window
    pub event_friends_count: u32,
}

/// Binary churn outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChurnLabel {
    /// At least one event in the label window
    Retained,
    /// No event in the label window
    Churned,
}

impl ChurnLabel {
    pub fn as_u8(self) -> u8 {
        match self {
            ChurnLabel::Retained => 0,
            ChurnLabel::Churned => 1,
        }
    }
}

/// Aggregate plus its churn label
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledAggregate {
    pub aggregate: UserAggregate,
    pub churn: ChurnLabel,
}

/// Output column names, in output order
pub const FEATURE_COLUMNS: [&str; 8] = [
    "userId",
    "activeDays",
    "matchesPlayed",
    "totalDistance",
    "totalCalories",
    "currentStreak",
    "friendsCount",
    "churn",
];

/// One row of the output feature table.
///
/// Field order matches [`FEATURE_COLUMNS`]; serializers rely on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRecord {
    pub user_id: String,
    pub active_days: u32,
    pub matches_played: u32,
    pub total_distance: f64,
    pub total_calories: f64,
    pub current_streak: u32,
    pub friends_count: u32,
    pub churn: u8,
}
