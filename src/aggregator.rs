//! Per-user aggregation over the observation window
//!
//! Events are grouped by user into time-ordered sequences, then each group is
//! reduced independently:
//! - Distinct active calendar dates (UTC)
//! - Match lifecycle events
//! - Distance and calorie sums from the event payload
//! - FRIEND_ADDED count (provisional friend count)
//! - Current streak ending at the window end date

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::streak::current_streak;
use crate::types::{Event, EventType, UserAggregate};
use crate::window::WindowBounds;

/// Payload field summed into `totalDistance`
pub const DISTANCE_FIELD: &str = "distance";

/// Payload field summed into `totalCalories`
pub const CALORIES_FIELD: &str = "calories";

/// Aggregator producing one [`UserAggregate`] per user seen in the window
pub struct UserAggregator;

impl UserAggregator {
    /// Aggregate every user with at least one event in the observation window.
    ///
    /// Users without qualifying events produce no aggregate. Output is ordered
    /// by user id.
    pub fn aggregate(events: &[Event], bounds: &WindowBounds) -> Vec<UserAggregate> {
        let in_window = events.iter().filter(|e| bounds.in_observation(e.timestamp));
        let end_date = bounds.end_date();

        group_by_user(in_window)
            .into_iter()
            .map(|(user_id, group)| aggregate_user(user_id, &group, end_date))
            .collect()
    }
}

/// Group events by user id, each group sorted by (timestamp, event id)
pub fn group_by_user<'a>(
    events: impl IntoIterator<Item = &'a Event>,
) -> BTreeMap<&'a str, Vec<&'a Event>> {
    let mut groups: BTreeMap<&str, Vec<&Event>> = BTreeMap::new();
    for event in events {
        groups.entry(event.user_id.as_str()).or_default().push(event);
    }
    for group in groups.values_mut() {
        group.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
    }
    groups
}

/// Reduce one user's window events into an aggregate
pub fn aggregate_user(user_id: &str, events: &[&Event], end_date: NaiveDate) -> UserAggregate {
    let active_dates: BTreeSet<NaiveDate> =
        events.iter().map(|e| e.timestamp.date_naive()).collect();

    let mut matches_played = 0u32;
    let mut event_friends_count = 0u32;
    let mut total_distance = 0.0;
    let mut total_calories = 0.0;

    for event in events {
        if event.event_type.is_match() {
            matches_played += 1;
        }
        if event.event_type == EventType::FriendAdded {
            event_friends_count += 1;
        }
        total_distance += event.data.numeric(DISTANCE_FIELD);
        total_calories += event.data.numeric(CALORIES_FIELD);
    }

    UserAggregate {
        user_id: user_id.to_string(),
        active_days: active_dates.len() as u32,
        matches_played,
        total_distance,
        total_calories,
        current_streak: current_streak(&active_dates, end_date),
        event_friends_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::types::{DataValue, EventData};
    use chrono::{DateTime, TimeZone, Utc};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    fn event(id: &str, user: &str, ts: DateTime<Utc>, kind: EventType) -> Event {
        Event::new(id, user, ts, kind)
    }

    fn stats(id: &str, user: &str, ts: DateTime<Utc>, distance: f64, calories: f64) -> Event {
        event(id, user, ts, EventType::SessionStatsRecorded).with_data(
            EventData::new()
                .with("distance", DataValue::Number(distance))
                .with("calories", DataValue::Number(calories)),
        )
    }

    fn bounds() -> WindowBounds {
        WindowBounds::around(at(10, 20), &PipelineConfig::default())
    }

    #[test]
    fn test_counts_and_sums() {
        let events = vec![
            event("1", "u1", at(8, 9), EventType::MatchStarted),
            event("2", "u1", at(8, 10), EventType::MatchFinished),
            stats("3", "u1", at(9, 11), 1500.0, 120.0),
            stats("4", "u1", at(10, 8), 500.5, 30.0),
            event("5", "u1", at(10, 9), EventType::FriendAdded),
            event("6", "u1", at(10, 9), EventType::FriendAdded),
            event("7", "u1", at(10, 12), EventType::ZoneCaptured),
        ];

        let aggregates = UserAggregator::aggregate(&events, &bounds());
        assert_eq!(aggregates.len(), 1);

        let agg = &aggregates[0];
        assert_eq!(agg.user_id, "u1");
        assert_eq!(agg.active_days, 3);
        assert_eq!(agg.matches_played, 2);
        assert!((agg.total_distance - 2000.5).abs() < 1e-9);
        assert!((agg.total_calories - 150.0).abs() < 1e-9);
        assert_eq!(agg.event_friends_count, 2);
        assert_eq!(agg.current_streak, 3);
    }

    #[test]
    fn test_events_outside_window_ignored() {
        let events = vec![
            event("old", "u1", at(1, 9), EventType::MatchStarted),
            event("future", "u1", at(11, 9), EventType::MatchStarted),
            event("future", "u2", at(12, 9), EventType::MatchStarted),
            event("in", "u1", at(10, 9), EventType::ZoneCaptured),
        ];

        let aggregates = UserAggregator::aggregate(&events, &bounds());
        assert_eq!(aggregates.len(), 1);
        assert_eq!(aggregates[0].matches_played, 0);
        assert_eq!(aggregates[0].active_days, 1);
    }

    #[test]
    fn test_malformed_payload_contributes_zero() {
        let bad = event("bad", "u1", at(10, 9), EventType::SessionStatsRecorded).with_data(
            EventData::new()
                .with("distance", DataValue::Text("far".to_string()))
                .with("calories", DataValue::Null),
        );
        let events = vec![
            bad,
            event("bare", "u1", at(10, 10), EventType::SessionStatsRecorded),
            stats("ok", "u2", at(10, 9), 300.0, 25.0),
        ];

        let aggregates = UserAggregator::aggregate(&events, &bounds());
        assert_eq!(aggregates[0].user_id, "u1");
        assert_eq!(aggregates[0].total_distance, 0.0);
        assert_eq!(aggregates[0].total_calories, 0.0);
        assert_eq!(aggregates[1].total_distance, 300.0);
        assert_eq!(aggregates[1].total_calories, 25.0);
    }

    #[test]
    fn test_output_sorted_and_order_independent() {
        let mut events = vec![
            stats("a", "zed", at(9, 9), 0.1, 0.2),
            stats("b", "amy", at(10, 9), 0.3, 0.4),
            stats("c", "zed", at(10, 9), 0.7, 0.8),
            stats("d", "amy", at(8, 9), 0.5, 0.6),
        ];

        let forward = UserAggregator::aggregate(&events, &bounds());
        events.reverse();
        let backward = UserAggregator::aggregate(&events, &bounds());

        assert_eq!(forward, backward);
        let ids: Vec<_> = forward.iter().map(|a| a.user_id.as_str()).collect();
        assert_eq!(ids, vec!["amy", "zed"]);
    }

    #[test]
    fn test_group_by_user_orders_events() {
        let events = vec![
            event("2", "u1", at(9, 9), EventType::ZoneCaptured),
            event("1", "u1", at(9, 9), EventType::ZoneCaptured),
            event("0", "u1", at(8, 9), EventType::ZoneCaptured),
        ];
        let groups = group_by_user(&events);
        let ids: Vec<_> = groups["u1"].iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["0", "1", "2"]);
    }
}
