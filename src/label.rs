//! Churn label construction
//!
//! A user is retained when at least one of their events falls in the label
//! window `(observation_end, label_end]`, and churned otherwise.

use std::collections::BTreeSet;

use crate::types::{ChurnLabel, Event, LabeledAggregate, UserAggregate};
use crate::window::WindowBounds;

/// Constructor for binary churn labels
pub struct LabelConstructor;

impl LabelConstructor {
    /// Users with at least one event in the label window
    pub fn active_in_label_window<'a>(
        events: &'a [Event],
        bounds: &WindowBounds,
    ) -> BTreeSet<&'a str> {
        events
            .iter()
            .filter(|e| bounds.in_label(e.timestamp))
            .map(|e| e.user_id.as_str())
            .collect()
    }

    /// Label every aggregate; total over the input, order preserved
    pub fn label(
        aggregates: Vec<UserAggregate>,
        events: &[Event],
        bounds: &WindowBounds,
    ) -> Vec<LabeledAggregate> {
        let active_next = Self::active_in_label_window(events, bounds);

        aggregates
            .into_iter()
            .map(|aggregate| {
                let churn = if active_next.contains(aggregate.user_id.as_str()) {
                    ChurnLabel::Retained
                } else {
                    ChurnLabel::Churned
                };
                LabeledAggregate { aggregate, churn }
            })
            .collect()
    }
}
