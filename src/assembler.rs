//! Feature table assembly and output encoding
//!
//! Joins labeled aggregates with the external user table, resolves the
//! friend count by precedence and writes the table with a fixed schema.

use std::collections::BTreeMap;
use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::types::{ChurnLabel, FeatureRecord, LabeledAggregate, User, FEATURE_COLUMNS};
use crate::window::WindowBounds;

/// Output encodings for a feature table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableFormat {
    /// Delimited text with a header row
    Csv,
    /// One JSON object per row
    Ndjson,
    /// JSON array of rows
    Json,
}

/// Final labeled feature table, rows ordered by user id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    rows: Vec<FeatureRecord>,
}

impl FeatureTable {
    pub fn rows(&self) -> &[FeatureRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, user_id: &str) -> Option<&FeatureRecord> {
        self.rows
            .binary_search_by(|row| row.user_id.as_str().cmp(user_id))
            .ok()
            .map(|idx| &self.rows[idx])
    }

    /// Write as CSV. The header row is written even when the table is empty.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), PipelineError> {
        let mut csv_writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        csv_writer.write_record(FEATURE_COLUMNS)?;
        for row in &self.rows {
            csv_writer.serialize(row)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn write_ndjson<W: Write>(&self, mut writer: W) -> Result<(), PipelineError> {
        for row in &self.rows {
            serde_json::to_writer(&mut writer, row)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write_json<W: Write>(&self, mut writer: W) -> Result<(), PipelineError> {
        serde_json::to_writer(&mut writer, &self.rows)?;
        writer.flush()?;
        Ok(())
    }

    pub fn write<W: Write>(&self, format: TableFormat, writer: W) -> Result<(), PipelineError> {
        match format {
            TableFormat::Csv => self.write_csv(writer),
            TableFormat::Ndjson => self.write_ndjson(writer),
            TableFormat::Json => self.write_json(writer),
        }
    }
}

/// Assembler joining labeled aggregates with user reference data
pub struct FeatureTableAssembler;

impl FeatureTableAssembler {
    /// Left-join aggregates to users on user id and emit the final rows
    pub fn assemble(labeled: Vec<LabeledAggregate>, users: &[User]) -> FeatureTable {
        let external = external_friend_counts(users);

        let mut rows: Vec<FeatureRecord> = labeled
            .into_iter()
            .map(|LabeledAggregate { aggregate, churn }| {
                let friends_count = resolve_friends_count(
                    external.get(aggregate.user_id.as_str()).copied(),
                    Some(aggregate.event_friends_count),
                );
                FeatureRecord {
                    user_id: aggregate.user_id,
                    active_days: aggregate.active_days,
                    matches_played: aggregate.matches_played,
                    total_distance: aggregate.total_distance,
                    total_calories: aggregate.total_calories,
                    current_streak: aggregate.current_streak,
                    friends_count,
                    churn: churn.as_u8(),
                }
            })
            .collect();

        rows.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        FeatureTable { rows }
    }
}

/// Friend count precedence: external record, then event-derived, then 0
pub fn resolve_friends_count(external: Option<u32>, event_derived: Option<u32>) -> u32 {
    external.or(event_derived).unwrap_or(0)
}

/// Usable external friend counts by user id; the first record with a value wins
fn external_friend_counts(users: &[User]) -> BTreeMap<&str, u32> {
    let mut counts = BTreeMap::new();
    for user in users {
        if let Some(count) = user.friends_count {
            counts.entry(user.id.as_str()).or_insert(count);
        }
    }
    counts
}

/// Class balance and window of an assembled table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub rows: usize,
    pub churned: usize,
    pub retained: usize,
    /// Churned share of rows; 0.0 for an empty table
    pub churn_rate: f64,
    pub window: WindowBounds,
}

impl DatasetSummary {
    pub fn from_table(table: &FeatureTable, window: WindowBounds) -> Self {
        let churned = table
            .rows()
            .iter()
            .filter(|row| row.churn == ChurnLabel::Churned.as_u8())
            .count();
        let rows = table.len();
        let churn_rate = if rows > 0 {
            churned as f64 / rows as f64
        } else {
            0.0
        };

        Self {
            rows,
            churned,
            retained: rows - churned,
            churn_rate,
            window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::types::UserAggregate;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn labeled(user_id: &str, friends: u32, churn: ChurnLabel) -> LabeledAggregate {
        LabeledAggregate {
            aggregate: UserAggregate {
                user_id: user_id.to_string(),
                active_days: 2,
                matches_played: 1,
                total_distance: 1500.25,
                total_calories: 110.0,
                current_streak: 1,
                event_friends_count: friends,
            },
            churn,
        }
    }

    #[test]
    fn test_friends_precedence() {
        let users = vec![User::new("u1", Some(7)), User::new("u2", None)];
        let table = FeatureTableAssembler::assemble(
            vec![
                labeled("u1", 3, ChurnLabel::Retained),
                labeled("u2", 3, ChurnLabel::Retained),
                labeled("u3", 3, ChurnLabel::Churned),
            ],
            &users,
        );

        assert_eq!(table.get("u1").unwrap().friends_count, 7);
        assert_eq!(table.get("u2").unwrap().friends_count, 3);
        assert_eq!(table.get("u3").unwrap().friends_count, 3);
    }

    #[test]
    fn test_resolve_friends_count() {
        assert_eq!(resolve_friends_count(Some(7), Some(3)), 7);
        assert_eq!(resolve_friends_count(None, Some(3)), 3);
        assert_eq!(resolve_friends_count(None, None), 0);
        assert_eq!(resolve_friends_count(Some(0), Some(3)), 0);
    }

    #[test]
    fn test_duplicate_users_first_value_wins() {
        let users = vec![
            User::new("u1", None),
            User::new("u1", Some(5)),
            User::new("u1", Some(9)),
        ];
        let table =
            FeatureTableAssembler::assemble(vec![labeled("u1", 1, ChurnLabel::Churned)], &users);
        assert_eq!(table.rows()[0].friends_count, 5);
    }

    #[test]
    fn test_csv_layout() {
        let table = FeatureTableAssembler::assemble(
            vec![
                labeled("u2", 0, ChurnLabel::Churned),
                labeled("u1", 2, ChurnLabel::Retained),
            ],
            &[],
        );

        let mut buf = Vec::new();
        table.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert_eq!(
            text,
            "userId,activeDays,matchesPlayed,totalDistance,totalCalories,currentStreak,friendsCount,churn\n\
             u1,2,1,1500.25,110.0,1,2,0\n\
             u2,2,1,1500.25,110.0,1,0,1\n"
        );
    }

    #[test]
    fn test_empty_table_still_has_header() {
        let table = FeatureTable::default();
        let mut buf = Vec::new();
        table.write_csv(&mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            format!("{}\n", FEATURE_COLUMNS.join(","))
        );

        let mut buf = Vec::new();
        table.write(TableFormat::Json, &mut buf).unwrap();
        assert_eq!(buf, b"[]");
    }

    #[test]
    fn test_ndjson_field_names() {
        let table =
            FeatureTableAssembler::assemble(vec![labeled("u1", 0, ChurnLabel::Churned)], &[]);
        let mut buf = Vec::new();
        table.write_ndjson(&mut buf).unwrap();

        let line: serde_json::Value =
            serde_json::from_str(String::from_utf8(buf).unwrap().trim()).unwrap();
        let keys: Vec<_> = line.as_object().unwrap().keys().cloned().collect();
        let mut expected: Vec<String> = FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect();
        expected.sort();
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_summary() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let window = WindowBounds::around(now, &PipelineConfig::default());
        let table = FeatureTableAssembler::assemble(
            vec![
                labeled("a", 0, ChurnLabel::Churned),
                labeled("b", 0, ChurnLabel::Retained),
                labeled("c", 0, ChurnLabel::Retained),
                labeled("d", 0, ChurnLabel::Retained),
            ],
            &[],
        );

        let summary = DatasetSummary::from_table(&table, window);
        assert_eq!(summary.rows, 4);
        assert_eq!(summary.churned, 1);
        assert_eq!(summary.retained, 3);
        assert_eq!(summary.churn_rate, 0.25);

        let empty = DatasetSummary::from_table(&FeatureTable::default(), window);
        assert_eq!(empty.rows, 0);
        assert_eq!(empty.churn_rate, 0.0);
    }
}
