//! Pipeline orchestration
//!
//! This module provides the public API for building a churn feature table.
//! Stages run strictly in order:
//! 1. EventNormalizer - Validate raw records into canonical events
//! 2. WindowBounds - Select observation and label windows once per run
//! 3. UserAggregator - Reduce each user's window events (with streak)
//! 4. LabelConstructor - Label each aggregate from label-window presence
//! 5. FeatureTableAssembler - Join user attributes and emit the table

use chrono::{DateTime, Utc};

use crate::aggregator::UserAggregator;
use crate::assembler::{DatasetSummary, FeatureTable, FeatureTableAssembler};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::label::LabelConstructor;
use crate::normalizer::{EventNormalizer, NormalizationReport};
use crate::observability::{
    log_events_normalized, log_pipeline_start, log_source_failed, log_source_fetched,
    log_table_assembled, log_window_selected,
};
use crate::source::{EventSource, UserSource};
use crate::types::{Event, User};
use crate::window::WindowBounds;

/// Build the labeled feature table from canonical events and users.
///
/// Pure and deterministic: identical `(events, users, now, config)` inputs
/// always produce identical tables. An empty observation window yields an
/// empty table.
///
/// # Example
/// ```ignore
/// let table = build_feature_table(&events, &users, Utc::now(), &PipelineConfig::default());
/// ```
pub fn build_feature_table(
    events: &[Event],
    users: &[User],
    now: DateTime<Utc>,
    config: &PipelineConfig,
) -> FeatureTable {
    let bounds = WindowBounds::around(now, config);
    build_with_bounds(events, users, &bounds)
}

fn build_with_bounds(events: &[Event], users: &[User], bounds: &WindowBounds) -> FeatureTable {
    let aggregates = UserAggregator::aggregate(events, bounds);
    if aggregates.is_empty() {
        return FeatureTable::default();
    }

    let labeled = LabelConstructor::label(aggregates, events, bounds);
    FeatureTableAssembler::assemble(labeled, users)
}

fn fetched<T>(
    source: &str,
    result: Result<Vec<T>, PipelineError>,
) -> Result<Vec<T>, PipelineError> {
    match result {
        Ok(records) => {
            log_source_fetched(source, records.len());
            Ok(records)
        }
        Err(err) => {
            log_source_failed(source, &err);
            Err(err)
        }
    }
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub table: FeatureTable,
    pub summary: DatasetSummary,
    pub normalization: NormalizationReport,
}

/// Pipeline bound to a validated configuration
#[derive(Debug, Clone)]
pub struct ChurnPipeline {
    config: PipelineConfig,
}

impl ChurnPipeline {
    /// Create a pipeline, rejecting invalid configuration up front
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fetch both sources once, then normalize, build and summarize.
    ///
    /// Source failures abort the run. Record-level problems are absorbed and
    /// reported in [`PipelineOutput::normalization`].
    pub fn run(
        &self,
        events_source: &dyn EventSource,
        users_source: &dyn UserSource,
        now: DateTime<Utc>,
    ) -> Result<PipelineOutput, PipelineError> {
        log_pipeline_start(&self.config, now);

        let raw_events = fetched(events_source.name(), events_source.fetch_events())?;
        let raw_users = fetched(users_source.name(), users_source.fetch_users())?;

        let batch = EventNormalizer::normalize(&raw_events);
        log_events_normalized(&batch.report);
        let users = EventNormalizer::normalize_users(&raw_users);

        Ok(self.process(&batch.events, &users, now, batch.report))
    }

    /// Run on already-canonical events
    pub fn run_events(&self, events: &[Event], users: &[User], now: DateTime<Utc>) -> PipelineOutput {
        log_pipeline_start(&self.config, now);
        let report = NormalizationReport {
            total: events.len(),
            accepted: events.len(),
            rejected: Vec::new(),
        };
        self.process(events, users, now, report)
    }

    fn process(
        &self,
        events: &[Event],
        users: &[User],
        now: DateTime<Utc>,
        normalization: NormalizationReport,
    ) -> PipelineOutput {
        let bounds = WindowBounds::around(now, &self.config);
        log_window_selected(&bounds);

        let table = build_with_bounds(events, users, &bounds);
        let summary = DatasetSummary::from_table(&table, bounds);
        log_table_assembled(&summary);

        PipelineOutput {
            table,
            summary,
            normalization,
        }
    }
}
