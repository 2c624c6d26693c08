//! Logging configuration, initialization and pipeline log events.
//!
//! Every event carries a `component` and a dotted `event` name so JSON logs
//! can be filtered per pipeline stage.

use std::env;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::assembler::DatasetSummary;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::normalizer::NormalizationReport;
use crate::window::WindowBounds;

pub const LOG_LEVEL_ENV: &str = "CHURN_LOG_LEVEL";
pub const LOG_FORMAT_ENV: &str = "CHURN_LOG_FORMAT";
pub const LOG_TARGET_ENV: &str = "CHURN_LOG_TARGET";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Subscriber settings for the CLI. Library callers install their own subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `churn_flux=debug`
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overlaid with whichever `CHURN_LOG_*` values `lookup` yields.
    /// Unparseable values keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(level) = lookup(LOG_LEVEL_ENV) {
            let trimmed = level.trim();
            if !trimmed.is_empty() {
                config.level = trimmed.to_string();
            }
        }
        if let Some(format) = lookup(LOG_FORMAT_ENV).as_deref().and_then(parse_log_format) {
            config.format = format;
        }
        if let Some(include_target) = lookup(LOG_TARGET_ENV).as_deref().and_then(parse_bool) {
            config.include_target = include_target;
        }

        config
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Install the global subscriber. Logs go to stderr so stdout can carry table output.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let env_filter =
        EnvFilter::try_new(config.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_writer(std::io::stderr)
        .with_ansi(matches!(config.format, LogFormat::Pretty));

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }

    Ok(())
}

pub fn log_cli_start(command: &str, config: &LoggingConfig) {
    info!(
        component = "cli",
        event = "cli.start",
        command,
        log_level = %config.level,
        log_format = ?config.format,
        include_target = config.include_target
    );
}

pub fn log_pipeline_start(config: &PipelineConfig, now: DateTime<Utc>) {
    info!(
        component = "pipeline",
        event = "pipeline.start",
        window_days = config.window_days,
        now = %now.to_rfc3339()
    );
}

pub fn log_source_fetched(source: &str, records: usize) {
    info!(
        component = "source",
        event = "source.fetched",
        source,
        records
    );
}

pub fn log_source_failed(source: &str, err: &PipelineError) {
    error!(
        component = "source",
        event = "source.failed",
        source,
        code = err.code(),
        error = %err
    );
}

pub fn log_window_selected(bounds: &WindowBounds) {
    info!(
        component = "pipeline",
        event = "window.selected",
        observation_start = %bounds.observation_start.to_rfc3339(),
        observation_end = %bounds.observation_end.to_rfc3339(),
        label_end = %bounds.label_end.to_rfc3339(),
        observation_dates = bounds.observation_dates()
    );
}

pub fn log_events_normalized(report: &NormalizationReport) {
    info!(
        component = "normalizer",
        event = "events.normalized",
        total = report.total,
        accepted = report.accepted,
        rejected = report.rejected_count()
    );
}

pub fn log_table_assembled(summary: &DatasetSummary) {
    if summary.rows == 0 {
        info!(
            component = "assembler",
            event = "table.empty",
            reason = "no events in observation window"
        );
        return;
    }

    info!(
        component = "assembler",
        event = "table.assembled",
        rows = summary.rows,
        churned = summary.churned,
        retained = summary.retained,
        churn_rate = summary.churn_rate
    );
}

fn parse_log_format(raw: &str) -> Option<LogFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "pretty" => Some(LogFormat::Pretty),
        _ => None,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let cfg = LoggingConfig::from_lookup(lookup_from(&[]));
        assert_eq!(cfg, LoggingConfig::default());
    }

    #[test]
    fn parses_json_and_level_and_target() {
        let cfg = LoggingConfig::from_lookup(lookup_from(&[
            (LOG_LEVEL_ENV, "churn_flux=debug"),
            (LOG_FORMAT_ENV, "JSON"),
            (LOG_TARGET_ENV, "off"),
        ]));

        assert_eq!(cfg.level, "churn_flux=debug");
        assert_eq!(cfg.format, LogFormat::Json);
        assert!(!cfg.include_target);
    }

    #[test]
    fn unparseable_values_keep_defaults() {
        let cfg = LoggingConfig::from_lookup(lookup_from(&[
            (LOG_LEVEL_ENV, "   "),
            (LOG_FORMAT_ENV, "xml"),
            (LOG_TARGET_ENV, "maybe"),
        ]));
        assert_eq!(cfg, LoggingConfig::default());
    }
}
