//! Pipeline configuration
//!
//! The window length is passed explicitly into every entry point so that runs
//! with different windows can execute side by side.

use std::env;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PipelineError;

/// Default observation and label window length in days
pub const DEFAULT_WINDOW_DAYS: u32 = 7;

/// Longest accepted window, roughly a century
pub const MAX_WINDOW_DAYS: u32 = 36_500;

/// Environment variable overriding the window length
pub const WINDOW_DAYS_ENV: &str = "CHURN_WINDOW_DAYS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Length of both the trailing observation window and the forward label window
    pub window_days: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_WINDOW_DAYS,
        }
    }
}

impl PipelineConfig {
    pub fn with_window_days(window_days: u32) -> Self {
        Self { window_days }
    }

    /// Defaults overlaid with `CHURN_WINDOW_DAYS` when it holds a valid number
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(WINDOW_DAYS_ENV) {
            match parse_window_days(&raw) {
                Some(days) => config.window_days = days,
                None => warn!(
                    component = "config",
                    event = "config.ignored",
                    variable = WINDOW_DAYS_ENV,
                    value = %raw
                ),
            }
        }

        config
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.window_days == 0 {
            return Err(PipelineError::Configuration(
                "window_days must be at least 1".to_string(),
            ));
        }
        if self.window_days > MAX_WINDOW_DAYS {
            return Err(PipelineError::Configuration(format!(
                "window_days must be at most {MAX_WINDOW_DAYS}, got {}",
                self.window_days
            )));
        }
        Ok(())
    }
}

fn parse_window_days(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok()
}
