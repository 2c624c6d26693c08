//! Error types for the churn feature pipeline
//!
//! Only failures that stop the whole batch live here. Malformed payload
//! fields, empty observation windows and conflicting friend counts are
//! absorbed where they occur and never surface as a `PipelineError`.

use thiserror::Error;

/// Errors that can abort a pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Source '{source_name}' unavailable: {detail}")]
    SourceUnavailable { source_name: String, detail: String },

    #[error("Failed to parse source records: {0}")]
    Parse(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Whether this error belongs to the configuration class (pipeline never ran)
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PipelineError::Configuration(_) | PipelineError::SourceUnavailable { .. }
        )
    }

    /// Stable machine-readable code for CLI and log output
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Configuration(_) => "CONFIGURATION_ERROR",
            PipelineError::SourceUnavailable { .. } => "SOURCE_UNAVAILABLE",
            PipelineError::Parse(_) => "PARSE_ERROR",
            PipelineError::Json(_) => "JSON_ERROR",
            PipelineError::Csv(_) => "CSV_ERROR",
            PipelineError::Io(_) => "IO_ERROR",
        }
    }
}
