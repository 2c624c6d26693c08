//! Churn Flux - churn-labeling feature pipeline
//!
//! Flux turns a raw stream of timestamped user events into one fixed-width
//! feature row per user plus a binary churn label, ready for a classifier:
//! normalization → window selection → per-user aggregation (with streak)
//! → churn labeling → user join and table assembly.
//!
//! ```ignore
//! use churn_flux::{build_feature_table, PipelineConfig};
//!
//! let table = build_feature_table(&events, &users, now, &PipelineConfig::default());
//! table.write_csv(std::io::stdout())?;
//! ```

pub mod aggregator;
pub mod assembler;
pub mod config;
pub mod error;
pub mod label;
pub mod normalizer;
pub mod observability;
pub mod pipeline;
pub mod source;
pub mod streak;
pub mod types;
pub mod window;

pub use assembler::{DatasetSummary, FeatureTable, FeatureTableAssembler, TableFormat};
pub use config::{PipelineConfig, DEFAULT_WINDOW_DAYS, MAX_WINDOW_DAYS};
pub use error::PipelineError;
pub use normalizer::{EventNormalizer, NormalizationReport, RawEventRecord, RawUserRecord};
pub use observability::{init_logging, log_cli_start, LogFormat, LoggingConfig};
pub use pipeline::{build_feature_table, ChurnPipeline, PipelineOutput};
pub use source::{
    EventSource, FileSource, InMemoryEventSource, InMemoryUserSource, RecordFormat, UserSource,
};
pub use types::{ChurnLabel, Event, EventData, EventType, FeatureRecord, User, FEATURE_COLUMNS};
pub use window::WindowBounds;

/// Crate version embedded in CLI and doctor output
pub const FLUX_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "churn-flux";
