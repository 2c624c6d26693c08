//! Event and user sources
//!
//! Sources are the collaborators that hand raw records to the pipeline. Each
//! is fetched exactly once per run; retries and pagination belong to whoever
//! produced the records.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::normalizer::{RawEventRecord, RawUserRecord};

/// Layout of a record file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    /// Newline-delimited JSON, one record per line
    #[default]
    Ndjson,
    /// A single JSON array of records
    Json,
}

/// Supplier of raw event records
pub trait EventSource {
    /// Human-readable name used in errors and logs
    fn name(&self) -> &str;

    fn fetch_events(&self) -> Result<Vec<RawEventRecord>, PipelineError>;
}

/// Supplier of raw user records
pub trait UserSource {
    fn name(&self) -> &str;

    fn fetch_users(&self) -> Result<Vec<RawUserRecord>, PipelineError>;
}

/// Parse a JSON string containing an array of records
pub fn parse_array<T: DeserializeOwned>(json: &str) -> Result<Vec<T>, PipelineError> {
    let records: Vec<T> = serde_json::from_str(json)?;
    Ok(records)
}

/// Parse NDJSON, skipping blank lines
pub fn parse_ndjson<T: DeserializeOwned>(ndjson: &str) -> Result<Vec<T>, PipelineError> {
    let mut records = Vec::new();
    for (line_num, line) in ndjson.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(trimmed) {
            Ok(record) => records.push(record),
            Err(e) => {
                return Err(PipelineError::Parse(format!(
                    "Failed to parse line {}: {}",
                    line_num + 1,
                    e
                )));
            }
        }
    }
    Ok(records)
}

/// Parse records in the given layout
pub fn parse_records<T: DeserializeOwned>(
    content: &str,
    format: RecordFormat,
) -> Result<Vec<T>, PipelineError> {
    match format {
        RecordFormat::Ndjson => parse_ndjson(content),
        RecordFormat::Json => parse_array(content),
    }
}

/// Records stored in a local file
#[derive(Debug, Clone)]
pub struct FileSource {
    name: String,
    path: PathBuf,
    format: RecordFormat,
}

impl FileSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, format: RecordFormat) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            format,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read<T: DeserializeOwned>(&self) -> Result<Vec<T>, PipelineError> {
        if !self.path.is_file() {
            return Err(PipelineError::SourceUnavailable {
                source_name: self.name.clone(),
                detail: format!("{} does not exist or is not a file", self.path.display()),
            });
        }
        let content = fs::read_to_string(&self.path)?;
        parse_records(&content, self.format)
    }
}

impl EventSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_events(&self) -> Result<Vec<RawEventRecord>, PipelineError> {
        self.read()
    }
}

impl UserSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_users(&self) -> Result<Vec<RawUserRecord>, PipelineError> {
        self.read()
    }
}

/// Records already held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventSource {
    records: Vec<RawEventRecord>,
}

impl InMemoryEventSource {
    pub fn new(records: Vec<RawEventRecord>) -> Self {
        Self { records }
    }
}

impl EventSource for InMemoryEventSource {
    fn name(&self) -> &str {
        "in-memory-events"
    }

    fn fetch_events(&self) -> Result<Vec<RawEventRecord>, PipelineError> {
        Ok(self.records.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryUserSource {
    records: Vec<RawUserRecord>,
}

impl InMemoryUserSource {
    pub fn new(records: Vec<RawUserRecord>) -> Self {
        Self { records }
    }

    /// A user source with no records; every friend count falls back to events
    pub fn empty() -> Self {
        Self::default()
    }
}

impl UserSource for InMemoryUserSource {
    fn name(&self) -> &str {
        "in-memory-users"
    }

    fn fetch_users(&self) -> Result<Vec<RawUserRecord>, PipelineError> {
        Ok(self.records.clone())
    }
}
