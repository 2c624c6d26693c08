use std::io;
use std::io::Write;
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use churn_flux::{
    ChurnPipeline, FileSource, InMemoryEventSource, InMemoryUserSource, PipelineConfig,
    RawEventRecord, RecordFormat,
};
use tracing::dispatcher::with_default;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriter;

#[derive(Clone, Default)]
struct SharedWriter {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedWriter {
    fn output_string(&self) -> String {
        let bytes = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        String::from_utf8_lossy(&bytes).to_string()
    }
}

struct SharedWriterGuard {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        out.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture_logs(max_level: Level, f: impl FnOnce()) -> String {
    let writer = SharedWriter::default();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_max_level(max_level)
        .with_writer(writer.clone())
        .finish();
    let dispatch = tracing::Dispatch::new(subscriber);

    with_default(&dispatch, f);
    writer.output_string()
}

fn records(value: serde_json::Value) -> Vec<RawEventRecord> {
    serde_json::from_value(value).expect("fixture records should deserialize")
}

#[test]
fn pipeline_run_emits_stage_events() {
    let now = Utc.with_ymd_and_hms(2024, 6, 20, 12, 0, 0).unwrap();
    let events = records(serde_json::json!([
        { "id": "1", "userId": "u1", "timestamp": "2024-06-20T08:00:00Z", "eventType": "MATCH_STARTED" },
        { "id": "2", "userId": "u1", "timestamp": "yesterday", "eventType": "MATCH_FINISHED" }
    ]));

    let logs = capture_logs(Level::INFO, || {
        let pipeline =
            ChurnPipeline::new(PipelineConfig::default()).expect("default config is valid");
        let output = pipeline
            .run(
                &InMemoryEventSource::new(events),
                &InMemoryUserSource::empty(),
                now,
            )
            .expect("in-memory run should succeed");
        assert_eq!(output.table.len(), 1);
    });

    assert!(logs.contains("\"event\":\"pipeline.start\""));
    assert!(logs.contains("\"event\":\"source.fetched\""));
    assert!(logs.contains("\"source\":\"in-memory-events\""));
    assert!(logs.contains("\"source\":\"in-memory-users\""));
    assert!(logs.contains("\"event\":\"event.rejected\""));
    assert!(logs.contains("\"event\":\"events.normalized\""));
    assert!(logs.contains("\"event\":\"window.selected\""));
    assert!(logs.contains("\"event\":\"table.assembled\""));
}

#[test]
fn empty_window_is_logged_not_raised() {
    let now = Utc.with_ymd_and_hms(2024, 6, 20, 12, 0, 0).unwrap();
    let events = records(serde_json::json!([
        { "id": "1", "userId": "u1", "timestamp": "2023-01-01T08:00:00Z", "eventType": "MATCH_STARTED" }
    ]));

    let logs = capture_logs(Level::INFO, || {
        let pipeline =
            ChurnPipeline::new(PipelineConfig::default()).expect("default config is valid");
        let output = pipeline
            .run(
                &InMemoryEventSource::new(events),
                &InMemoryUserSource::empty(),
                now,
            )
            .expect("empty window is not an error");
        assert!(output.table.is_empty());
        assert_eq!(output.summary.rows, 0);
    });

    assert!(logs.contains("\"event\":\"table.empty\""));
    assert!(!logs.contains("\"event\":\"table.assembled\""));
}

#[test]
fn unavailable_source_is_logged_by_name() {
    let now = Utc.with_ymd_and_hms(2024, 6, 20, 12, 0, 0).unwrap();

    let logs = capture_logs(Level::INFO, || {
        let pipeline =
            ChurnPipeline::new(PipelineConfig::default()).expect("default config is valid");
        let result = pipeline.run(
            &FileSource::new(
                "nightly-events",
                "/no/such/events.ndjson",
                RecordFormat::Ndjson,
            ),
            &InMemoryUserSource::empty(),
            now,
        );
        assert!(result.is_err());
    });

    assert!(logs.contains("\"event\":\"source.failed\""));
    assert!(logs.contains("\"source\":\"nightly-events\""));
    assert!(logs.contains("\"code\":\"SOURCE_UNAVAILABLE\""));
    assert!(!logs.contains("\"event\":\"table.assembled\""));
}
