//! Churn CLI - Command-line interface for Churn Flux
//!
//! Commands:
//! - build: Build the labeled feature table from event and user files
//! - validate: Report raw events the normalizer would reject
//! - doctor: Diagnose configuration
//! - schema: Print the output table schema

use clap::{Parser, Subcommand, ValueEnum};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use churn_flux::source::parse_records;
use churn_flux::{
    init_logging, log_cli_start, ChurnPipeline, EventNormalizer, EventSource, FileSource,
    InMemoryEventSource, InMemoryUserSource, LoggingConfig, PipelineConfig, PipelineError,
    RawEventRecord, RawUserRecord, RecordFormat, TableFormat, UserSource, FEATURE_COLUMNS,
    FLUX_VERSION, PRODUCER_NAME,
};

/// Churn - build churn-labeled feature tables from raw user events
#[derive(Parser)]
#[command(name = "churn")]
#[command(version = FLUX_VERSION)]
#[command(about = "Turn raw user events into a churn-labeled feature table", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the feature table
    Build {
        /// Events file path (use - for stdin)
        #[arg(short, long)]
        events: PathBuf,

        /// Users file path (use - for stdin); friend counts fall back to events when omitted
        #[arg(short, long)]
        users: Option<PathBuf>,

        /// Reference instant (RFC 3339); defaults to the current time
        #[arg(long)]
        now: Option<String>,

        /// Observation and label window length in days (overrides CHURN_WINDOW_DAYS)
        #[arg(long)]
        window_days: Option<u32>,

        /// Input format for events and users
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "csv")]
        output_format: OutputFormat,

        /// Write the dataset summary as JSON to this path
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Validate raw events
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the output table schema
    Schema {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Build { .. } => "build",
            Commands::Validate { .. } => "validate",
            Commands::Doctor { .. } => "doctor",
            Commands::Schema { .. } => "schema",
        }
    }
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
}

impl From<InputFormat> for RecordFormat {
    fn from(format: InputFormat) -> Self {
        match format {
            InputFormat::Ndjson => RecordFormat::Ndjson,
            InputFormat::Json => RecordFormat::Json,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Comma-separated values with a header row
    Csv,
    /// Newline-delimited JSON (one row per line)
    Ndjson,
    /// JSON array of rows
    Json,
}

impl From<OutputFormat> for TableFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Csv => TableFormat::Csv,
            OutputFormat::Ndjson => TableFormat::Ndjson,
            OutputFormat::Json => TableFormat::Json,
        }
    }
}

fn main() -> ExitCode {
    let logging = LoggingConfig::from_env();
    if let Err(e) = init_logging(&logging) {
        eprintln!("{e}");
    }

    let cli = Cli::parse();
    log_cli_start(cli.command.name(), &logging);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), ChurnCliError> {
    match cli.command {
        Commands::Build {
            events,
            users,
            now,
            window_days,
            input_format,
            output,
            output_format,
            summary,
        } => cmd_build(BuildArgs {
            events,
            users,
            now,
            window_days,
            input_format: input_format.into(),
            output,
            output_format: output_format.into(),
            summary,
        }),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format.into(), json),

        Commands::Doctor { json } => cmd_doctor(json),

        Commands::Schema { json } => cmd_schema(json),
    }
}

struct BuildArgs {
    events: PathBuf,
    users: Option<PathBuf>,
    now: Option<String>,
    window_days: Option<u32>,
    input_format: RecordFormat,
    output: PathBuf,
    output_format: TableFormat,
    summary: Option<PathBuf>,
}

fn cmd_build(args: BuildArgs) -> Result<(), ChurnCliError> {
    if args.users.as_deref().is_some_and(is_stdio) && is_stdio(&args.events) {
        return Err(ChurnCliError::StdinConflict);
    }

    let mut config = PipelineConfig::from_env();
    if let Some(days) = args.window_days {
        config.window_days = days;
    }
    let pipeline = ChurnPipeline::new(config)?;

    let now = match args.now.as_deref() {
        Some(raw) => parse_now(raw)?,
        None => Utc::now(),
    };

    let events_source: Box<dyn EventSource> = if is_stdio(&args.events) {
        let records = parse_records(&read_input(&args.events)?, args.input_format)?;
        Box::new(InMemoryEventSource::new(records))
    } else {
        Box::new(FileSource::new("events", &args.events, args.input_format))
    };

    let users_source: Box<dyn UserSource> = match &args.users {
        Some(path) if is_stdio(path) => {
            let records: Vec<RawUserRecord> = parse_records(&read_input(path)?, args.input_format)?;
            Box::new(InMemoryUserSource::new(records))
        }
        Some(path) => Box::new(FileSource::new("users", path, args.input_format)),
        None => Box::new(InMemoryUserSource::empty()),
    };

    let output = pipeline.run(events_source.as_ref(), users_source.as_ref(), now)?;

    if is_stdio(&args.output) {
        let stdout = io::stdout();
        output.table.write(args.output_format, stdout.lock())?;
    } else {
        let file = File::create(&args.output)?;
        output.table.write(args.output_format, BufWriter::new(file))?;
    }

    if let Some(summary_path) = &args.summary {
        fs::write(summary_path, serde_json::to_string_pretty(&output.summary)?)?;
    }

    Ok(())
}

fn cmd_validate(input: &Path, format: RecordFormat, json: bool) -> Result<(), ChurnCliError> {
    let records: Vec<RawEventRecord> = parse_records(&read_input(input)?, format)?;
    let report = EventNormalizer::normalize(&records).report;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total events:    {}", report.total);
        println!("Accepted events: {}", report.accepted);
        println!("Rejected events: {}", report.rejected_count());

        if !report.rejected.is_empty() {
            println!("\nRejected:");
            for rejected in &report.rejected {
                println!(
                    "  - Event {} (index {}): {}",
                    rejected.event_id.as_deref().unwrap_or("unknown"),
                    rejected.index,
                    rejected.reason
                );
            }
        }
    }

    if report.rejected.is_empty() {
        Ok(())
    } else {
        Err(ChurnCliError::ValidationFailed(report.rejected_count()))
    }
}

fn cmd_doctor(json: bool) -> Result<(), ChurnCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Churn Flux version {}", FLUX_VERSION),
    });

    let config = PipelineConfig::from_env();
    checks.push(match config.validate() {
        Ok(()) => DoctorCheck {
            name: "window_days".to_string(),
            status: CheckStatus::Ok,
            message: format!("Window length {} days", config.window_days),
        },
        Err(e) => DoctorCheck {
            name: "window_days".to_string(),
            status: CheckStatus::Error,
            message: e.to_string(),
        },
    });

    let logging = LoggingConfig::from_env();
    checks.push(DoctorCheck {
        name: "logging".to_string(),
        status: CheckStatus::Ok,
        message: format!("level={} format={:?}", logging.level, logging.format),
    });

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Warning,
            message: "stdin is a TTY; use --events <path> instead of -".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (--events - ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: FLUX_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Churn Doctor Report");
        println!("===================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(ChurnCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

const COLUMN_DESCRIPTIONS: [(&str, &str); 8] = [
    ("string", "User identifier"),
    ("integer", "Distinct UTC calendar dates with activity in the observation window"),
    ("integer", "MATCH_STARTED and MATCH_FINISHED events"),
    ("float", "Sum of data.distance (missing or invalid counts as 0)"),
    ("float", "Sum of data.calories (missing or invalid counts as 0)"),
    ("integer", "Consecutive active days ending at the window end date"),
    ("integer", "External friend count, else FRIEND_ADDED events"),
    ("0|1", "1 when the user has no event in the label window"),
];

fn cmd_schema(json: bool) -> Result<(), ChurnCliError> {
    if json {
        let columns: Vec<_> = FEATURE_COLUMNS
            .iter()
            .zip(COLUMN_DESCRIPTIONS.iter())
            .map(|(name, (kind, description))| {
                serde_json::json!({ "name": name, "type": kind, "description": description })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&columns)?);
    } else {
        println!("Output Schema: churn feature table");
        println!();
        for (name, (kind, description)) in FEATURE_COLUMNS.iter().zip(COLUMN_DESCRIPTIONS.iter()) {
            println!("- {name} ({kind}): {description}");
        }
    }
    Ok(())
}

// Helper functions

fn is_stdio(path: &Path) -> bool {
    path.to_string_lossy() == "-"
}

fn read_input(path: &Path) -> Result<String, ChurnCliError> {
    if is_stdio(path) {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn parse_now(raw: &str) -> Result<DateTime<Utc>, ChurnCliError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ChurnCliError::InvalidNow(format!("{raw}: {e}")))
}

#[derive(Debug)]
enum ChurnCliError {
    Io(io::Error),
    Pipeline(PipelineError),
    Json(serde_json::Error),
    InvalidNow(String),
    StdinConflict,
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for ChurnCliError {
    fn from(e: io::Error) -> Self {
        ChurnCliError::Io(e)
    }
}

impl From<PipelineError> for ChurnCliError {
    fn from(e: PipelineError) -> Self {
        ChurnCliError::Pipeline(e)
    }
}

impl From<serde_json::Error> for ChurnCliError {
    fn from(e: serde_json::Error) -> Self {
        ChurnCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<ChurnCliError> for CliError {
    fn from(e: ChurnCliError) -> Self {
        match e {
            ChurnCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            ChurnCliError::Pipeline(e) => {
                let hint = if e.is_configuration() {
                    "Check --events/--users paths and CHURN_WINDOW_DAYS"
                } else {
                    "Run 'churn validate' on the input"
                };
                CliError {
                    code: e.code().to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            ChurnCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            ChurnCliError::InvalidNow(msg) => CliError {
                code: "CONFIGURATION_ERROR".to_string(),
                message: format!("Invalid --now: {msg}"),
                hint: Some("Use RFC 3339, e.g. 2024-03-10T00:00:00Z".to_string()),
            },
            ChurnCliError::StdinConflict => CliError {
                code: "CONFIGURATION_ERROR".to_string(),
                message: "--events and --users cannot both read from stdin".to_string(),
                hint: Some("Pass one of them as a file path".to_string()),
            },
            ChurnCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} events failed validation", count),
                hint: Some("Rejected events are skipped by 'churn build'".to_string()),
            },
            ChurnCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_args(events: &str, users: Option<&str>) -> BuildArgs {
        BuildArgs {
            events: PathBuf::from(events),
            users: users.map(PathBuf::from),
            now: Some("2024-03-10T00:00:00Z".to_string()),
            window_days: None,
            input_format: RecordFormat::Ndjson,
            output: PathBuf::from("-"),
            output_format: TableFormat::Csv,
            summary: None,
        }
    }

    #[test]
    fn users_accept_stdin_marker() {
        let cli = Cli::try_parse_from([
            "churn", "build", "--events", "events.ndjson", "--users", "-",
        ])
        .unwrap();
        match cli.command {
            Commands::Build { users, .. } => assert!(is_stdio(users.as_deref().unwrap())),
            _ => panic!("expected build"),
        }
    }

    #[test]
    fn events_and_users_cannot_share_stdin() {
        let err = cmd_build(build_args("-", Some("-"))).unwrap_err();
        assert!(matches!(err, ChurnCliError::StdinConflict));

        let cli_error = CliError::from(err);
        assert_eq!(cli_error.code, "CONFIGURATION_ERROR");
    }

    #[test]
    fn missing_users_file_is_source_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let events = dir.path().join("events.ndjson");
        fs::write(&events, "").unwrap();

        let err = cmd_build(build_args(
            events.to_str().unwrap(),
            Some("/no/such/users.ndjson"),
        ))
        .unwrap_err();
        assert_eq!(CliError::from(err).code, "SOURCE_UNAVAILABLE");
    }
}
