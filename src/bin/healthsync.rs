//! healthsync CLI - Command-line interface for Health Sync
//!
//! Commands:
//! - aggregate: Turn a Health Connect export into daily records
//! - validate: Check an export for records the aggregation will skip
//! - publish: Submit daily records to the remote service
//! - sync: Probe, aggregate and publish in one go
//! - probe: Watch the remote service become available
//! - records: List records stored remotely
//! - doctor: Diagnose configuration, input and remote service

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use health_sync::api::records_in_range;
use health_sync::availability::AvailabilityStatus;
use health_sync::logging::LoggingConfig;
use health_sync::types::{assign_user, parse_date};
use health_sync::{
    Aggregator, ApiError, AvailabilityProber, AvailabilityStore, BatchPublisher, BatchReport,
    DateRange, HealthApi, HealthConnectExport, HttpHealthApi, MetricKind, PublishStatus,
    ServiceAvailability, SourceError, SyncConfig, SyncError, UnifiedDailyRecord, PRODUCER_NAME,
    VERSION,
};

/// healthsync - Daily aggregation and sync for on-device health records
#[derive(Parser)]
#[command(name = "healthsync")]
#[command(version = VERSION)]
#[command(about = "Aggregate health records into daily summaries and sync them", long_about = None)]
struct Cli {
    /// Remote service base URL (overrides HEALTH_SYNC_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate a Health Connect export into daily records
    Aggregate {
        /// Export file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// First day, YYYY-MM-DD
        #[arg(long)]
        start: String,

        /// Last day, YYYY-MM-DD (inclusive)
        #[arg(long)]
        end: String,

        /// Attach this user id to every record
        #[arg(long)]
        user_id: Option<String>,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Validate a Health Connect export
    Validate {
        /// Export file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Publish daily records to the remote service
    Publish {
        /// Records file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Attach this user id to every record before publishing
        #[arg(long)]
        user_id: Option<String>,

        /// Output batch report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Probe the service, aggregate an export and publish the result
    Sync {
        /// Export file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// First day, YYYY-MM-DD
        #[arg(long)]
        start: String,

        /// Last day, YYYY-MM-DD (inclusive)
        #[arg(long)]
        end: String,

        /// Owner of the records
        #[arg(long)]
        user_id: String,

        /// Output batch report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Probe the remote service until it is ready or gives up
    Probe {
        /// Re-probes while the service is starting
        #[arg(long)]
        max_retries: Option<u32>,

        /// Print transitions as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// List records stored remotely for a user
    Records {
        #[arg(long)]
        user_id: String,

        /// First day, YYYY-MM-DD
        #[arg(long)]
        start: Option<String>,

        /// Last day, YYYY-MM-DD (inclusive)
        #[arg(long)]
        end: Option<String>,

        /// Only the most recent record
        #[arg(long)]
        latest: bool,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Diagnose configuration, input and remote service
    Doctor {
        /// Check an export file
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = LoggingConfig::from_env().init() {
        eprintln!("{}", error_json(HealthSyncCliError::from(e)));
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", error_json(e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), HealthSyncCliError> {
    let mut config = SyncConfig::from_env();
    if let Some(url) = cli.api_url {
        config = config.with_base_url(url);
    }

    match cli.command {
        Commands::Aggregate {
            input,
            start,
            end,
            user_id,
            output,
            output_format,
        } => {
            cmd_aggregate(
                &input,
                &start,
                &end,
                user_id.as_deref(),
                &output,
                output_format,
            )
            .await
        }

        Commands::Validate { input, json } => cmd_validate(&input, json),

        Commands::Publish {
            input,
            input_format,
            user_id,
            json,
        } => cmd_publish(&config, &input, input_format, user_id.as_deref(), json).await,

        Commands::Sync {
            input,
            start,
            end,
            user_id,
            json,
        } => cmd_sync(&config, &input, &start, &end, &user_id, json).await,

        Commands::Probe { max_retries, json } => cmd_probe(&config, max_retries, json).await,

        Commands::Records {
            user_id,
            start,
            end,
            latest,
            output_format,
        } => {
            cmd_records(
                &config,
                &user_id,
                start.as_deref(),
                end.as_deref(),
                latest,
                output_format,
            )
            .await
        }

        Commands::Doctor { input, json } => cmd_doctor(&config, input.as_deref(), json).await,
    }
}

async fn cmd_aggregate(
    input: &Path,
    start: &str,
    end: &str,
    user_id: Option<&str>,
    output: &Path,
    output_format: OutputFormat,
) -> Result<(), HealthSyncCliError> {
    let range = parse_range(start, end)?;
    let records = aggregate_export(input, &range).await?;
    let records = match user_id {
        Some(id) => assign_user(records, id),
        None => records,
    };

    let output_data = format_output(&records, &output_format)?;
    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_validate(input: &Path, json: bool) -> Result<(), HealthSyncCliError> {
    let export = load_export(input)?;
    let report = export.validate();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        for kind in MetricKind::ALL {
            println!(
                "{:<16}{}",
                format!("{}:", kind.record_type()),
                report.counts.get(&kind).copied().unwrap_or(0)
            );
        }
        println!("Total records:  {}", report.total_records());
        println!("Issues:         {}", report.issues.len());

        if !report.issues.is_empty() {
            println!("\nIssues:");
            for issue in &report.issues {
                println!(
                    "  - {} (index {}): {}",
                    issue.kind.record_type(),
                    issue.index,
                    issue.message
                );
            }
        }
    }

    if report.is_clean() {
        Ok(())
    } else {
        Err(HealthSyncCliError::ValidationFailed(report.issues.len()))
    }
}

async fn cmd_publish(
    config: &SyncConfig,
    input: &Path,
    input_format: InputFormat,
    user_id: Option<&str>,
    json: bool,
) -> Result<(), HealthSyncCliError> {
    let input_data = read_input(input)?;
    let records: Vec<UnifiedDailyRecord> = match input_format {
        InputFormat::Ndjson => parse_ndjson(&input_data)?,
        InputFormat::Json => serde_json::from_str(&input_data)?,
    };
    let records = match user_id {
        Some(id) => assign_user(records, id),
        None => records,
    };

    if records.is_empty() {
        return Err(HealthSyncCliError::NoRecords);
    }

    let api = Arc::new(HttpHealthApi::new(config)?);
    let report = BatchPublisher::new(api).publish(&records).await;
    print_report(&report, json)?;

    check_report(&report)
}

async fn cmd_sync(
    config: &SyncConfig,
    input: &Path,
    start: &str,
    end: &str,
    user_id: &str,
    json: bool,
) -> Result<(), HealthSyncCliError> {
    let range = parse_range(start, end)?;
    let api = Arc::new(HttpHealthApi::new(config)?);

    let prober = AvailabilityProber::new(Arc::clone(&api), AvailabilityStore::new(), config.probe);
    let availability = prober.probe(&CancellationToken::new()).await;
    if !availability.is_online() {
        return Err(HealthSyncCliError::Unavailable(availability));
    }

    let records = assign_user(aggregate_export(input, &range).await?, user_id);
    if records.is_empty() {
        return Err(HealthSyncCliError::NoRecords);
    }

    let report = BatchPublisher::new(api).publish(&records).await;
    print_report(&report, json)?;

    check_report(&report)
}

async fn cmd_probe(
    config: &SyncConfig,
    max_retries: Option<u32>,
    json: bool,
) -> Result<(), HealthSyncCliError> {
    let api = Arc::new(HttpHealthApi::new(config)?);
    let policy = match max_retries {
        Some(n) => config.probe.with_max_retries(n),
        None => config.probe,
    };

    let store = AvailabilityStore::new();
    store.on_change(move |availability| {
        if json {
            match serde_json::to_string(availability) {
                Ok(line) => println!("{}", line),
                Err(e) => eprintln!("failed to encode availability: {}", e),
            }
        } else {
            println!("{}", availability);
        }
    });

    let prober = Arc::new(AvailabilityProber::new(api, store, policy));
    let availability = prober.spawn(CancellationToken::new()).await.map_err(|e| {
        HealthSyncCliError::Unavailable(ServiceAvailability::error(e.to_string()))
    })?;

    if availability.is_online() {
        Ok(())
    } else {
        Err(HealthSyncCliError::Unavailable(availability))
    }
}

async fn cmd_records(
    config: &SyncConfig,
    user_id: &str,
    start: Option<&str>,
    end: Option<&str>,
    latest: bool,
    output_format: OutputFormat,
) -> Result<(), HealthSyncCliError> {
    let api = HttpHealthApi::new(config)?;

    let records = if latest {
        api.latest_record(user_id).await?.into_iter().collect()
    } else if start.is_some() || end.is_some() {
        let start = start.map(parse_date).transpose()?.unwrap_or(chrono::NaiveDate::MIN);
        let end = end.map(parse_date).transpose()?.unwrap_or(chrono::NaiveDate::MAX);
        records_in_range(&api, user_id, start, end).await?
    } else {
        api.list_records(user_id).await?
    };

    print!("{}", format_output(&records, &output_format)?);
    Ok(())
}

async fn cmd_doctor(
    config: &SyncConfig,
    input: Option<&Path>,
    json: bool,
) -> Result<(), HealthSyncCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("{} version {}", PRODUCER_NAME, VERSION),
    });

    // Check export file if provided
    if let Some(path) = input {
        if path.exists() {
            checks.push(match HealthConnectExport::from_path(path) {
                Ok(export) => {
                    let report = export.validate();
                    DoctorCheck {
                        name: "export".to_string(),
                        status: if report.is_clean() {
                            CheckStatus::Ok
                        } else {
                            CheckStatus::Warning
                        },
                        message: format!(
                            "Export readable ({} records, {} issues)",
                            report.total_records(),
                            report.issues.len()
                        ),
                    }
                }
                Err(e) => DoctorCheck {
                    name: "export".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot load export: {}", e),
                },
            });
        } else {
            checks.push(DoctorCheck {
                name: "export".to_string(),
                status: CheckStatus::Warning,
                message: "Export file does not exist".to_string(),
            });
        }
    }

    // Check configuration and the remote service
    match HttpHealthApi::new(config) {
        Ok(api) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!("API base URL {}", api.base_url()),
            });

            // One attempt: a timeout stays `starting` instead of giving up
            let prober = AvailabilityProber::new(
                Arc::new(api),
                AvailabilityStore::new(),
                config.probe.single_attempt(),
            );
            checks.push(remote_check(&prober.probe_once().await));
        }
        Err(e) => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Error,
            message: e.to_string(),
        }),
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (--input - ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("healthsync Doctor Report");
        println!("========================");
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
        Err(HealthSyncCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn remote_check(availability: &ServiceAvailability) -> DoctorCheck {
    DoctorCheck {
        name: "remote".to_string(),
        status: match availability.status {
            AvailabilityStatus::Online => CheckStatus::Ok,
            AvailabilityStatus::Starting | AvailabilityStatus::Checking => CheckStatus::Warning,
            AvailabilityStatus::Offline | AvailabilityStatus::Error => CheckStatus::Error,
        },
        message: availability.to_string(),
    }
}

fn read_input(input: &Path) -> Result<String, HealthSyncCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn load_export(input: &Path) -> Result<HealthConnectExport, HealthSyncCliError> {
    Ok(HealthConnectExport::from_json(&read_input(input)?)?)
}

fn parse_range(start: &str, end: &str) -> Result<DateRange, HealthSyncCliError> {
    Ok(DateRange::from_dates(parse_date(start)?, parse_date(end)?)?)
}

async fn aggregate_export(
    input: &Path,
    range: &DateRange,
) -> Result<Vec<UnifiedDailyRecord>, HealthSyncCliError> {
    let aggregator = Aggregator::new(load_export(input)?);
    aggregator.authorize().await?;
    Ok(aggregator.aggregate(range).await)
}

fn parse_ndjson(data: &str) -> Result<Vec<UnifiedDailyRecord>, HealthSyncCliError> {
    data.lines()
        .map(str::trim)
        .enumerate()
        .filter(|(_, line)| !line.is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| {
                HealthSyncCliError::ParseError(format!("line {}: {}", i + 1, e))
            })
        })
        .collect()
}

fn format_output<T: Serialize>(
    items: &[T],
    format: &OutputFormat,
) -> Result<String, HealthSyncCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut out = String::new();
            for item in items {
                out.push_str(&serde_json::to_string(item)?);
                out.push('\n');
            }
            Ok(out)
        }
        OutputFormat::Json => Ok(serde_json::to_string(items)? + "\n"),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(items)? + "\n"),
    }
}

fn print_report(report: &BatchReport, json: bool) -> Result<(), HealthSyncCliError> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("Batch {}", report.batch_id);
    for outcome in &report.outcomes {
        match &outcome.status {
            PublishStatus::Synced { .. } => println!("  [OK]   {}", outcome.record_date),
            PublishStatus::Failed { error } => {
                println!("  [FAIL] {}: {}", outcome.record_date, error)
            }
        }
    }
    println!("{}", report.summary());
    Ok(())
}

fn check_report(report: &BatchReport) -> Result<(), HealthSyncCliError> {
    if report.is_complete() {
        Ok(())
    } else {
        Err(HealthSyncCliError::PublishIncomplete {
            failed: report.failure_count(),
            total: report.total_count(),
        })
    }
}

fn error_json(e: HealthSyncCliError) -> String {
    serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
}

// Error types

#[derive(Debug)]
enum HealthSyncCliError {
    Io(io::Error),
    Json(serde_json::Error),
    Sync(SyncError),
    ParseError(String),
    NoRecords,
    ValidationFailed(usize),
    PublishIncomplete { failed: usize, total: usize },
    Unavailable(ServiceAvailability),
    DoctorFailed,
}

impl From<io::Error> for HealthSyncCliError {
    fn from(e: io::Error) -> Self {
        HealthSyncCliError::Io(e)
    }
}

impl From<serde_json::Error> for HealthSyncCliError {
    fn from(e: serde_json::Error) -> Self {
        HealthSyncCliError::Json(e)
    }
}

impl From<SyncError> for HealthSyncCliError {
    fn from(e: SyncError) -> Self {
        HealthSyncCliError::Sync(e)
    }
}

impl From<SourceError> for HealthSyncCliError {
    fn from(e: SourceError) -> Self {
        HealthSyncCliError::Sync(e.into())
    }
}

impl From<ApiError> for HealthSyncCliError {
    fn from(e: ApiError) -> Self {
        HealthSyncCliError::Sync(e.into())
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<HealthSyncCliError> for CliError {
    fn from(e: HealthSyncCliError) -> Self {
        match e {
            HealthSyncCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            HealthSyncCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            HealthSyncCliError::Sync(e) => sync_error(e),
            HealthSyncCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Each line must be one daily record object".to_string()),
            },
            HealthSyncCliError::NoRecords => CliError {
                code: "NO_RECORDS".to_string(),
                message: "No daily records to publish".to_string(),
                hint: Some("Check the input file and date range".to_string()),
            },
            HealthSyncCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} records will be skipped", count),
                hint: Some("Fix the listed records and retry".to_string()),
            },
            HealthSyncCliError::PublishIncomplete { failed, total } => CliError {
                code: "PUBLISH_INCOMPLETE".to_string(),
                message: format!("{} of {} records failed to sync", failed, total),
                hint: Some("Re-run publish with the failed records".to_string()),
            },
            HealthSyncCliError::Unavailable(availability) => CliError {
                code: "SERVICE_UNAVAILABLE".to_string(),
                message: availability.to_string(),
                hint: Some("Run 'healthsync doctor' to check the API URL".to_string()),
            },
            HealthSyncCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

fn sync_error(e: SyncError) -> CliError {
    let (code, hint) = match &e {
        SyncError::InvalidDateRange { .. } | SyncError::DateParseError(_) => {
            ("DATE_ERROR", "Dates are YYYY-MM-DD and start must not be after end")
        }
        SyncError::Source(SourceError::PermissionDenied) => {
            ("PERMISSION_DENIED", "Grant read access to health records")
        }
        SyncError::Source(_) => ("SOURCE_ERROR", "Ensure input is a Health Connect export"),
        SyncError::Api(e) if e.is_timeout() => ("API_TIMEOUT", "The service may still be starting"),
        SyncError::Api(_) => ("API_ERROR", "Run 'healthsync doctor' to check the service"),
        SyncError::JsonError(_) => ("JSON_ERROR", "Check JSON syntax"),
        SyncError::Config(_) => ("CONFIG_ERROR", "Check HEALTH_SYNC_* environment variables"),
        SyncError::Logging(_) => ("LOGGING_ERROR", "Check RUST_LOG and LOG_FORMAT"),
    };
    CliError {
        code: code.to_string(),
        message: e.to_string(),
        hint: Some(hint.to_string()),
    }
}

// Report types

#[derive(Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Debug, PartialEq, Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
