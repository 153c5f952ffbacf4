//! Lizz CLI - Command-line tools for the Lizz attention engine
//!
//! Commands:
//! - score: Compute an Attention Quality Score
//! - doctor: Check a configuration file and collector reachability
//! - send: Deliver a snapshot payload to the collector

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use lizz::scoring::{attention_score, round2, SAT_SATURATION_SECONDS};
use lizz::transport::Transport;
use lizz::{LizzConfig, LizzError, SnapshotPayload, PRODUCER_NAME, SDK_VERSION};

/// Lizz - Attention-first section analytics
#[derive(Parser)]
#[command(name = "lizz")]
#[command(author = "Lizz")]
#[command(version = SDK_VERSION)]
#[command(about = "Attention analytics tooling", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the Attention Quality Score for one section
    Score {
        /// Seconds of active attention
        #[arg(long)]
        sat_seconds: f64,

        /// Average visibility ratio (0-1)
        #[arg(long)]
        visibility: f64,

        /// Completion rate (0-1)
        #[arg(long)]
        completion: f64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and collector connectivity
    Doctor {
        /// Configuration file (JSON, camelCase keys)
        #[arg(short, long)]
        config: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Send a snapshot payload through the ordinary delivery path
    Send {
        /// Configuration file (JSON, camelCase keys)
        #[arg(short, long)]
        config: PathBuf,

        /// Payload file (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

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

fn run(cli: Cli) -> Result<(), LizzCliError> {
    match cli.command {
        Commands::Score {
            sat_seconds,
            visibility,
            completion,
            json,
        } => cmd_score(sat_seconds, visibility, completion, json),

        Commands::Doctor { config, json } => cmd_doctor(&config, cli.verbose, json),

        Commands::Send { config, input } => cmd_send(&config, &input, cli.verbose),
    }
}

fn cmd_score(
    sat_seconds: f64,
    visibility: f64,
    completion: f64,
    json: bool,
) -> Result<(), LizzCliError> {
    if [sat_seconds, visibility, completion]
        .iter()
        .any(|v| !v.is_finite() || *v < 0.0)
    {
        return Err(LizzCliError::InvalidInput(
            "Inputs must be finite and non-negative".to_string(),
        ));
    }

    let score = attention_score(sat_seconds, visibility, completion);

    if json {
        let report = ScoreReport {
            sat_seconds: round2(sat_seconds),
            visibility_avg: round2(visibility),
            completion_rate: completion,
            saturation_seconds: SAT_SATURATION_SECONDS,
            attention_score: score,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", score);
    }
    Ok(())
}

fn cmd_doctor(config_path: &Path, verbose: bool, json: bool) -> Result<(), LizzCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "sdk_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Lizz SDK version {}", SDK_VERSION),
    });

    let config = match load_config(config_path, verbose) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!("Configuration valid for site {}", config.site_id),
            });
            Some(config)
        }
        Err(e) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: CliError::from(e).message,
            });
            None
        }
    };

    if let Some(config) = config {
        checks.push(DoctorCheck {
            name: "timing".to_string(),
            status: CheckStatus::Ok,
            message: format!(
                "Snapshot every {}ms, activity window {}ms, visibility threshold {}",
                config.snapshot_interval().as_millis(),
                config.activity_window().as_millis(),
                config.visibility_threshold()
            ),
        });

        if config.is_demo_mode() {
            checks.push(DoctorCheck {
                name: "mode".to_string(),
                status: CheckStatus::Warning,
                message: "Demo mode: snapshots are never sent".to_string(),
            });
        } else {
            checks.push(DoctorCheck {
                name: "mode".to_string(),
                status: CheckStatus::Ok,
                message: format!("Live mode: {}", config.endpoint()),
            });
        }

        let runtime = runtime()?;
        let transport = Transport::new(&config, runtime.handle().clone())?;
        let reachable = runtime.block_on(transport.test_connection());
        checks.push(DoctorCheck {
            name: "connection".to_string(),
            status: if reachable {
                CheckStatus::Ok
            } else {
                CheckStatus::Error
            },
            message: if reachable {
                format!("Collector reachable at {}", transport.health_url())
            } else {
                format!("Collector unreachable at {}", transport.health_url())
            },
        });
    }

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: SDK_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Lizz Doctor Report");
        println!("==================");
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
        Err(LizzCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_send(config_path: &Path, input: &Path, verbose: bool) -> Result<(), LizzCliError> {
    let config = load_config(config_path, verbose)?;

    let content = if input.to_str() == Some("-") {
        if atty::is(atty::Stream::Stdin) {
            return Err(LizzCliError::InteractiveStdin);
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let payload: SnapshotPayload = serde_json::from_str(&content)?;
    if payload.is_empty() {
        return Err(LizzCliError::EmptyPayload);
    }

    let runtime = runtime()?;
    let transport = Transport::new(&config, runtime.handle().clone())?;
    if runtime.block_on(transport.send_snapshot(&payload)) {
        println!(
            "Sent {} sections to {}",
            payload.sections.len(),
            transport.endpoint()
        );
        Ok(())
    } else {
        Err(LizzCliError::SendFailed(transport.endpoint().to_string()))
    }
}

fn load_config(path: &Path, verbose: bool) -> Result<LizzConfig, LizzCliError> {
    let content = fs::read_to_string(path)?;
    let config = LizzConfig::from_json(&content)?;
    Ok(if verbose { config.with_debug(true) } else { config })
}

fn runtime() -> Result<tokio::runtime::Runtime, LizzCliError> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

// Error types

#[derive(Debug)]
enum LizzCliError {
    Io(io::Error),
    Config(LizzError),
    Json(serde_json::Error),
    InvalidInput(String),
    InteractiveStdin,
    EmptyPayload,
    SendFailed(String),
    DoctorFailed,
}

impl From<io::Error> for LizzCliError {
    fn from(e: io::Error) -> Self {
        LizzCliError::Io(e)
    }
}

impl From<LizzError> for LizzCliError {
    fn from(e: LizzError) -> Self {
        LizzCliError::Config(e)
    }
}

impl From<serde_json::Error> for LizzCliError {
    fn from(e: serde_json::Error) -> Self {
        LizzCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<LizzCliError> for CliError {
    fn from(e: LizzCliError) -> Self {
        match e {
            LizzCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            LizzCliError::Config(e) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Config needs a non-empty siteId; see 'lizz doctor'".to_string()),
            },
            LizzCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            LizzCliError::InvalidInput(msg) => CliError {
                code: "INVALID_INPUT".to_string(),
                message: msg,
                hint: Some("Visibility and completion are ratios between 0 and 1".to_string()),
            },
            LizzCliError::InteractiveStdin => CliError {
                code: "INTERACTIVE_STDIN".to_string(),
                message: "Refusing to read a payload from an interactive terminal".to_string(),
                hint: Some("Pipe a payload in or pass --input <file>".to_string()),
            },
            LizzCliError::EmptyPayload => CliError {
                code: "EMPTY_PAYLOAD".to_string(),
                message: "Payload has no sections".to_string(),
                hint: Some("Only sections with active time are sent".to_string()),
            },
            LizzCliError::SendFailed(endpoint) => CliError {
                code: "SEND_FAILED".to_string(),
                message: format!("Collector at {} did not accept the snapshot", endpoint),
                hint: Some("Run 'lizz doctor' to check connectivity".to_string()),
            },
            LizzCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ScoreReport {
    sat_seconds: f64,
    visibility_avg: f64,
    completion_rate: f64,
    saturation_seconds: f64,
    attention_score: u8,
}

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
