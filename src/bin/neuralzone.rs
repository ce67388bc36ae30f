//! neuralzone CLI - Command-line interface for the indoor localization engine
//!
//! Commands:
//! - run: process streaming RSSI frames from stdin (live mode)
//! - calibrate: collect a fingerprint vector set for one zone interactively
//! - validate: check a zones table or calibration file without running the engine
//! - doctor: diagnose configuration and input health

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use neuralzone::calibration::{CalibrationSession, CollectorOutcome};
use neuralzone::engine::ts_kst;
use neuralzone::fingerprint::FingerprintStore;
use neuralzone::persistence::append_jsonl;
use neuralzone::uploader::{JsonlSink, NullSink, UploadSidecar, UploadSink};
use neuralzone::zones::load_zones;
use neuralzone::{EngineConfig, LocalizationEngine, OutputPaths, ENGINE_VERSION};

#[derive(Parser)]
#[command(name = "neuralzone")]
#[command(author = "Synheart AI Inc")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Indoor Wi-Fi localization engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream RSSI frames from stdin, emit zone events to the output directory
    Run {
        /// Calibration JSONL file (fingerprint database)
        #[arg(long)]
        fingerprints: PathBuf,

        /// Optional zones.csv (zone_id,x,y) for coordinate lookups
        #[arg(long)]
        zones: Option<PathBuf>,

        /// Directory receiving assignments.jsonl, uncertain.jsonl,
        /// transitions.jsonl, dwells.jsonl
        #[arg(long, default_value = "./output")]
        output_dir: PathBuf,

        /// Where to send batches of assignment events (jsonl path), in
        /// addition to the local output stream. Omit to skip upload.
        #[arg(long)]
        upload_sink: Option<PathBuf>,

        /// Upload sidecar bounded-queue capacity
        #[arg(long, default_value = "64")]
        queue_capacity: usize,

        /// How many assignment events to batch per upload
        #[arg(long, default_value = "20")]
        upload_batch_size: usize,
    },

    /// Interactively collect a calibration fingerprint vector set for one zone
    Calibrate {
        /// Target zone id
        #[arg(long)]
        zone_id: u32,

        /// Zone x coordinate
        #[arg(long, default_value = "0")]
        x: i64,

        /// Zone y coordinate
        #[arg(long, default_value = "0")]
        y: i64,

        /// Comma-separated expected sniffer ids
        #[arg(long, value_delimiter = ',')]
        sniffers: Vec<String>,

        /// Calibration device mac/identifier, recorded for provenance only
        #[arg(long, default_value = "unknown")]
        phone_mac: String,

        /// Calibration JSONL file to append the finished record to
        #[arg(long)]
        output: PathBuf,
    },

    /// Validate a zones table and/or calibration file without running the engine
    Validate {
        #[arg(long)]
        zones: Option<PathBuf>,

        #[arg(long)]
        fingerprints: Option<PathBuf>,

        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and input health
    Doctor {
        #[arg(long)]
        fingerprints: Option<PathBuf>,

        #[arg(long)]
        zones: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), NeuralzoneCliError> {
    match cli.command {
        Commands::Run {
            fingerprints,
            zones,
            output_dir,
            upload_sink,
            queue_capacity,
            upload_batch_size,
        } => cmd_run(
            &fingerprints,
            zones.as_deref(),
            &output_dir,
            upload_sink.as_deref(),
            queue_capacity,
            upload_batch_size,
        ),

        Commands::Calibrate {
            zone_id,
            x,
            y,
            sniffers,
            phone_mac,
            output,
        } => cmd_calibrate(zone_id, x, y, sniffers, &phone_mac, &output),

        Commands::Validate {
            zones,
            fingerprints,
            json,
        } => cmd_validate(zones.as_deref(), fingerprints.as_deref(), json),

        Commands::Doctor {
            fingerprints,
            zones,
            json,
        } => cmd_doctor(fingerprints.as_deref(), zones.as_deref(), json),
    }
}

fn now_ts() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn cmd_run(
    fingerprints_path: &std::path::Path,
    zones_path: Option<&std::path::Path>,
    output_dir: &std::path::Path,
    upload_sink_path: Option<&std::path::Path>,
    queue_capacity: usize,
    upload_batch_size: usize,
) -> Result<(), NeuralzoneCliError> {
    let config = EngineConfig::from_env();
    let fingerprints = FingerprintStore::load(fingerprints_path)?;
    let zones = match zones_path {
        Some(p) => load_zones(p)?,
        None => Default::default(),
    };

    fs::create_dir_all(output_dir)?;
    let outputs = OutputPaths {
        assignments: output_dir.join("assignments.jsonl"),
        uncertain: output_dir.join("uncertain.jsonl"),
        transitions: output_dir.join("transitions.jsonl"),
        dwells: output_dir.join("dwells.jsonl"),
    };

    let sidecar = upload_sink_path.map(|p| {
        let sink: Box<dyn UploadSink> = Box::new(JsonlSink { path: p.to_path_buf() });
        UploadSidecar::spawn(
            sink,
            queue_capacity,
            config.upload_max_retries,
            output_dir.join("failed_uploads.jsonl"),
        )
    });
    let _null_sink_unused_when_no_upload = NullSink; // documents the no-op default path

    let mut engine = LocalizationEngine::new(config, fingerprints, zones, Some(outputs.clone()))?;

    let mut pending_batch = Vec::new();
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let outcome = engine.process_message(&line, now_ts());

        if let Some(assignment) = outcome.assignment {
            if let Some(sidecar) = &sidecar {
                pending_batch.push(assignment);
                if pending_batch.len() >= upload_batch_size {
                    let batch = std::mem::take(&mut pending_batch);
                    let _ = sidecar.enqueue(batch);
                }
            }
        }
        if let Some(uncertain) = outcome.uncertain {
            append_jsonl(&outputs.uncertain, &uncertain);
        }
    }

    if let Some(sidecar) = &sidecar {
        if !pending_batch.is_empty() {
            let _ = sidecar.enqueue(pending_batch);
        }
    }

    Ok(())
}

fn cmd_calibrate(
    zone_id: u32,
    x: i64,
    y: i64,
    sniffers: Vec<String>,
    phone_mac: &str,
    output: &std::path::Path,
) -> Result<(), NeuralzoneCliError> {
    let config = EngineConfig::from_env();
    let mut session = CalibrationSession::new(sniffers, &config);

    let stdin = io::stdin();
    let mut outcome = None;
    for line in stdin.lock().lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let reading: CalibrationReading = serde_json::from_str(trimmed)
            .map_err(|e| NeuralzoneCliError::ParseError(e.to_string()))?;
        if let Some(o) = session.feed(&reading.rpi_id, now_ts(), reading.rssi as f64) {
            outcome = Some(o);
            break;
        }
    }

    let reason = match outcome {
        Some(CollectorOutcome::AllSniffersFull) => "all_sniffers_full",
        Some(CollectorOutcome::MaxVectorsReached) => "max_vectors_reached",
        Some(CollectorOutcome::TimedOut) => "timed_out",
        None => "stdin_closed",
    };

    let now = now_ts();
    let record = neuralzone::types::CalibrationRecord {
        created_ts: now,
        created_ts_kst: ts_kst(now),
        zone_id,
        x,
        y,
        phone_mac_used: phone_mac.to_string(),
        max_samples_per_pi: config.max_samples_per_pi,
        sync_window_sec: config.sync_window_sec,
        min_pis_for_vector: config.min_pis_for_vector,
        vectors_collected: session.vectors_collected(),
        vector_type: "normalized_rssi_minus_median".to_string(),
        timebase: "rx_time_laptop".to_string(),
        vectors: session.vectors().to_vec(),
    };

    append_jsonl(output, &record);
    eprintln!(
        "collected {} vectors for zone {} ({})",
        record.vectors_collected, zone_id, reason
    );

    Ok(())
}

#[derive(serde::Deserialize)]
struct CalibrationReading {
    rpi_id: String,
    rssi: i64,
}

fn cmd_validate(
    zones: Option<&std::path::Path>,
    fingerprints: Option<&std::path::Path>,
    json: bool,
) -> Result<(), NeuralzoneCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();
    let mut failed = false;

    if let Some(path) = zones {
        match load_zones(path) {
            Ok(z) => checks.push(DoctorCheck {
                name: "zones".to_string(),
                status: CheckStatus::Ok,
                message: format!("{} zone rows loaded", z.len()),
            }),
            Err(e) => {
                failed = true;
                checks.push(DoctorCheck {
                    name: "zones".to_string(),
                    status: CheckStatus::Error,
                    message: e.to_string(),
                });
            }
        }
    }

    if let Some(path) = fingerprints {
        match FingerprintStore::load(path) {
            Ok(store) => checks.push(DoctorCheck {
                name: "fingerprints".to_string(),
                status: if store.is_empty() {
                    CheckStatus::Warning
                } else {
                    CheckStatus::Ok
                },
                message: format!("{} zone fingerprints loaded", store.entries().len()),
            }),
            Err(e) => {
                failed = true;
                checks.push(DoctorCheck {
                    name: "fingerprints".to_string(),
                    status: CheckStatus::Error,
                    message: e.to_string(),
                });
            }
        }
    }

    print_report("Validation Report", &checks, json)?;

    if failed {
        Err(NeuralzoneCliError::ValidationFailed)
    } else {
        Ok(())
    }
}

fn cmd_doctor(
    fingerprints: Option<&std::path::Path>,
    zones: Option<&std::path::Path>,
    json: bool,
) -> Result<(), NeuralzoneCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "engine_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("neuralzone version {}", ENGINE_VERSION),
    });

    if let Some(path) = fingerprints {
        match FingerprintStore::load(path) {
            Ok(store) if store.is_empty() => checks.push(DoctorCheck {
                name: "fingerprints".to_string(),
                status: CheckStatus::Warning,
                message: "calibration file has no usable vectors".to_string(),
            }),
            Ok(store) => checks.push(DoctorCheck {
                name: "fingerprints".to_string(),
                status: CheckStatus::Ok,
                message: format!("{} zones calibrated", store.entries().len()),
            }),
            Err(e) => checks.push(DoctorCheck {
                name: "fingerprints".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            }),
        }
    } else {
        checks.push(DoctorCheck {
            name: "fingerprints".to_string(),
            status: CheckStatus::Warning,
            message: "no --fingerprints path given".to_string(),
        });
    }

    if let Some(path) = zones {
        match load_zones(path) {
            Ok(z) => checks.push(DoctorCheck {
                name: "zones".to_string(),
                status: CheckStatus::Ok,
                message: format!("{} zone rows", z.len()),
            }),
            Err(e) => checks.push(DoctorCheck {
                name: "zones".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            }),
        }
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
            message: "stdin is a pipe (streaming mode ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let has_errors = checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    print_report("neuralzone Doctor Report", &checks, json)?;

    if has_errors {
        Err(NeuralzoneCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn print_report(title: &str, checks: &[DoctorCheck], json: bool) -> Result<(), NeuralzoneCliError> {
    if json {
        println!("{}", serde_json::to_string_pretty(&DoctorReport {
            title: title.to_string(),
            checks: checks.to_vec(),
        })?);
    } else {
        println!("{}", title);
        println!("{}", "=".repeat(title.len()));
        for check in checks {
            let icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", icon, check.name, check.message);
        }
        io::stdout().flush()?;
    }
    Ok(())
}

#[derive(serde::Serialize)]
struct DoctorReport {
    title: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize, Clone)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize, Clone)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

#[derive(Debug)]
enum NeuralzoneCliError {
    Io(io::Error),
    Engine(neuralzone::EngineError),
    Json(serde_json::Error),
    ParseError(String),
    ValidationFailed,
    DoctorFailed,
}

impl From<io::Error> for NeuralzoneCliError {
    fn from(e: io::Error) -> Self {
        NeuralzoneCliError::Io(e)
    }
}

impl From<neuralzone::EngineError> for NeuralzoneCliError {
    fn from(e: neuralzone::EngineError) -> Self {
        NeuralzoneCliError::Engine(e)
    }
}

impl From<serde_json::Error> for NeuralzoneCliError {
    fn from(e: serde_json::Error) -> Self {
        NeuralzoneCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<NeuralzoneCliError> for CliError {
    fn from(e: NeuralzoneCliError) -> Self {
        match e {
            NeuralzoneCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("check file paths and permissions".to_string()),
            },
            NeuralzoneCliError::Engine(e) => CliError {
                code: "ENGINE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("run 'neuralzone doctor' for details".to_string()),
            },
            NeuralzoneCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("check JSON syntax".to_string()),
            },
            NeuralzoneCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("check input record format".to_string()),
            },
            NeuralzoneCliError::ValidationFailed => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: "one or more inputs failed validation".to_string(),
                hint: Some("review the validation report above".to_string()),
            },
            NeuralzoneCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "one or more health checks failed".to_string(),
                hint: Some("review the doctor report above".to_string()),
            },
        }
    }
}
