//! Focus CLI - Command-line interface for Synheart Focus
//!
//! Commands:
//! - transform: Classify a batch of landmark observations (batch mode)
//! - run: Classify observations streamed on stdin (streaming mode)
//! - validate: Validate observation schema
//! - doctor: Diagnose engine configuration
//! - schema: Print input/output schema information

use chrono::Utc;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use synheart_focus::encoder::{EnvelopeEncoder, OutboundMessage};
use synheart_focus::schema::{ObservationReader, SCHEMA_VERSION};
use synheart_focus::types::AnalysisResult;
use synheart_focus::{AttentionEngine, ComputeError, EngineConfig, FOCUS_VERSION, PRODUCER_NAME};

/// Focus - Attention and engagement classification from facial landmarks
#[derive(Parser)]
#[command(name = "focus")]
#[command(author = "Synheart AI Inc")]
#[command(version = FOCUS_VERSION)]
#[command(about = "Classify attention state from landmark observations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Engine settings shared by the processing commands
#[derive(clap::Args)]
struct EngineArgs {
    /// Engine configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the look-away alert threshold in seconds
    #[arg(long)]
    gaze_away_secs: Option<f64>,

    /// Override the confusion threshold (0-1)
    #[arg(long)]
    confusion_threshold: Option<f64>,

    /// Override the number of gaze events kept per subject
    #[arg(long)]
    gaze_window: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a batch of observations (batch mode)
    Transform {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Classify observations streamed on stdin (streaming mode)
    Run {
        /// Wrap each result in an `analysis_result` envelope
        #[arg(long)]
        envelope: bool,

        /// Stop at the first malformed line instead of skipping it
        #[arg(long)]
        strict: bool,

        /// Flush output after each record (`--flush false` to buffer)
        #[arg(long, action = ArgAction::Set, default_value_t = true)]
        flush: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Validate observation schema
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose engine configuration
    Doctor {
        /// Check an engine configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print (input or output)
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one observation per line)
    Ndjson,
    /// JSON array of observations
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one result per line)
    Ndjson,
    /// JSON array of results
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Input schema (focus.observation.v1)
    Input,
    /// Output schema (analysis result)
    Output,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

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

fn run(cli: Cli) -> Result<(), FocusCliError> {
    match cli.command {
        Commands::Transform {
            input,
            output,
            input_format,
            output_format,
            engine,
        } => cmd_transform(&input, &output, input_format, output_format, &engine),

        Commands::Run {
            envelope,
            strict,
            flush,
            engine,
        } => cmd_run(envelope, strict, flush, &engine),

        Commands::Validate { input, json } => cmd_validate(&input, json),

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),

        Commands::Schema {
            schema_type,
            json_schema,
        } => cmd_schema(schema_type, json_schema),
    }
}

fn load_config(args: &EngineArgs) -> Result<EngineConfig, FocusCliError> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_json(&fs::read_to_string(path)?)?,
        None => EngineConfig::default(),
    };

    if let Some(secs) = args.gaze_away_secs {
        config.gaze_away_threshold_secs = secs;
    }
    if let Some(threshold) = args.confusion_threshold {
        config.confusion_threshold = threshold;
    }
    if let Some(window) = args.gaze_window {
        config.gaze_window = window;
    }

    config.validate()?;
    Ok(config)
}

fn read_input(input: &Path) -> Result<String, FocusCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn cmd_transform(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    engine_args: &EngineArgs,
) -> Result<(), FocusCliError> {
    let config = load_config(engine_args)?;
    let input_data = read_input(input)?;

    let observations = match input_format {
        InputFormat::Ndjson => ObservationReader::parse_ndjson(&input_data)?,
        InputFormat::Json => ObservationReader::parse_array(&input_data)?,
    };

    if observations.is_empty() {
        return Err(FocusCliError::NoObservations);
    }

    let results = synheart_focus::replay_observations(&observations, config)?;
    info!("classified {} observations", results.len());

    let output_data = format_output(&results, &output_format)?;

    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_run(
    envelope: bool,
    strict: bool,
    flush: bool,
    engine_args: &EngineArgs,
) -> Result<(), FocusCliError> {
    let engine = AttentionEngine::new(load_config(engine_args)?)?;
    let encoder = EnvelopeEncoder::new();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for (index, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let observation = match ObservationReader::parse_line(&line, index + 1) {
            Ok(observation) => observation,
            Err(e) if strict => return Err(e.into()),
            Err(e) => {
                warn!("skipping line {}: {e}", index + 1);
                continue;
            }
        };

        let result = engine.ingest(&observation, Utc::now())?;
        let encoded = if envelope {
            encoder.encode(&OutboundMessage::AnalysisResult(result))?
        } else {
            serde_json::to_string(&result)?
        };

        writeln!(stdout, "{}", encoded)?;
        if flush {
            stdout.flush()?;
        }
    }

    stdout.flush()?;
    Ok(())
}

fn cmd_validate(input: &Path, json: bool) -> Result<(), FocusCliError> {
    let input_data = read_input(input)?;

    let mut total = 0;
    let mut errors = Vec::new();
    for (index, line) in input_data.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        total += 1;
        if let Err(e) = ObservationReader::parse_line(line, index + 1) {
            errors.push(ValidationErrorDetail {
                line: index + 1,
                subject_id: subject_id_hint(line),
                error: e.to_string(),
            });
        }
    }

    let report = ValidationReport {
        total_observations: total,
        valid_observations: total - errors.len(),
        invalid_observations: errors.len(),
        errors,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total observations:   {}", report.total_observations);
        println!("Valid observations:   {}", report.valid_observations);
        println!("Invalid observations: {}", report.invalid_observations);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!(
                    "  - Subject {} (line {}): {}",
                    err.subject_id.as_deref().unwrap_or("unknown"),
                    err.line,
                    err.error
                );
            }
        }
    }

    if report.invalid_observations > 0 {
        Err(FocusCliError::ValidationFailed(report.invalid_observations))
    } else {
        Ok(())
    }
}

/// Best-effort subject id of a line that failed validation
fn subject_id_hint(line: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(line)
        .ok()?
        .get("subject_id")?
        .as_str()
        .map(str::to_string)
}

fn cmd_doctor(config: Option<&Path>, json: bool) -> Result<(), FocusCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "focus_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Focus version {}", FOCUS_VERSION),
    });

    checks.push(DoctorCheck {
        name: "schema_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Input schema: {}", SCHEMA_VERSION),
    });

    if let Some(config_path) = config {
        let check = if !config_path.exists() {
            DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Warning,
                message: "Config file does not exist".to_string(),
            }
        } else {
            match fs::read_to_string(config_path) {
                Ok(content) => match EngineConfig::from_json(&content) {
                    Ok(parsed) => DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Ok,
                        message: format!(
                            "Config valid (gaze window {}, look-away alert after {}s)",
                            parsed.gaze_window, parsed.gaze_away_threshold_secs
                        ),
                    },
                    Err(e) => DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Error,
                        message: format!("Invalid config: {}", e),
                    },
                },
                Err(e) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot read config file: {}", e),
                },
            }
        };
        checks.push(check);
    }

    // The CLI only replays precomputed landmarks
    checks.push(DoctorCheck {
        name: "landmark_provider".to_string(),
        status: CheckStatus::Warning,
        message: "No landmark backend linked; only precomputed observations are accepted"
            .to_string(),
    });

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

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: FOCUS_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Focus Doctor Report");
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
        Err(FocusCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), FocusCliError> {
    match schema_type {
        SchemaType::Input => {
            if json_schema {
                println!("{}", get_input_json_schema());
            } else {
                println!("Input Schema: {}", SCHEMA_VERSION);
                println!();
                println!("One observation per frame:");
                println!();
                println!("- subject_id: Opaque subject identifier");
                println!("- frame_width, frame_height: Frame size in pixels");
                println!("- face_count: Faces visible in the frame");
                println!("- landmarks: {{ \"<id>\": {{ x, y }} }} normalized to [0, 1], or null");
                println!("- captured_at: Optional RFC 3339 capture time");
                println!();
                println!("Landmark ids follow the MediaPipe face mesh with refined iris");
                println!("(irises 468 and 473).");
            }
        }
        SchemaType::Output => {
            if json_schema {
                println!("{}", get_output_json_schema());
            } else {
                println!("Output Schema: analysis result");
                println!();
                println!("- subject_id, timestamp");
                println!("- status: unknown | good | warning | alert");
                println!("- alert_type: no_face_detected | multiple_faces | gaze_away | confused | null");
                println!("- message, confidence");
                println!("- gaze_direction: center | left | right | up | down");
                println!("- emotion: neutral | happy | focused | confused");
                println!("- confusion_score, confusion_indicators");
                println!("- engagement_level: unknown | struggling | engaged | focused");
                println!("- face_count, face_detected, multiple_faces, landmarks_detected, gaze_away");
            }
        }
    }

    Ok(())
}

// Helper functions

fn format_output(
    results: &[AnalysisResult],
    format: &OutputFormat,
) -> Result<String, FocusCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for result in results {
                lines.push(serde_json::to_string(result)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(results)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(results)?),
    }
}

fn get_input_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "$id": "https://synheart.ai/schemas/focus.observation.v1.json",
        "title": "focus.observation.v1",
        "description": "Synheart Focus per-frame landmark observation",
        "type": "object",
        "required": ["subject_id", "frame_width", "frame_height", "face_count"],
        "properties": {
            "schema_version": { "type": "string", "const": SCHEMA_VERSION },
            "subject_id": { "type": "string", "minLength": 1 },
            "frame_width": { "type": "integer", "minimum": 1 },
            "frame_height": { "type": "integer", "minimum": 1 },
            "face_count": { "type": "integer", "minimum": 0 },
            "landmarks": {
                "type": ["object", "null"],
                "additionalProperties": {
                    "type": "object",
                    "required": ["x", "y"],
                    "properties": {
                        "x": { "type": "number" },
                        "y": { "type": "number" }
                    }
                }
            },
            "captured_at": { "type": "string", "format": "date-time" }
        }
    })
    .to_string()
}

fn get_output_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "$id": "https://synheart.ai/schemas/focus.analysis_result.v1.json",
        "title": "focus.analysis_result.v1",
        "description": "Synheart Focus per-frame engagement verdict",
        "type": "object",
        "required": ["subject_id", "timestamp", "status", "confidence"],
        "properties": {
            "subject_id": { "type": "string" },
            "timestamp": { "type": "string", "format": "date-time" },
            "status": { "enum": ["unknown", "good", "warning", "alert"] },
            "alert_type": {
                "enum": ["no_face_detected", "multiple_faces", "gaze_away", "confused", null]
            },
            "message": { "type": "string" },
            "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
            "gaze_direction": { "enum": ["center", "left", "right", "up", "down"] },
            "emotion": { "enum": ["neutral", "happy", "focused", "confused"] },
            "confusion_score": { "type": "number", "minimum": 0, "maximum": 1 },
            "confusion_indicators": { "type": "array", "items": { "type": "string" } },
            "engagement_level": { "enum": ["unknown", "struggling", "engaged", "focused"] },
            "face_count": { "type": "integer" },
            "face_detected": { "type": "boolean" },
            "multiple_faces": { "type": "boolean" },
            "landmarks_detected": { "type": "boolean" },
            "gaze_away": { "type": "boolean" }
        }
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum FocusCliError {
    Io(io::Error),
    Compute(ComputeError),
    Json(serde_json::Error),
    NoObservations,
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for FocusCliError {
    fn from(e: io::Error) -> Self {
        FocusCliError::Io(e)
    }
}

impl From<ComputeError> for FocusCliError {
    fn from(e: ComputeError) -> Self {
        FocusCliError::Compute(e)
    }
}

impl From<serde_json::Error> for FocusCliError {
    fn from(e: serde_json::Error) -> Self {
        FocusCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<FocusCliError> for CliError {
    fn from(e: FocusCliError) -> Self {
        match e {
            FocusCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            FocusCliError::Compute(e) => {
                let (code, hint) = match &e {
                    ComputeError::ConfigError(_) => {
                        ("CONFIG_ERROR", "Run 'focus doctor --config <file>' for details")
                    }
                    ComputeError::DecodeError(_) | ComputeError::JsonError(_) => {
                        ("PARSE_ERROR", "Ensure input matches focus.observation.v1 schema")
                    }
                    ComputeError::InvalidFrame(_) => {
                        ("VALIDATION_ERROR", "Run 'focus validate' for details")
                    }
                    _ => ("COMPUTE_ERROR", "Check input data"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            FocusCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            FocusCliError::NoObservations => CliError {
                code: "NO_OBSERVATIONS".to_string(),
                message: "No observations found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            FocusCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} observations failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            FocusCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_observations: usize,
    valid_observations: usize,
    invalid_observations: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    line: usize,
    subject_id: Option<String>,
    error: String,
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
