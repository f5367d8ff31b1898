use std::path::{Path, PathBuf};
use std::process::ExitCode;

use bfda::config::{Config, Profile, ServeArgs};
use bfda::core::{ExportPayload, assumptions_of, stamp, validate_assumption_ranges};
use bfda::report::{render_document, render_workbook};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Value, json};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "bfda")]
#[command(about = "Economic damages reporting service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve(ServeArgs),
    /// Range-check an assumptions file and print its provenance stamp
    Validate {
        /// JSON file holding assumptions (bare or under an `assumptions` key)
        assumptions: PathBuf,
    },
    /// Render an export payload to a document or workbook
    Export {
        /// JSON export payload
        payload: PathBuf,

        #[arg(long, value_enum, default_value_t = ExportFormat::Docx)]
        format: ExportFormat,

        /// Output path; defaults to the artifact's own filename
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ExportFormat {
    Docx,
    Xlsx,
}

fn init_tracing(profile: Profile) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| profile.log_directive().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn read_json(path: &Path) -> Result<Value, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("invalid JSON in {}: {e}", path.display()))
}

fn validate(path: &Path) -> Result<bool, String> {
    let body = read_json(path)?;
    let assumptions = assumptions_of(&body);
    let violations = validate_assumption_ranges(assumptions);
    let report = json!({
        "violations": violations,
        "provenance": stamp(assumptions),
    });
    let text = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
    println!("{text}");
    Ok(violations.is_empty())
}

fn export(path: &Path, format: ExportFormat, out: Option<PathBuf>) -> Result<(), String> {
    let payload = ExportPayload::from_json(&read_json(path)?).map_err(|e| e.to_string())?;
    let now = Utc::now();
    let report = match format {
        ExportFormat::Docx => render_document(&payload, now),
        ExportFormat::Xlsx => render_workbook(&payload, now),
    }
    .map_err(|e| e.to_string())?;

    for warning in &report.warnings {
        warn!(section = %warning.section, error = %warning.error, "section omitted");
    }
    let out = out.unwrap_or_else(|| PathBuf::from(&report.filename));
    std::fs::write(&out, &report.bytes)
        .map_err(|e| format!("cannot write {}: {e}", out.display()))?;
    info!(
        path = %out.display(),
        bytes = report.bytes.len(),
        warnings = report.warnings.len(),
        "export written"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => {
            let config = Config::from_args(args);
            init_tracing(config.profile);
            if let Err(e) = bfda::api::run_http_server(config).await {
                eprintln!("Server error: {e}");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Command::Validate { assumptions } => {
            init_tracing(Profile::default());
            match validate(&assumptions) {
                Ok(true) => ExitCode::SUCCESS,
                Ok(false) => ExitCode::from(2),
                Err(e) => {
                    eprintln!("{e}");
                    ExitCode::FAILURE
                }
            }
        }
        Command::Export {
            payload,
            format,
            out,
        } => {
            init_tracing(Profile::default());
            match export(&payload, format, out) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("Export failed: {e}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}
