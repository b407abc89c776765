//! Binary entry point for inspecting and verifying counts snapshot files.
#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use sombra_counts::storage::counts::{
    decode_framed, CountsOptions, CountsSnapshot, EnvelopeHeader, FormatVersion, SnapshotCodec,
};
use sombra_counts::SombraError;
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "sombra-counts",
    version,
    about = "Inspect and verify Sombra counts snapshots",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(
        long,
        global = true,
        env = "SOMBRA_COUNTS_CONFIG",
        value_name = "TOML",
        help = "Counts options file; its format_version applies to --raw input"
    )]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Print the entries of a snapshot file")]
    Inspect {
        #[arg(value_name = "FILE")]
        path: PathBuf,

        #[arg(long, help = "Treat the file as a bare codec body without an envelope")]
        raw: bool,
    },

    #[command(about = "Check envelope, checksum and body of a snapshot file")]
    Verify {
        #[arg(value_name = "FILE")]
        path: PathBuf,

        #[arg(long, help = "Treat the file as a bare codec body without an envelope")]
        raw: bool,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("failed to load options: {0}")]
    Config(#[source] SombraError),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    Snapshot { path: PathBuf, source: SombraError },
    #[error("failed to render JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct InspectReport {
    path: String,
    framed: bool,
    format_version: u16,
    tx_id: u64,
    entry_count: usize,
    entries: Vec<EntryReport>,
}

#[derive(Serialize)]
struct EntryReport {
    kind: &'static str,
    key: String,
    values: Vec<i64>,
}

#[derive(Serialize)]
struct VerifyReport {
    path: String,
    success: bool,
    framed: bool,
    format_version: Option<u16>,
    tx_id: Option<u64>,
    entry_count: Option<usize>,
    error: Option<String>,
}

fn main() {
    init_tracing();
    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

fn run() -> Result<bool, CliError> {
    let cli = Cli::parse();
    let options = match &cli.config {
        Some(path) => CountsOptions::load(path).map_err(CliError::Config)?,
        None => CountsOptions::default(),
    };
    debug!(config = ?cli.config, format_version = ?options.format_version, "cli.counts.start");

    match cli.command {
        Command::Inspect { path, raw } => {
            let (header, snapshot) = load(&path, raw, options.format_version)
                .map_err(|source| match source {
                    LoadError::Io(source) => CliError::Read {
                        path: path.clone(),
                        source,
                    },
                    LoadError::Decode(source) => CliError::Snapshot {
                        path: path.clone(),
                        source,
                    },
                })?;
            let report = inspect_report(&path, header, options.format_version, &snapshot);
            emit(cli.format, &report, print_inspect_text)?;
            Ok(true)
        }
        Command::Verify { path, raw } => {
            let report = match load(&path, raw, options.format_version) {
                Ok((header, snapshot)) => VerifyReport {
                    path: path.display().to_string(),
                    success: true,
                    framed: header.is_some(),
                    format_version: Some(
                        header.map_or(options.format_version, |h| h.format).as_u16(),
                    ),
                    tx_id: Some(snapshot.tx_id()),
                    entry_count: Some(snapshot.len()),
                    error: None,
                },
                Err(LoadError::Io(source)) => {
                    return Err(CliError::Read { path, source });
                }
                Err(LoadError::Decode(err)) => VerifyReport {
                    path: path.display().to_string(),
                    success: false,
                    framed: !raw,
                    format_version: None,
                    tx_id: None,
                    entry_count: None,
                    error: Some(err.to_string()),
                },
            };
            emit(cli.format, &report, print_verify_text)?;
            Ok(report.success)
        }
    }
}

enum LoadError {
    Io(std::io::Error),
    Decode(SombraError),
}

fn load(
    path: &Path,
    raw: bool,
    raw_format: FormatVersion,
) -> Result<(Option<EnvelopeHeader>, CountsSnapshot), LoadError> {
    let bytes = fs::read(path).map_err(LoadError::Io)?;
    if raw {
        let snapshot = SnapshotCodec::new(raw_format)
            .decode(&bytes)
            .map_err(LoadError::Decode)?;
        Ok((None, snapshot))
    } else {
        let (header, snapshot) = decode_framed(&bytes).map_err(LoadError::Decode)?;
        Ok((Some(header), snapshot))
    }
}

fn inspect_report(
    path: &Path,
    header: Option<EnvelopeHeader>,
    raw_format: FormatVersion,
    snapshot: &CountsSnapshot,
) -> InspectReport {
    InspectReport {
        path: path.display().to_string(),
        framed: header.is_some(),
        format_version: header.map_or(raw_format, |h| h.format).as_u16(),
        tx_id: snapshot.tx_id(),
        entry_count: snapshot.len(),
        entries: snapshot
            .iter()
            .map(|(key, values)| EntryReport {
                kind: key.kind().name(),
                key: key.to_string(),
                values: values.to_vec(),
            })
            .collect(),
    }
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), CliError>
where
    T: Serialize,
    F: Fn(&T),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(value),
    }
    Ok(())
}

fn print_inspect_text(report: &InspectReport) {
    println!(
        "Snapshot {} (framed={} format=v{}) tx_id={} entries={}",
        report.path, report.framed, report.format_version, report.tx_id, report.entry_count
    );
    for entry in &report.entries {
        let values: Vec<String> = entry.values.iter().map(i64::to_string).collect();
        println!("  {} = [{}]", entry.key, values.join(", "));
    }
}

fn print_verify_text(report: &VerifyReport) {
    match &report.error {
        None => println!(
            "Verify {} => success=true tx_id={} entries={}",
            report.path,
            report.tx_id.unwrap_or_default(),
            report.entry_count.unwrap_or_default()
        ),
        Some(err) => println!("Verify {} => success=false: {err}", report.path),
    }
}
