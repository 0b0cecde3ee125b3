//! renewsheet CLI - Renewal workbook processor
//!
//! Command-line interface for turning renewal exports into tracked,
//! color-coded Excel workbooks.

mod batch;
mod report;

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use renewsheet_core::Config;

use crate::batch::{BatchJob, Pipeline};
use crate::report::{ExitCode, ReportFormat};

const DEFAULT_CONFIG_FILE: &str = "renewsheet.toml";
const PASSWORD_ENV: &str = "RENEWSHEET_PASSWORD";

#[derive(Parser)]
#[command(name = "renewsheet")]
#[command(author, version, about = "Renewal workbook processor", long_about = None)]
struct Cli {
    /// Verbose output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process renewal exports into tracked workbooks
    Process {
        /// Input workbook paths
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Directory for the generated workbooks
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,

        /// Read the password for protected workbooks from the first line of
        /// stdin (otherwise RENEWSHEET_PASSWORD is used when set)
        #[arg(long)]
        password_stdin: bool,

        /// Configuration file (defaults to ./renewsheet.toml when present)
        #[arg(short, long, value_name = "CONFIG")]
        config: Option<PathBuf>,

        /// Append logs to this file instead of the configured one
        #[arg(long, value_name = "PATH")]
        log_file: Option<PathBuf>,

        /// Do not write a log file
        #[arg(long, conflicts_with = "log_file")]
        no_log_file: bool,

        /// Report format
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },

    /// Print the default configuration as TOML
    Config {
        /// Write to this file instead of stdout (never overwrites)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the state colors and dropdown lists that will be applied
    States {
        /// Configuration file (defaults to ./renewsheet.toml when present)
        #[arg(short, long, value_name = "CONFIG")]
        config: Option<PathBuf>,
    },
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Process {
            files,
            output,
            password_stdin,
            config,
            log_file,
            no_log_file,
            format,
        } => load_config(config.as_deref()).and_then(|config| {
            let log_file = if no_log_file {
                None
            } else {
                log_file.or_else(|| config.logging.file.clone())
            };
            init_logging(cli.verbose, log_file.as_deref());
            let password = read_password(password_stdin, io::stdin().lock())?;
            let jobs = BatchJob::for_inputs(files, &output, password.as_deref());
            cmd_process(&config, &jobs, format)
        }),
        Commands::Config { output } => {
            init_logging(cli.verbose, None);
            cmd_config(output.as_deref())
        }
        Commands::States { config } => {
            init_logging(cli.verbose, None);
            load_config(config.as_deref()).and_then(|config| cmd_states(&config))
        }
    };

    match result {
        Ok(code) => code.into(),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::Failure.into()
        }
    }
}

/// Install the stderr layer and, when a path is given, an appending file layer
fn init_logging(verbose: u8, log_file: Option<&Path>) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let mut open_error = None;
    let file_layer = log_file.and_then(|path| match open_log(path) {
        Ok(file) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        ),
        Err(e) => {
            open_error = Some(format!("cannot open log file {}: {e}", path.display()));
            None
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .with(file_layer)
        .init();

    if let Some(message) = open_error {
        warn!("{message}");
    }
}

fn open_log(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Explicit path, else `./renewsheet.toml` when present, else defaults
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load configuration {}", path.display())),
        None => {
            let local = Path::new(DEFAULT_CONFIG_FILE);
            if local.is_file() {
                Config::load(local).with_context(|| format!("failed to load {DEFAULT_CONFIG_FILE}"))
            } else {
                Ok(Config::default())
            }
        }
    }
}

/// First stdin line when asked, else `RENEWSHEET_PASSWORD`; never argv
fn read_password(from_stdin: bool, mut stdin: impl BufRead) -> Result<Option<String>> {
    let password = if from_stdin {
        let mut line = String::new();
        stdin
            .read_line(&mut line)
            .context("failed to read password from stdin")?;
        line.trim_end_matches(['\r', '\n']).to_string()
    } else {
        std::env::var(PASSWORD_ENV).unwrap_or_default()
    };
    Ok(Some(password).filter(|p| !p.is_empty()))
}

fn cmd_process(config: &Config, jobs: &[BatchJob], format: ReportFormat) -> Result<ExitCode> {
    let pipeline = Pipeline::from_config(config).context("invalid configuration")?;
    debug!(files = jobs.len(), "starting batch");

    let report = pipeline.run(jobs);
    report
        .write(format, io::stdout().lock())
        .context("failed to print report")?;
    Ok(report.exit_code())
}

fn cmd_config(output: Option<&Path>) -> Result<ExitCode> {
    let text = Config::default().to_toml()?;
    match output {
        Some(path) => {
            if path.exists() {
                bail!("{} already exists; refusing to overwrite", path.display());
            }
            std::fs::write(path, text)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Wrote default configuration to {}", path.display());
        }
        None => print!("{text}"),
    }
    Ok(ExitCode::Success)
}

fn cmd_states(config: &Config) -> Result<ExitCode> {
    let rules = config.formatting_rules()?;
    let mut out = io::stdout().lock();

    writeln!(out, "States ({} column):", rules.tracking().state)?;
    for state in rules.states() {
        writeln!(out, "  {:<20} {}", state.name, state.color.hex())?;
    }

    let mut constrained: Vec<(String, Vec<String>)> = Vec::new();
    for label in [
        &rules.tracking().notes_filed,
        &rules.tracking().completed_by,
    ]
    .into_iter()
    .chain(config.dropdowns.keys())
    {
        let options = rules.dropdown_options(label);
        if !options.is_empty() && !constrained.iter().any(|(l, _)| l == label) {
            constrained.push((label.clone(), options));
        }
    }
    if !constrained.is_empty() {
        writeln!(out, "Dropdowns:")?;
        for (label, options) in constrained {
            writeln!(out, "  {label}: {}", options.join(", "))?;
        }
    }
    Ok(ExitCode::Success)
}
