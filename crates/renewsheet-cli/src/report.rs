//! Batch report output
//!
//! The batch driver collects one `FileOutcome` per input. This module turns
//! the finished report into either human-readable lines or a JSON document,
//! and decides the process exit code.
//!
//! ## Exit Code Semantics
//!
//! | Exit Code | Meaning |
//! |-----------|---------|
//! | 0 | Every input file was written |
//! | 1 | At least one file failed, or the run could not start |
//!
//! `--format json` changes the output only, never the exit code.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

use clap::ValueEnum;
use serde::Serialize;

use renewsheet_core::RenewalError;

// ============================================================================
// Exit Code
// ============================================================================

/// Exit codes for CLI operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    Failure = 1,
}

impl ExitCode {
    pub fn from_failure_count(count: usize) -> Self {
        if count > 0 {
            ExitCode::Failure
        } else {
            ExitCode::Success
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Success)
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code as u8)
    }
}

// ============================================================================
// Report
// ============================================================================

/// Output format for the batch report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

/// Result of processing one input file
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    Processed { output: PathBuf, rows: usize },
    Failed { kind: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileOutcome {
    pub input: PathBuf,
    #[serde(flatten)]
    pub status: FileStatus,
}

impl FileOutcome {
    pub fn processed(input: &Path, output: PathBuf, rows: usize) -> Self {
        Self {
            input: input.to_path_buf(),
            status: FileStatus::Processed { output, rows },
        }
    }

    pub fn failed(input: &Path, error: &RenewalError) -> Self {
        Self {
            input: input.to_path_buf(),
            status: FileStatus::Failed {
                kind: error.kind().as_str().to_string(),
                message: error.to_string(),
            },
        }
    }

    pub fn is_processed(&self) -> bool {
        matches!(self.status, FileStatus::Processed { .. })
    }
}

/// Everything a batch run produced
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    /// Files written successfully
    pub processed: usize,
    pub failed: usize,
    pub files: Vec<FileOutcome>,
}

impl BatchReport {
    pub fn push(&mut self, outcome: FileOutcome) {
        if outcome.is_processed() {
            self.processed += 1;
        } else {
            self.failed += 1;
        }
        self.files.push(outcome);
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from_failure_count(self.failed)
    }

    /// `Files processed: N` followed by one line per input
    pub fn write_text<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        writeln!(writer, "Files processed: {}", self.processed)?;
        for file in &self.files {
            match &file.status {
                FileStatus::Processed { output, rows } => writeln!(
                    writer,
                    "  ok    {} -> {} ({rows} rows)",
                    file.input.display(),
                    output.display()
                )?,
                FileStatus::Failed { kind, message } => writeln!(
                    writer,
                    "  error {}: {kind}: {message}",
                    file.input.display()
                )?,
            }
        }
        Ok(())
    }

    pub fn write_json<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer)
    }

    pub fn write<W: Write>(&self, format: ReportFormat, writer: W) -> std::io::Result<()> {
        match format {
            ReportFormat::Text => self.write_text(writer),
            ReportFormat::Json => self.write_json(writer),
        }
    }
}
