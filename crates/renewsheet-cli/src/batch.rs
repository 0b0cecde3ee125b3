//! Batch driver
//!
//! Runs every input through load, schema policy, augmentation and write.
//! A failing file is logged and recorded; the remaining files still run.

use std::path::{Path, PathBuf};

use tracing::{error, info, info_span};

use renewsheet_core::{augment, Config, FormattingRules, RenewalError, SchemaPolicy, TrackingColumns};
use renewsheet_loader::{CommandDecryptor, Decryptor, WorkbookLoader};
use renewsheet_render::WorkbookWriter;

use crate::report::{BatchReport, FileOutcome};

/// One file to process
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub password: Option<String>,
}

impl BatchJob {
    /// One job per input, all sharing a destination and password
    pub fn for_inputs(
        inputs: Vec<PathBuf>,
        output_dir: &Path,
        password: Option<&str>,
    ) -> Vec<Self> {
        inputs
            .into_iter()
            .map(|input| Self {
                input,
                output_dir: output_dir.to_path_buf(),
                password: password.map(str::to_string),
            })
            .collect()
    }
}

/// Load, reshape and write renewal workbooks
pub struct Pipeline<D = CommandDecryptor> {
    loader: WorkbookLoader<D>,
    policy: SchemaPolicy,
    tracking: TrackingColumns,
    rules: FormattingRules,
    writer: WorkbookWriter,
}

impl Pipeline<CommandDecryptor> {
    pub fn from_config(config: &Config) -> Result<Self, RenewalError> {
        Self::with_decryptor(config, CommandDecryptor::from_config(&config.decryption))
    }
}

impl<D: Decryptor> Pipeline<D> {
    pub fn with_decryptor(config: &Config, decryptor: D) -> Result<Self, RenewalError> {
        let policy = config.schema_policy();
        let mut loader = WorkbookLoader::new(decryptor).with_schema(policy.clone());
        if let Some(sheet) = &config.input.sheet {
            loader = loader.sheet(sheet);
        }
        if let Some(dir) = &config.decryption.temp_dir {
            loader = loader.temp_root(dir);
        }

        Ok(Self {
            loader,
            policy,
            tracking: config.tracking.columns(),
            rules: config.formatting_rules()?,
            writer: WorkbookWriter::from_config(&config.output),
        })
    }

    /// Process one file, returning the written path and row count
    pub fn process_file(
        &self,
        input: &Path,
        output_dir: &Path,
        password: Option<&str>,
    ) -> Result<(PathBuf, usize), RenewalError> {
        let dataset = self.loader.load(input, password)?;
        let dataset = self.policy.apply(dataset)?;
        let dataset = augment(dataset, &self.tracking);
        let rows = dataset.row_count();
        let output = self.writer.write(&dataset, &self.rules, output_dir)?;
        Ok((output, rows))
    }

    pub fn run(&self, jobs: &[BatchJob]) -> BatchReport {
        let mut report = BatchReport::default();
        for job in jobs {
            let input = &job.input;
            let span = info_span!("file", path = %input.display());
            let _enter = span.enter();

            match self.process_file(input, &job.output_dir, job.password.as_deref()) {
                Ok((output, rows)) => {
                    info!(output = %output.display(), rows, "processed");
                    report.push(FileOutcome::processed(input, output, rows));
                }
                Err(e) => {
                    error!(kind = %e.kind(), "{e}");
                    report.push(FileOutcome::failed(input, &e));
                }
            }
        }
        info!(
            processed = report.processed,
            failed = report.failed,
            "batch finished"
        );
        report
    }
}
