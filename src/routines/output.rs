use crate::algorithms::Status;
use crate::routines::settings::Settings;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{create_dir_all, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Diagnostic state captured at the end of one epoch
#[derive(Debug, Clone, Serialize)]
pub struct EpochRecord {
    /// Epoch number, counted across fit and partial_fit calls
    pub epoch: usize,
    /// Samples folded into the statistics so far
    pub samples_seen: u64,
    /// Mean reconstruction error over the epoch's observed entries
    pub reconstruction_error: f64,
    /// Largest dictionary row norm after the epoch
    pub max_row_norm: f64,
}

/// An ordered log of per-epoch diagnostics
///
/// The log is advisory only; it never feeds back into the optimization.
#[derive(Debug, Clone, Default)]
pub struct EpochLog {
    records: Vec<EpochRecord>,
}

impl EpochLog {
    pub fn new() -> Self {
        EpochLog::default()
    }

    pub fn push(&mut self, record: EpochRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[EpochRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&EpochRecord> {
        self.records.last()
    }

    /// Write the epoch trace to `epochs.csv` in the output folder
    pub fn write(&self, settings: &Settings) -> Result<()> {
        let outputfile = OutputFile::new(&settings.output.path, "epochs.csv")?;
        let mut writer = csv::Writer::from_writer(outputfile.file);
        for record in &self.records {
            writer.serialize(record)?;
        }
        writer.flush().context("Failed to flush epoch trace")?;
        Ok(())
    }
}

/// The result of a fit call
///
/// Contains the diagnostic trace and final state of the run; the fitted
/// dictionary itself stays with the learner.
#[derive(Debug, Clone)]
pub struct FitReport {
    pub status: Status,
    pub epochs: usize,
    pub final_error: f64,
    pub log: EpochLog,
}

impl FitReport {
    pub fn converged_error(&self) -> f64 {
        self.final_error
    }

    /// Write the output files if enabled in the settings
    pub fn write_outputs(&self, settings: &Settings) -> Result<()> {
        if settings.output.write {
            tracing::debug!("Writing outputs to {:?}", settings.output.path);
            settings.write()?;
            self.log.write(settings).context("Failed to write epoch trace")?;
        }
        Ok(())
    }
}

/// An output file within the configured output folder
#[derive(Debug)]
pub struct OutputFile {
    pub file: File,
    pub relative_path: PathBuf,
}

impl OutputFile {
    pub fn new(folder: &str, file_name: &str) -> Result<Self> {
        let relative_path = Path::new(&folder).join(file_name);
        create_dir_all(relative_path.parent().unwrap_or(Path::new(".")))
            .with_context(|| format!("Failed to create folder {:?} for output", folder))?;

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&relative_path)
            .with_context(|| format!("Failed to open file {:?}", relative_path))?;

        Ok(OutputFile {
            file,
            relative_path,
        })
    }
}
