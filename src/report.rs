use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Serialize, Serializer};

use crate::app::{ProgressEvent, ProgressSink};
use crate::error::NwbBatchError;

/// Append-only run log. Every line reopens the file so it can be tailed
/// while the batch runs.
#[derive(Debug, Clone)]
pub struct RunLog {
    path: Utf8PathBuf,
    console: bool,
}

impl RunLog {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self {
            path,
            console: true,
        }
    }

    /// Writes to the file only.
    pub fn quiet(path: Utf8PathBuf) -> Self {
        Self {
            path,
            console: false,
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Writes the event to the file and, unless quiet, to stdout.
    pub fn record(&self, event: &ProgressEvent) -> Result<(), NwbBatchError> {
        if self.console {
            if event.separated {
                println!();
            }
            println!("{}", event.message);
        }
        self.write_line(&event.message, event.separated)
    }

    fn write_line(&self, message: &str, separated: bool) -> Result<(), NwbBatchError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.as_std_path())
            .map_err(|err| NwbBatchError::Filesystem(format!("open {}: {err}", self.path)))?;
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let blank = if separated { "\n" } else { "" };
        writeln!(file, "{blank}[{timestamp}] {message}")
            .map_err(|err| NwbBatchError::Filesystem(format!("write {}: {err}", self.path)))
    }
}

impl ProgressSink for RunLog {
    fn event(&self, event: ProgressEvent) {
        if let Err(err) = self.record(&event) {
            tracing::warn!(error = %err, "failed to append to run log");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    NoValidFiles,
    ConversionError(String),
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::NoValidFiles => write!(f, "no_valid_files"),
            ErrorCategory::ConversionError(message) => write!(f, "conversion_error: {message}"),
        }
    }
}

impl Serialize for ErrorCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One row of the error report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    #[serde(rename = "EXPERIMENT ID")]
    pub experiment_id: String,
    #[serde(rename = ".abf file")]
    pub abf_file: Option<String>,
    pub error_type: ErrorCategory,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total_experiments: usize,
    pub successful: usize,
    pub failed: usize,
}

impl RunSummary {
    /// Percentage of successful experiments, `None` for an empty run.
    pub fn success_rate(&self) -> Option<f64> {
        (self.total_experiments > 0)
            .then(|| self.successful as f64 / self.total_experiments as f64 * 100.0)
    }
}

/// Writes the error report through a temporary file so a partial CSV never
/// appears under the final name. Returns the number of rows written.
pub fn write_error_csv(path: &Utf8Path, records: &[ErrorRecord]) -> Result<usize, NwbBatchError> {
    let parent = path
        .parent()
        .ok_or_else(|| NwbBatchError::ErrorReport(format!("invalid report path {path}")))?;
    let temp = tempfile::Builder::new()
        .prefix("nwb-batch-errors")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| NwbBatchError::ErrorReport(err.to_string()))?;

    let mut writer = csv::Writer::from_writer(temp);
    for record in records {
        writer
            .serialize(record)
            .map_err(|err| NwbBatchError::ErrorReport(err.to_string()))?;
    }
    let temp = writer
        .into_inner()
        .map_err(|err| NwbBatchError::ErrorReport(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| NwbBatchError::ErrorReport(err.to_string()))?;
    Ok(records.len())
}
