use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum NwbBatchError {
    #[error("no spreadsheet path given and prompting is disabled (pass --excel_path)")]
    MissingSpreadsheetPath,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to open spreadsheet {path}: {message}")]
    SpreadsheetOpen { path: PathBuf, message: String },

    #[error("spreadsheet {0} contains no worksheets")]
    EmptyWorkbook(PathBuf),

    #[error("spreadsheet {0} has no header row")]
    MissingHeader(PathBuf),

    #[error("missing column: {0}")]
    MissingColumn(String),

    #[error("experiment id {0:?} cannot be used as a file name")]
    UnsafeExperimentId(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("converter failed: {0}")]
    ConverterFailed(String),

    #[error("invalid converter metadata: {0}")]
    ConverterMetadata(String),

    #[error("failed to write error report: {0}")]
    ErrorReport(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
