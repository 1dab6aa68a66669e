use std::fs;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, TimeZone};

use crate::domain::ExperimentId;
use crate::error::NwbBatchError;

pub const OUTPUT_DIR_NAME: &str = "nwb_files";

/// Where a run writes its artifacts: `<data dir>/nwb_files/` holding the
/// run log, the error report and one `.nwb` file per experiment.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    output_dir: Utf8PathBuf,
    stamp: String,
}

impl OutputLayout {
    pub fn new<Tz: TimeZone>(
        data_dir: &Path,
        started_at: &DateTime<Tz>,
    ) -> Result<Self, NwbBatchError>
    where
        Tz::Offset: std::fmt::Display,
    {
        let data_dir = Utf8PathBuf::from_path_buf(data_dir.to_path_buf())
            .map_err(|_| NwbBatchError::Filesystem("non-utf8 data path".to_string()))?;
        Ok(Self {
            output_dir: data_dir.join(OUTPUT_DIR_NAME),
            stamp: started_at.format("%Y%m%d_%H%M%S").to_string(),
        })
    }

    pub fn output_dir(&self) -> &Utf8Path {
        &self.output_dir
    }

    pub fn log_path(&self) -> Utf8PathBuf {
        self.output_dir.join(format!("conversion_log_{}.txt", self.stamp))
    }

    pub fn error_csv_path(&self) -> Utf8PathBuf {
        self.output_dir.join(format!("error_experiments_{}.csv", self.stamp))
    }

    /// Ids that would leave `nwb_files/` or need a subdirectory are rejected.
    pub fn nwb_path(&self, id: &ExperimentId) -> Result<Utf8PathBuf, NwbBatchError> {
        let name = id.as_str();
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(NwbBatchError::UnsafeExperimentId(name.to_string()));
        }
        Ok(self.output_dir.join(format!("{name}.nwb")))
    }

    pub fn ensure_output_dir(&self) -> Result<(), NwbBatchError> {
        fs::create_dir_all(self.output_dir.as_std_path())
            .map_err(|err| NwbBatchError::Filesystem(format!("create {}: {err}", self.output_dir)))
    }
}
