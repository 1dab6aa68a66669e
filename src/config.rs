use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::NwbBatchError;

pub const DEFAULT_LAB: &str = "Tzounopoulos Lab";
pub const DEFAULT_INSTITUTION: &str = "University of Pittsburgh";
pub const DEFAULT_EXPERIMENTER: &[&str] = &["Yanjun Zhao"];
pub const DEFAULT_CONVERTER: &str = "abf2nwb";
pub const DEFAULT_CONFIG_FILE: &str = "nwb-batch.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub lab: Option<String>,
    #[serde(default)]
    pub institution: Option<String>,
    #[serde(default)]
    pub experimenter: Option<ExperimenterEntry>,
    #[serde(default)]
    pub converter: Option<String>,
}

/// One name or a list of names; both spellings appear in config files and
/// converter metadata.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ExperimenterEntry {
    Shorthand(String),
    List(Vec<String>),
}

impl ExperimenterEntry {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            ExperimenterEntry::Shorthand(name) => vec![name],
            ExperimenterEntry::List(names) => names,
        }
    }
}

/// Values supplied on the command line. `None` falls through to the config
/// file, then to the built-in default.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub lab: Option<String>,
    pub institution: Option<String>,
    pub experimenter: Option<Vec<String>>,
    pub converter: Option<String>,
}

/// Settings for one run, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub schema_version: u32,
    pub lab: String,
    pub institution: String,
    pub experimenter: Vec<String>,
    pub converter: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        ConfigLoader::resolve_config(Config::default(), ConfigOverrides::default())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(
        path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<RunConfig, NwbBatchError> {
        let config = Self::load(path)?;
        Ok(Self::resolve_config(config, overrides))
    }

    /// Reads the config file. Without an explicit path a missing
    /// `nwb-batch.json` just means defaults.
    pub fn load(path: Option<&str>) -> Result<Config, NwbBatchError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| NwbBatchError::ConfigRead(config_path.clone()))?;
        tracing::debug!(path = %config_path.display(), "loaded config file");
        serde_json::from_str(&content).map_err(|err| NwbBatchError::ConfigParse(err.to_string()))
    }

    pub fn resolve_config(config: Config, overrides: ConfigOverrides) -> RunConfig {
        let experimenter = overrides
            .experimenter
            .or_else(|| config.experimenter.map(ExperimenterEntry::into_vec))
            .filter(|names| !names.is_empty())
            .unwrap_or_else(default_experimenter);

        RunConfig {
            schema_version: config.schema_version.unwrap_or(1),
            lab: overrides
                .lab
                .or(config.lab)
                .unwrap_or_else(|| DEFAULT_LAB.to_string()),
            institution: overrides
                .institution
                .or(config.institution)
                .unwrap_or_else(|| DEFAULT_INSTITUTION.to_string()),
            experimenter,
            converter: overrides
                .converter
                .or(config.converter)
                .unwrap_or_else(|| DEFAULT_CONVERTER.to_string()),
        }
    }
}

pub fn default_experimenter() -> Vec<String> {
    DEFAULT_EXPERIMENTER
        .iter()
        .map(|name| name.to_string())
        .collect()
}

/// Spreadsheet and raw-data locations for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPaths {
    pub excel_path: PathBuf,
    pub data_dir: PathBuf,
    /// Set when the data directory was derived from the spreadsheet path.
    pub data_dir_defaulted: bool,
}

impl InputPaths {
    /// Falls back to `prompt` when no spreadsheet path was given. The path is
    /// not checked here; opening it later reports a bad path.
    pub fn resolve<F>(
        excel_path: Option<PathBuf>,
        data_path: Option<PathBuf>,
        prompt: F,
    ) -> Result<Self, NwbBatchError>
    where
        F: FnOnce() -> Result<String, NwbBatchError>,
    {
        let excel_path = match excel_path {
            Some(path) => path,
            None => PathBuf::from(prompt()?.trim()),
        };

        let (data_dir, data_dir_defaulted) = match data_path {
            Some(path) => (path, false),
            None => (spreadsheet_parent(&excel_path), true),
        };

        Ok(Self {
            excel_path,
            data_dir,
            data_dir_defaulted,
        })
    }
}

fn spreadsheet_parent(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
