use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ExperimenterEntry;
use crate::error::NwbBatchError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingSession {
    pub abf_file_name: String,
    pub stimulus_type: String,
    pub icephys_experiment_type: String,
}

/// Per-experiment intracellular metadata handed to the converter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcephysMetadata {
    pub cell_id: String,
    pub slice_id: String,
    pub targeted_layer: String,
    pub inferred_layer: String,
    pub recording_sessions: Vec<RecordingSession>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NwbFileMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lab: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experimenter: Option<ExperimenterEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Converter defaults may carry any subset of these fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectMetadata {
    #[serde(default)]
    pub subject_id: String,
    #[serde(default)]
    pub species: String,
    #[serde(default)]
    pub genotype: String,
    #[serde(default)]
    pub sex: String,
    #[serde(default)]
    pub date_of_birth: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Metadata document in the converter's shape. Keys this crate does not
/// overlay (session start time, device info, ...) round-trip through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NwbMetadata {
    #[serde(rename = "NWBFile", default)]
    pub nwb_file: NwbFileMetadata,
    #[serde(rename = "Subject", default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<SubjectMetadata>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Decodes ABF recordings and writes NWB files.
pub trait AbfConverter: Send + Sync {
    fn default_metadata(
        &self,
        file_paths: &[PathBuf],
        icephys: &IcephysMetadata,
    ) -> Result<NwbMetadata, NwbBatchError>;

    fn run_conversion(
        &self,
        file_paths: &[PathBuf],
        icephys: &IcephysMetadata,
        nwbfile_path: &Path,
        metadata: &NwbMetadata,
    ) -> Result<(), NwbBatchError>;
}

#[derive(Debug, Serialize)]
struct ConversionRequest<'a> {
    file_paths: &'a [PathBuf],
    icephys_metadata: &'a IcephysMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    nwbfile_path: Option<&'a Path>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a NwbMetadata>,
}

/// Runs an external converter executable. Each call writes a JSON request
/// file and passes it as `<program> <action> --request <file>`.
#[derive(Debug, Clone)]
pub struct SystemConverter {
    program: PathBuf,
}

impl SystemConverter {
    /// Accepts a path to an existing executable or a bare name looked up on
    /// `PATH`.
    pub fn locate(program: &str) -> Result<Self, NwbBatchError> {
        let candidate = Path::new(program);
        let resolved = if candidate.components().count() > 1 {
            candidate.exists().then(|| candidate.to_path_buf())
        } else {
            find_in_path(program)
        };
        resolved
            .map(|program| Self { program })
            .ok_or_else(|| NwbBatchError::MissingTool(program.to_string()))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn invoke(
        &self,
        action: &str,
        request: &ConversionRequest<'_>,
    ) -> Result<Vec<u8>, NwbBatchError> {
        let mut file = tempfile::Builder::new()
            .prefix("nwb-batch-request")
            .suffix(".json")
            .tempfile()
            .map_err(|err| NwbBatchError::Filesystem(err.to_string()))?;
        serde_json::to_writer_pretty(&mut file, request)
            .map_err(|err| NwbBatchError::Filesystem(err.to_string()))?;
        file.flush()
            .map_err(|err| NwbBatchError::Filesystem(err.to_string()))?;

        tracing::debug!(
            program = %self.program.display(),
            action,
            request = %file.path().display(),
            "invoking converter"
        );
        let output = Command::new(&self.program)
            .arg(action)
            .arg("--request")
            .arg(file.path())
            .output()
            .map_err(|err| NwbBatchError::ConverterFailed(err.to_string()))?;
        if output.status.success() {
            return Ok(output.stdout);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("{} {action} exited with {}", self.program.display(), output.status)
        } else {
            stderr
        };
        Err(NwbBatchError::ConverterFailed(message))
    }
}

impl AbfConverter for SystemConverter {
    fn default_metadata(
        &self,
        file_paths: &[PathBuf],
        icephys: &IcephysMetadata,
    ) -> Result<NwbMetadata, NwbBatchError> {
        let stdout = self.invoke(
            "metadata",
            &ConversionRequest {
                file_paths,
                icephys_metadata: icephys,
                nwbfile_path: None,
                metadata: None,
            },
        )?;
        serde_json::from_slice(&stdout)
            .map_err(|err| NwbBatchError::ConverterMetadata(err.to_string()))
    }

    fn run_conversion(
        &self,
        file_paths: &[PathBuf],
        icephys: &IcephysMetadata,
        nwbfile_path: &Path,
        metadata: &NwbMetadata,
    ) -> Result<(), NwbBatchError> {
        self.invoke(
            "convert",
            &ConversionRequest {
                file_paths,
                icephys_metadata: icephys,
                nwbfile_path: Some(nwbfile_path),
                metadata: Some(metadata),
            },
        )?;
        Ok(())
    }
}

/// Stands in for the converter during dry runs; every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopConverter;

impl AbfConverter for NopConverter {
    fn default_metadata(
        &self,
        _file_paths: &[PathBuf],
        _icephys: &IcephysMetadata,
    ) -> Result<NwbMetadata, NwbBatchError> {
        Err(NwbBatchError::MissingTool(
            "converter not configured".to_string(),
        ))
    }

    fn run_conversion(
        &self,
        _file_paths: &[PathBuf],
        _icephys: &IcephysMetadata,
        _nwbfile_path: &Path,
        _metadata: &NwbMetadata,
    ) -> Result<(), NwbBatchError> {
        Err(NwbBatchError::MissingTool(
            "converter not configured".to_string(),
        ))
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_keeps_unknown_keys() {
        let json = r#"{
            "NWBFile": {"session_start_time": "2024-01-01T00:00:00", "identifier": "x"},
            "Icephys": {"Device": []}
        }"#;
        let metadata: NwbMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.nwb_file.identifier.as_deref(), Some("x"));
        assert!(metadata.nwb_file.extra.contains_key("session_start_time"));
        assert!(metadata.extra.contains_key("Icephys"));
        assert!(metadata.subject.is_none());

        let back = serde_json::to_value(&metadata).unwrap();
        assert_eq!(back["NWBFile"]["session_start_time"], "2024-01-01T00:00:00");
        assert!(back.get("Subject").is_none());
    }

    #[test]
    fn partial_subject_and_single_experimenter_parse() {
        let json = r#"{
            "NWBFile": {"experimenter": "Doe, J"},
            "Subject": {"species": "Mus musculus", "age": "P30"}
        }"#;
        let metadata: NwbMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(
            metadata.nwb_file.experimenter,
            Some(ExperimenterEntry::Shorthand("Doe, J".to_string()))
        );
        let subject = metadata.subject.unwrap();
        assert_eq!(subject.species, "Mus musculus");
        assert_eq!(subject.subject_id, "");
        assert_eq!(subject.extra["age"], "P30");
    }

    #[test]
    fn missing_tool_is_reported() {
        let err = SystemConverter::locate("nwb-batch-no-such-converter").unwrap_err();
        assert!(matches!(err, NwbBatchError::MissingTool(_)));
    }
}
