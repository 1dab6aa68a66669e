use std::path::{Path, PathBuf};

use camino::Utf8PathBuf;
use serde::Serialize;
use serde_json::Map;

use crate::config::{ExperimenterEntry, RunConfig};
use crate::converter::{
    AbfConverter, IcephysMetadata, NwbMetadata, RecordingSession, SubjectMetadata,
};
use crate::domain::{ExperimentGroup, MetadataRow, group_by_experiment};
use crate::error::NwbBatchError;
use crate::layout::OutputLayout;
use crate::report::{ErrorCategory, ErrorRecord, RunSummary, write_error_csv};
use crate::sheet::MetadataTable;

/// Columns read while the icephys metadata is built, before files are checked.
const ICEPHYS_COLUMNS: &[&str] = &[
    "cell_id",
    "slice_id",
    "targeted_layer",
    "stimulus_type",
    "icephys_experiment_type",
];

/// Columns read during the metadata overlay, after files are checked.
const SESSION_COLUMNS: &[&str] = &[
    "session_description",
    "subject_id",
    "species",
    "genotype",
    "sex",
    "date_of_birth",
];

const BANNER: &str = "==================================================";

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Info,
    Warning,
    Failure,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub kind: EventKind,
    pub message: String,
    /// Preceded by a blank line in the log and on the console.
    pub separated: bool,
}

impl ProgressEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Info,
            message: message.into(),
            separated: false,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Warning,
            message: message.into(),
            separated: false,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Failure,
            message: message.into(),
            separated: false,
        }
    }

    /// Starts a new section of the log.
    pub fn separated(mut self) -> Self {
        self.separated = true;
        self
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExperimentOutcome {
    Converted { output: String },
    WouldConvert { output: String },
    NoValidFiles,
    Failed { message: String },
}

impl ExperimentOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ExperimentOutcome::Converted { .. } | ExperimentOutcome::WouldConvert { .. }
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExperimentResult {
    pub experiment_id: String,
    pub outcome: ExperimentOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub summary: RunSummary,
    pub experiments: Vec<ExperimentResult>,
    pub error_records: Vec<ErrorRecord>,
    pub error_csv: Option<String>,
}

pub struct BatchConverter<C: AbfConverter> {
    converter: C,
    config: RunConfig,
    layout: OutputLayout,
    data_dir: PathBuf,
}

impl<C: AbfConverter> BatchConverter<C> {
    pub fn new(converter: C, config: RunConfig, layout: OutputLayout, data_dir: PathBuf) -> Self {
        Self {
            converter,
            config,
            layout,
            data_dir,
        }
    }

    pub fn converter(&self) -> &C {
        &self.converter
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Logs the run parameters ahead of loading the spreadsheet.
    pub fn announce(&self, excel_path: &Path, sink: &dyn ProgressSink) {
        sink.event(ProgressEvent::info("Starting NWB conversion process"));
        sink.event(ProgressEvent::info(format!("Excel file: {}", excel_path.display())));
        sink.event(ProgressEvent::info(format!("Data path: {}", self.data_dir.display())));
        sink.event(ProgressEvent::info(format!(
            "Output folder: {}",
            self.layout.output_dir()
        )));
        sink.event(ProgressEvent::info(format!("Lab: {}", self.config.lab)));
        sink.event(ProgressEvent::info(format!(
            "Institution: {}",
            self.config.institution
        )));
        sink.event(ProgressEvent::info(format!(
            "Experimenter(s): {}",
            self.config.experimenter.join(", ")
        )));
    }

    /// Converts every experiment in the table, then writes the summary and
    /// the error report. Per-experiment failures are recorded, not returned.
    pub fn run(
        &self,
        table: MetadataTable,
        options: BatchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<BatchReport, NwbBatchError> {
        sink.event(ProgressEvent::info(format!(
            "Removed {} empty or incomplete rows. {} rows remaining.",
            table.removed_rows(),
            table.rows().len()
        )));

        let missing_columns = ICEPHYS_COLUMNS
            .iter()
            .chain(SESSION_COLUMNS)
            .copied()
            .filter(|column| !table.has_column(column))
            .collect::<Vec<_>>();
        if !missing_columns.is_empty() {
            tracing::warn!(columns = ?missing_columns, "spreadsheet is missing metadata columns");
        }

        let groups = group_by_experiment(table.into_rows());
        sink.event(ProgressEvent::info(format!(
            "Processing {} experiments",
            groups.len()
        )));

        let mut summary = RunSummary {
            total_experiments: groups.len(),
            ..RunSummary::default()
        };
        let mut experiments = Vec::with_capacity(groups.len());
        let mut error_records = Vec::new();

        for group in &groups {
            let outcome = self.process_group(group, &missing_columns, options, sink);
            match &outcome {
                ExperimentOutcome::NoValidFiles => {
                    push_error_records(&mut error_records, group, ErrorCategory::NoValidFiles);
                }
                ExperimentOutcome::Failed { message } => {
                    push_error_records(
                        &mut error_records,
                        group,
                        ErrorCategory::ConversionError(message.clone()),
                    );
                }
                ExperimentOutcome::Converted { .. } | ExperimentOutcome::WouldConvert { .. } => {}
            }
            if outcome.is_success() {
                summary.successful += 1;
            } else {
                summary.failed += 1;
            }
            experiments.push(ExperimentResult {
                experiment_id: group.id().to_string(),
                outcome,
            });
        }

        let error_csv = self.report(&summary, &error_records, sink)?;

        Ok(BatchReport {
            summary,
            experiments,
            error_records,
            error_csv: error_csv.map(|path| path.to_string()),
        })
    }

    fn process_group(
        &self,
        group: &ExperimentGroup,
        missing_columns: &[&str],
        options: BatchOptions,
        sink: &dyn ProgressSink,
    ) -> ExperimentOutcome {
        let id = group.id();
        sink.event(
            ProgressEvent::info(format!("--- Processing experiment {id} ---")).separated(),
        );

        match self.convert_group(group, missing_columns, options, sink) {
            Ok(outcome) => outcome,
            Err(err) => {
                sink.event(ProgressEvent::failure(format!(
                    "✗ Error processing experiment {id}: {err}"
                )));
                ExperimentOutcome::Failed {
                    message: err.to_string(),
                }
            }
        }
    }

    fn convert_group(
        &self,
        group: &ExperimentGroup,
        missing_columns: &[&str],
        options: BatchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<ExperimentOutcome, NwbBatchError> {
        let id = group.id();
        require_columns(missing_columns, ICEPHYS_COLUMNS)?;

        for column in group.divergent_columns() {
            sink.event(ProgressEvent::warning(format!(
                "Warning: rows of experiment {id} disagree on {column}; using the first row"
            )));
        }

        let icephys = build_icephys_metadata(group);

        let mut file_paths = Vec::new();
        for row in group.rows() {
            let Some(file) = row.abf_file.as_deref() else {
                continue;
            };
            let path = self.data_dir.join(file);
            if !path.exists() {
                sink.event(ProgressEvent::warning(format!(
                    "Warning: ABF file not found: {}",
                    path.display()
                )));
                continue;
            }
            file_paths.push(path);
        }

        if file_paths.is_empty() {
            sink.event(ProgressEvent::failure(format!(
                "Skipping experiment {id}: no valid ABF files found"
            )));
            return Ok(ExperimentOutcome::NoValidFiles);
        }

        sink.event(ProgressEvent::info(format!(
            "Found {} valid ABF files for experiment {id}",
            file_paths.len()
        )));

        require_columns(missing_columns, SESSION_COLUMNS)?;
        let output = self.layout.nwb_path(id)?;

        if options.dry_run {
            sink.event(ProgressEvent::info(format!(
                "Would convert experiment {id} to {output}"
            )));
            return Ok(ExperimentOutcome::WouldConvert {
                output: output.to_string(),
            });
        }

        let defaults = self.converter.default_metadata(&file_paths, &icephys)?;
        let metadata = self.overlay_metadata(defaults, group);
        self.converter
            .run_conversion(&file_paths, &icephys, output.as_std_path(), &metadata)?;

        sink.event(ProgressEvent::info(format!(
            "✓ Finished NWB conversion for experiment {id}"
        )));
        Ok(ExperimentOutcome::Converted {
            output: output.to_string(),
        })
    }

    /// File-level and subject fields replace whatever the converter proposed;
    /// other default keys are kept.
    pub fn overlay_metadata(
        &self,
        mut metadata: NwbMetadata,
        group: &ExperimentGroup,
    ) -> NwbMetadata {
        let first = group.first_row();
        metadata.nwb_file.identifier = Some(group.id().to_string());
        metadata.nwb_file.session_description = Some(or_empty(&first.session_description));
        metadata.nwb_file.lab = Some(self.config.lab.clone());
        metadata.nwb_file.institution = Some(self.config.institution.clone());
        metadata.nwb_file.experimenter =
            Some(ExperimenterEntry::List(self.config.experimenter.clone()));
        metadata.subject = Some(SubjectMetadata {
            subject_id: or_empty(&first.subject_id),
            species: or_empty(&first.species),
            genotype: or_empty(&first.genotype),
            sex: or_empty(&first.sex),
            date_of_birth: or_empty(&first.date_of_birth),
            extra: Map::new(),
        });
        metadata
    }

    fn report(
        &self,
        summary: &RunSummary,
        error_records: &[ErrorRecord],
        sink: &dyn ProgressSink,
    ) -> Result<Option<Utf8PathBuf>, NwbBatchError> {
        sink.event(ProgressEvent::info(BANNER).separated());
        sink.event(ProgressEvent::info("CONVERSION SUMMARY"));
        sink.event(ProgressEvent::info(BANNER));
        sink.event(ProgressEvent::info(format!(
            "Total experiments: {}",
            summary.total_experiments
        )));
        sink.event(ProgressEvent::info(format!(
            "Successful conversions: {}",
            summary.successful
        )));
        sink.event(ProgressEvent::info(format!(
            "Failed conversions: {}",
            summary.failed
        )));
        if let Some(rate) = summary.success_rate() {
            sink.event(ProgressEvent::info(format!("Success rate: {rate:.1}%")));
        }

        if error_records.is_empty() {
            sink.event(
                ProgressEvent::info("No errors encountered - all conversions successful!")
                    .separated(),
            );
            return Ok(None);
        }

        let path = self.layout.error_csv_path();
        let written = write_error_csv(&path, error_records)?;
        sink.event(ProgressEvent::info(format!("Error details saved to: {path}")).separated());
        sink.event(ProgressEvent::info(format!("Total error records: {written}")));
        Ok(Some(path))
    }
}

pub fn build_icephys_metadata(group: &ExperimentGroup) -> IcephysMetadata {
    let first = group.first_row();
    IcephysMetadata {
        cell_id: or_empty(&first.cell_id),
        slice_id: or_empty(&first.slice_id),
        targeted_layer: or_empty(&first.targeted_layer),
        inferred_layer: or_empty(&first.inferred_layer),
        recording_sessions: group
            .rows()
            .iter()
            .filter(|row| row.abf_file.is_some())
            .map(recording_session)
            .collect(),
    }
}

fn recording_session(row: &MetadataRow) -> RecordingSession {
    RecordingSession {
        abf_file_name: or_empty(&row.abf_file),
        stimulus_type: or_empty(&row.stimulus_type),
        icephys_experiment_type: or_empty(&row.icephys_experiment_type),
    }
}

fn require_columns(missing: &[&str], needed: &[&str]) -> Result<(), NwbBatchError> {
    match needed.iter().find(|column| missing.contains(*column)) {
        Some(column) => Err(NwbBatchError::MissingColumn(column.to_string())),
        None => Ok(()),
    }
}

fn push_error_records(
    records: &mut Vec<ErrorRecord>,
    group: &ExperimentGroup,
    category: ErrorCategory,
) {
    records.extend(group.rows().iter().map(|row| ErrorRecord {
        experiment_id: group.id().to_string(),
        abf_file: row.abf_file.clone(),
        error_type: category.clone(),
    }));
}

fn or_empty(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}
