use std::collections::BTreeMap;
use std::fmt;

pub const EXPERIMENT_ID_COLUMN: &str = "EXPERIMENT ID";
pub const ABF_FILE_COLUMN: &str = ".abf file";
pub const ABF_EXTENSION: &str = ".abf";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExperimentId(String);

impl ExperimentId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One spreadsheet row. Absent cells stay `None` until the metadata overlay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataRow {
    pub experiment_id: Option<String>,
    pub cell_id: Option<String>,
    pub slice_id: Option<String>,
    pub targeted_layer: Option<String>,
    pub inferred_layer: Option<String>,
    pub abf_file: Option<String>,
    pub stimulus_type: Option<String>,
    pub icephys_experiment_type: Option<String>,
    pub session_description: Option<String>,
    pub subject_id: Option<String>,
    pub species: Option<String>,
    pub genotype: Option<String>,
    pub sex: Option<String>,
    pub date_of_birth: Option<String>,
}

impl MetadataRow {
    pub fn has_required_ids(&self) -> bool {
        self.experiment_id.is_some() && self.abf_file.is_some()
    }

    /// Cell value by spreadsheet column name.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields()
            .into_iter()
            .find(|(name, _)| *name == column)
            .and_then(|(_, value)| value.as_deref())
    }

    pub fn set(&mut self, column: &str, value: Option<String>) {
        let slot = match column {
            EXPERIMENT_ID_COLUMN => &mut self.experiment_id,
            ABF_FILE_COLUMN => &mut self.abf_file,
            "cell_id" => &mut self.cell_id,
            "slice_id" => &mut self.slice_id,
            "targeted_layer" => &mut self.targeted_layer,
            "inferred_layer" => &mut self.inferred_layer,
            "stimulus_type" => &mut self.stimulus_type,
            "icephys_experiment_type" => &mut self.icephys_experiment_type,
            "session_description" => &mut self.session_description,
            "subject_id" => &mut self.subject_id,
            "species" => &mut self.species,
            "genotype" => &mut self.genotype,
            "sex" => &mut self.sex,
            "date_of_birth" => &mut self.date_of_birth,
            _ => return,
        };
        *slot = value;
    }

    fn fields(&self) -> [(&'static str, &Option<String>); 14] {
        [
            (EXPERIMENT_ID_COLUMN, &self.experiment_id),
            (ABF_FILE_COLUMN, &self.abf_file),
            ("cell_id", &self.cell_id),
            ("slice_id", &self.slice_id),
            ("targeted_layer", &self.targeted_layer),
            ("inferred_layer", &self.inferred_layer),
            ("stimulus_type", &self.stimulus_type),
            ("icephys_experiment_type", &self.icephys_experiment_type),
            ("session_description", &self.session_description),
            ("subject_id", &self.subject_id),
            ("species", &self.species),
            ("genotype", &self.genotype),
            ("sex", &self.sex),
            ("date_of_birth", &self.date_of_birth),
        ]
    }
}

/// Columns whose value is taken from the first row of a group.
pub const GROUP_LEVEL_COLUMNS: &[&str] = &[
    "cell_id",
    "slice_id",
    "targeted_layer",
    "inferred_layer",
    "session_description",
    "subject_id",
    "species",
    "genotype",
    "sex",
    "date_of_birth",
];

/// All rows sharing one experiment id. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentGroup {
    id: ExperimentId,
    rows: Vec<MetadataRow>,
}

impl ExperimentGroup {
    pub fn id(&self) -> &ExperimentId {
        &self.id
    }

    pub fn rows(&self) -> &[MetadataRow] {
        &self.rows
    }

    pub fn first_row(&self) -> &MetadataRow {
        &self.rows[0]
    }

    /// Group-level columns where some row disagrees with the first one.
    pub fn divergent_columns(&self) -> Vec<&'static str> {
        let first = self.first_row();
        GROUP_LEVEL_COLUMNS
            .iter()
            .copied()
            .filter(|column| {
                self.rows[1..]
                    .iter()
                    .any(|row| row.get(column) != first.get(column))
            })
            .collect()
    }
}

/// Partitions rows by experiment id. Groups come out sorted by id and rows
/// keep their spreadsheet order. Rows without an id are skipped.
pub fn group_by_experiment(rows: Vec<MetadataRow>) -> Vec<ExperimentGroup> {
    let mut groups: BTreeMap<ExperimentId, Vec<MetadataRow>> = BTreeMap::new();
    for row in rows {
        let Some(id) = row.experiment_id.clone() else {
            continue;
        };
        groups.entry(ExperimentId::new(id)).or_default().push(row);
    }
    groups
        .into_iter()
        .map(|(id, rows)| ExperimentGroup { id, rows })
        .collect()
}

/// Trims the filename and appends `.abf` unless it already ends with it,
/// ignoring case.
pub fn ensure_abf_extension(filename: Option<&str>) -> Option<String> {
    let trimmed = filename?.trim();
    if trimmed.to_ascii_lowercase().ends_with(ABF_EXTENSION) {
        Some(trimmed.to_string())
    } else {
        Some(format!("{trimmed}{ABF_EXTENSION}"))
    }
}
