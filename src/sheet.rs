use std::path::{Path, PathBuf};

use calamine::{Data, DataType, Reader, open_workbook_auto};

use crate::domain::{ABF_FILE_COLUMN, EXPERIMENT_ID_COLUMN, MetadataRow, ensure_abf_extension};
use crate::error::NwbBatchError;

/// Raw cell grid, header row first. `None` marks a missing cell.
pub type RawRows = Vec<Vec<Option<String>>>;

/// Cleaned spreadsheet contents.
#[derive(Debug, Clone)]
pub struct MetadataTable {
    columns: Vec<String>,
    rows: Vec<MetadataRow>,
    removed: usize,
}

impl MetadataTable {
    pub fn load(path: &Path) -> Result<Self, NwbBatchError> {
        let raw = read_raw_rows(path)?;
        Self::from_raw_rows(path, raw)
    }

    /// Applies the cleaning steps to an already-read grid: the first data row
    /// (units) is dropped, then empty rows, then rows lacking an experiment id
    /// or filename.
    pub fn from_raw_rows(source: &Path, raw: RawRows) -> Result<Self, NwbBatchError> {
        let mut raw = raw.into_iter();
        let header = raw
            .next()
            .ok_or_else(|| NwbBatchError::MissingHeader(source.to_path_buf()))?;
        let columns = header
            .into_iter()
            .map(|cell| cell.unwrap_or_default())
            .collect::<Vec<_>>();

        for required in [EXPERIMENT_ID_COLUMN, ABF_FILE_COLUMN] {
            if !columns.iter().any(|column| column == required) {
                return Err(NwbBatchError::MissingColumn(required.to_string()));
            }
        }

        let data_rows = raw.skip(1).collect::<Vec<_>>();
        let initial = data_rows.len();

        let rows = data_rows
            .into_iter()
            .filter(|cells| cells.iter().any(Option::is_some))
            .map(|cells| map_row(&columns, cells))
            .filter(MetadataRow::has_required_ids)
            .map(|mut row| {
                row.abf_file = ensure_abf_extension(row.abf_file.as_deref());
                row
            })
            .collect::<Vec<_>>();
        let removed = initial - rows.len();
        tracing::debug!(initial, removed, "cleaned metadata table");

        Ok(Self {
            columns,
            rows,
            removed,
        })
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|column| column == name)
    }

    pub fn rows(&self) -> &[MetadataRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<MetadataRow> {
        self.rows
    }

    pub fn removed_rows(&self) -> usize {
        self.removed
    }
}

fn map_row(columns: &[String], cells: Vec<Option<String>>) -> MetadataRow {
    let mut row = MetadataRow::default();
    for (column, value) in columns.iter().zip(cells) {
        // Duplicate headers: the first non-missing value wins.
        if row.get(column).is_none() {
            row.set(column, value);
        }
    }
    row
}

pub fn read_raw_rows(path: &Path) -> Result<RawRows, NwbBatchError> {
    let is_csv = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);
    if is_csv {
        read_csv_rows(path)
    } else {
        read_workbook_rows(path)
    }
}

fn read_workbook_rows(path: &Path) -> Result<RawRows, NwbBatchError> {
    let mut workbook = open_workbook_auto(path).map_err(|err| open_error(path, err))?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| NwbBatchError::EmptyWorkbook(path.to_path_buf()))?;
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|err| open_error(path, err))?;
    tracing::debug!(sheet = %sheet, rows = range.height(), "read worksheet");
    Ok(range
        .rows()
        .map(|row| row.iter().map(render_cell).collect())
        .collect())
}

fn read_csv_rows(path: &Path) -> Result<RawRows, NwbBatchError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|err| open_error(path, err))?;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| open_error(path, err))?;
        rows.push(
            record
                .iter()
                .map(|field| (!field.is_empty()).then(|| field.to_string()))
                .collect(),
        );
    }
    Ok(rows)
}

fn open_error(path: &Path, err: impl std::fmt::Display) -> NwbBatchError {
    NwbBatchError::SpreadsheetOpen {
        path: PathBuf::from(path),
        message: err.to_string(),
    }
}

pub fn render_cell(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(value) if value.is_empty() => None,
        Data::String(value) => Some(value.clone()),
        Data::Int(value) => Some(value.to_string()),
        Data::Float(value) => Some(render_float(*value)),
        Data::Bool(true) => Some("True".to_string()),
        Data::Bool(false) => Some("False".to_string()),
        Data::DateTime(value) => Some(
            cell.as_datetime()
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| render_float(value.as_f64())),
        ),
        Data::DateTimeIso(value) | Data::DurationIso(value) => Some(value.clone()),
    }
}

/// Integral floats lose the fractional part so numeric ids read as `12`,
/// not `12.0`.
pub fn render_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn cells(values: &[&str]) -> Vec<Option<String>> {
        values
            .iter()
            .map(|value| (!value.is_empty()).then(|| value.to_string()))
            .collect()
    }

    fn header() -> Vec<Option<String>> {
        cells(&["EXPERIMENT ID", ".abf file", "cell_id", "subject_id"])
    }

    #[test]
    fn drops_units_row_and_incomplete_rows() {
        let raw = vec![
            header(),
            cells(&["id", "file", "cell", "subject"]),
            cells(&["E1", "a", "c1", "m1"]),
            cells(&["", "", "", ""]),
            cells(&["", "b", "c1", "m1"]),
            cells(&["E2", "", "c2", "m2"]),
            cells(&["E2", "c.ABF", "c2", "m2"]),
        ];
        let table = MetadataTable::from_raw_rows(Path::new("t.xlsx"), raw).unwrap();
        assert_eq!(table.removed_rows(), 3);
        let files = table
            .rows()
            .iter()
            .map(|row| row.abf_file.as_deref().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(files, vec!["a.abf", "c.ABF"]);
    }

    #[test]
    fn short_rows_pad_with_missing() {
        let raw = vec![header(), cells(&["u"]), cells(&["E1", " trace "])];
        let table = MetadataTable::from_raw_rows(Path::new("t.csv"), raw).unwrap();
        assert_eq!(table.rows()[0].abf_file.as_deref(), Some("trace.abf"));
        assert_eq!(table.rows()[0].cell_id, None);
    }

    #[test]
    fn missing_id_column_is_fatal() {
        let raw = vec![cells(&[".abf file", "cell_id"]), cells(&["a", "b"])];
        let err = MetadataTable::from_raw_rows(Path::new("t.csv"), raw).unwrap_err();
        assert_matches!(err, NwbBatchError::MissingColumn(column) if column == "EXPERIMENT ID");
    }

    #[test]
    fn empty_sheet_has_no_header() {
        let err = MetadataTable::from_raw_rows(Path::new("t.csv"), Vec::new()).unwrap_err();
        assert_matches!(err, NwbBatchError::MissingHeader(_));
    }

    #[test]
    fn floats_render_like_identifiers() {
        assert_eq!(render_float(12.0), "12");
        assert_eq!(render_float(1.5), "1.5");
        assert_eq!(render_cell(&Data::Float(3.0)).as_deref(), Some("3"));
        assert_eq!(render_cell(&Data::String(String::new())), None);
        assert_eq!(render_cell(&Data::Bool(true)).as_deref(), Some("True"));
    }
}
