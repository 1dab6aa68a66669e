use std::fs;
use std::path::Path;

use assert_matches::assert_matches;
use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

use nwb_batch::error::NwbBatchError;
use nwb_batch::sheet::MetadataTable;

#[test]
fn loads_csv_sheet_and_normalizes_filenames() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("params.csv");
    fs::write(
        &path,
        "EXPERIMENT ID,.abf file,cell_id,inferred_layer\n\
         ,,,\n\
         E1, trace1 ,C1,L4\n\
         E1,trace1.ABF,C1,\n\
         E2,,C2,\n",
    )
    .unwrap();

    let table = MetadataTable::load(&path).unwrap();
    assert_eq!(table.removed_rows(), 1);
    assert!(table.has_column("inferred_layer"));
    assert!(!table.has_column("subject_id"));

    let rows = table.rows();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].abf_file.as_deref(), Some("trace1.abf"));
    assert_eq!(rows[0].inferred_layer.as_deref(), Some("L4"));
    assert_eq!(rows[1].abf_file.as_deref(), Some("trace1.ABF"));
    assert_eq!(rows[1].inferred_layer, None);
}

#[test]
fn missing_spreadsheet_fails_to_open() {
    let err = MetadataTable::load(Path::new("/nonexistent/params.xlsx")).unwrap_err();
    assert_matches!(err, NwbBatchError::SpreadsheetOpen { .. });
}

#[test]
fn missing_filename_column_is_fatal() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("params.csv");
    fs::write(&path, "EXPERIMENT ID,cell_id\nunits,\nE1,C1\n").unwrap();

    let err = MetadataTable::load(&path).unwrap_err();
    assert_matches!(err, NwbBatchError::MissingColumn(column) if column == ".abf file");
}

fn write_workbook(path: &Path) {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    let date = Format::new().set_num_format("yyyy-mm-dd");
    let header = ["EXPERIMENT ID", ".abf file", "cell_id", "date_of_birth"];
    for (col, name) in header.iter().enumerate() {
        sheet.write_string(0, col as u16, *name).unwrap();
    }
    sheet.write_string(1, 0, "id").unwrap();
    sheet.write_string(1, 3, "date").unwrap();

    sheet.write_number(2, 0, 1.0).unwrap();
    sheet.write_string(2, 1, "trace1").unwrap();
    sheet.write_number(2, 2, 7.0).unwrap();
    let born = ExcelDateTime::from_ymd(2023, 11, 5).unwrap();
    sheet.write_datetime_with_format(2, 3, &born, &date).unwrap();

    sheet.write_string(3, 0, "1").unwrap();
    sheet.write_string(3, 1, "trace2.abf").unwrap();

    sheet.write_number(4, 2, 8.0).unwrap();
    workbook.save(path).unwrap();
}

#[test]
fn loads_xlsx_first_sheet() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("params.xlsx");
    write_workbook(&path);

    let table = MetadataTable::load(&path).unwrap();
    assert_eq!(table.removed_rows(), 1);

    let rows = table.rows();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].experiment_id.as_deref(), Some("1"));
    assert_eq!(rows[1].experiment_id.as_deref(), Some("1"));
    assert_eq!(rows[0].abf_file.as_deref(), Some("trace1.abf"));
    assert_eq!(rows[0].cell_id.as_deref(), Some("7"));
    assert_eq!(rows[0].date_of_birth.as_deref(), Some("2023-11-05 00:00:00"));
    assert_eq!(rows[1].date_of_birth, None);
}
