#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use assert_matches::assert_matches;

use nwb_batch::converter::{AbfConverter, IcephysMetadata, NwbMetadata, SystemConverter};
use nwb_batch::error::NwbBatchError;

const SCRIPT: &str = r#"#!/bin/sh
case "$1" in
  metadata)
    echo '{"NWBFile": {"session_start_time": "2024-05-01T10:00:00"}, "Icephys": {}}'
    ;;
  convert)
    grep -q '"nwbfile_path"' "$3" || exit 4
    out=$(sed -n 's/.*"nwbfile_path": "\([^"]*\)".*/\1/p' "$3")
    echo converted > "$out"
    ;;
  *)
    echo "unknown action $1" >&2
    exit 2
    ;;
esac
"#;

fn install_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-abf2nwb");
    fs::write(&path, body).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

fn icephys() -> IcephysMetadata {
    IcephysMetadata {
        cell_id: "C1".to_string(),
        slice_id: String::new(),
        targeted_layer: String::new(),
        inferred_layer: String::new(),
        recording_sessions: Vec::new(),
    }
}

#[test]
fn reads_default_metadata_from_stdout() {
    let temp = tempfile::tempdir().unwrap();
    let script = install_script(temp.path(), SCRIPT);
    let converter = SystemConverter::locate(script.to_str().unwrap()).unwrap();

    let metadata = converter
        .default_metadata(&[temp.path().join("a.abf")], &icephys())
        .unwrap();
    assert!(metadata.nwb_file.extra.contains_key("session_start_time"));
    assert!(metadata.extra.contains_key("Icephys"));
}

#[test]
fn convert_writes_requested_output() {
    let temp = tempfile::tempdir().unwrap();
    let script = install_script(temp.path(), SCRIPT);
    let converter = SystemConverter::locate(script.to_str().unwrap()).unwrap();
    let output = temp.path().join("E1.nwb");

    converter
        .run_conversion(
            &[temp.path().join("a.abf")],
            &icephys(),
            &output,
            &NwbMetadata::default(),
        )
        .unwrap();
    assert_eq!(fs::read_to_string(&output).unwrap().trim(), "converted");
}

#[test]
fn failing_converter_reports_stderr() {
    let temp = tempfile::tempdir().unwrap();
    let script = install_script(temp.path(), "#!/bin/sh\necho 'bad ABF header' >&2\nexit 1\n");
    let converter = SystemConverter::locate(script.to_str().unwrap()).unwrap();

    let err = converter.default_metadata(&[], &icephys()).unwrap_err();
    assert_matches!(err, NwbBatchError::ConverterFailed(message) if message == "bad ABF header");
}

#[test]
fn missing_explicit_path_is_reported() {
    let err = SystemConverter::locate("/nonexistent/dir/abf2nwb").unwrap_err();
    assert_matches!(err, NwbBatchError::MissingTool(_));
}
