use std::fs;

use basil_tool::{canonicalize_or_current, read_input};
use tempfile::tempdir;

#[test]
fn canonicalize_or_current_returns_cwd_for_dot() {
    let cwd = std::env::current_dir().expect("cwd");
    assert_eq!(canonicalize_or_current(".").expect("canonicalize"), cwd);
}

#[test]
fn canonicalize_or_current_resolves_existing_path() {
    let tmp = tempdir().expect("tempdir");
    let subdir = tmp.path().join("nested");
    fs::create_dir_all(&subdir).expect("create nested");

    let result = canonicalize_or_current(subdir.to_str().expect("utf8")).expect("canonicalize");
    assert_eq!(result, subdir.canonicalize().expect("canonicalize subdir"));
}

#[test]
fn canonicalize_or_current_keeps_missing_path_absolute() {
    let result = canonicalize_or_current("does/not/exist").expect("canonicalize");
    assert!(result.is_absolute());
    assert!(result.ends_with("does/not/exist"));
}

#[test]
fn read_input_reads_named_file() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("a.out");
    fs::write(&path, b"\x7fELF").expect("write binary");
    assert_eq!(read_input(path.to_str()).expect("read"), b"\x7fELF");

    let err = read_input(Some("/definitely/missing/a.out")).unwrap_err();
    assert!(err.to_string().contains("Failed to read binary"), "{err}");
}
