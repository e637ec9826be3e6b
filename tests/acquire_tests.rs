use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use specpdf_to_jsonl::{acquire_pages, check_deps, AcquireError};

#[test]
fn acquire_pages_file_not_found() {
    let p = PathBuf::from("./this/does/not/exist.pdf");
    let err = acquire_pages(&p).unwrap_err();
    match err {
        AcquireError::FileNotFound(_) => {}
        _ => panic!("expected FileNotFound"),
    }
}

#[test]
fn check_deps_reports_missing_binaries() {
    let td = tempfile::tempdir().unwrap();
    std::env::set_var("PATH", td.path().display().to_string()); // empty PATH
    let res = check_deps();
    assert!(!res.ok, "missing pdftotext should not be ok");
    assert!(res.missing.iter().any(|m| m == "pdftotext"));

    let fake_bin = td.path().join("pdftotext");
    fs::write(&fake_bin, "#!/bin/sh\nexit 0\n").unwrap();
    let mut perms = fs::metadata(&fake_bin).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&fake_bin, perms).unwrap();

    let res = check_deps();
    assert!(res.ok, "pdftotext present should yield ok");
    // pdfinfo still missing; optional
    assert!(res.missing.iter().any(|m| m == "pdfinfo"));
}
