use std::fs;

use specpdf_to_jsonl::{load_config, ConfigError};

#[test]
fn load_config_reads_paths_and_defaults() {
    let td = tempfile::tempdir().unwrap();
    let path = td.path().join("structurer.yaml");
    fs::write(
        &path,
        "document: ./spec.pdf\ndoc_title: USB PD Specification\n",
    )
    .unwrap();

    let cfg = load_config(&path).expect("config ok");
    assert_eq!(cfg.document, "./spec.pdf");
    assert_eq!(cfg.doc_title, "USB PD Specification");
    assert_eq!(cfg.output_dir(), "./output");
    assert!(cfg.toc_path().ends_with("toc.jsonl"));
    assert!(cfg.sections_path().ends_with("sections.jsonl"));
    assert!(cfg.report_path().ends_with("validation_report.xlsx"));
}

#[test]
fn load_config_honors_overrides() {
    let td = tempfile::tempdir().unwrap();
    let path = td.path().join("structurer.yaml");
    fs::write(
        &path,
        "document: ./spec.pdf\ndoc_title: T\noutput_dir: ./out\ntoc_file: t.jsonl\n",
    )
    .unwrap();

    let cfg = load_config(&path).unwrap();
    assert_eq!(cfg.output_dir(), "./out");
    assert!(cfg.toc_path().ends_with("out/t.jsonl"));
}

#[test]
fn missing_doc_title_is_invalid() {
    let td = tempfile::tempdir().unwrap();
    let path = td.path().join("structurer.yaml");
    fs::write(&path, "document: ./spec.pdf\ndoc_title: \"\"\n").unwrap();

    let err = load_config(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn unreadable_config_is_a_read_error() {
    let err = load_config(std::path::Path::new("./does/not/exist.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::Read(_)));
}
