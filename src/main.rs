use std::path::Path;

use specpdf_to_jsonl::{
    acquire_pages, assemble_toc, check_deps, extract_sections, load_config, reconcile,
    sort_entries_by_page, write_jsonl, write_report, AcquireError, DepsResult, EmitResult,
    OutputError, RegexRecognizer,
};

fn log_emit(emit: &EmitResult) {
    eprintln!(
        "{}",
        serde_json::json!({
            "tool": "write_jsonl",
            "path": emit.path,
            "records": emit.records,
            "sha256": emit.sha256
        })
    );
}

fn exit_emit_failed(path: &Path, err: &OutputError) -> ! {
    eprintln!(
        "{}",
        serde_json::json!({
            "tool": "write_jsonl",
            "path": path.to_string_lossy(),
            "error": err.to_string(),
            "error_code": 6
        })
    );
    std::process::exit(6);
}

fn main() {
    // Simple CLI flags parsing
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = String::from("structurer.yaml");
    if let Some(pos) = args.iter().position(|a| a == "--config") {
        if let Some(val) = args.get(pos + 1) {
            if !val.starts_with("--") {
                config_path = val.clone();
            }
        }
    }
    let mut doc_title_override: Option<String> = None;
    if let Some(pos) = args.iter().position(|a| a == "--doc-title") {
        if let Some(val) = args.get(pos + 1) {
            if !val.starts_with("--") {
                doc_title_override = Some(val.clone());
            }
        }
    }

    // 1) Read and validate the run config
    let mut cfg = match load_config(Path::new(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::json!({
                    "tool": "load_config",
                    "file": config_path,
                    "error": e.to_string(),
                    "error_code": 3
                })
            );
            std::process::exit(3);
        }
    };
    if let Some(title) = doc_title_override {
        cfg.doc_title = title;
    }
    eprintln!(
        "{}",
        serde_json::json!({
            "tool": "load_config",
            "file": config_path,
            "status": "ok",
            "document": cfg.document,
            "output_dir": cfg.output_dir()
        })
    );

    // 2) check_deps
    let deps: DepsResult = check_deps();
    if !deps.ok {
        eprintln!(
            "{}",
            serde_json::json!({
                "tool": "check_deps",
                "missing": deps.missing,
                "error_code": 2
            })
        );
        std::process::exit(2);
    }
    eprintln!(
        "{}",
        serde_json::json!({
            "tool": "check_deps",
            "status": "ok",
            "missing": deps.missing
        })
    );

    // 3) Acquire the page-text sequence; fatal before any output is written
    let document = Path::new(&cfg.document);
    let pages = match acquire_pages(document) {
        Ok(pages) => {
            eprintln!(
                "{}",
                serde_json::json!({
                    "tool": "acquire_pages",
                    "file": cfg.document,
                    "pages": pages.len()
                })
            );
            pages
        }
        Err(err) => {
            let label = match err {
                AcquireError::FileNotFound(_) => "FileNotFound",
                AcquireError::EncryptedPdf(_) => "EncryptedPdf",
                AcquireError::Other(_) => "AcquireFailed",
            };
            eprintln!(
                "{}",
                serde_json::json!({
                    "tool": "acquire_pages",
                    "file": cfg.document,
                    "error": label,
                    "error_code": 1
                })
            );
            std::process::exit(1);
        }
    };

    // 4) Assemble the ToC entry list
    let recognizer = RegexRecognizer;
    let toc_entries = match assemble_toc(&pages, &cfg.doc_title, &recognizer) {
        Ok(entries) => {
            eprintln!(
                "{}",
                serde_json::json!({
                    "tool": "assemble_toc",
                    "file": cfg.document,
                    "entries": entries.len()
                })
            );
            entries
        }
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::json!({
                    "tool": "assemble_toc",
                    "file": cfg.document,
                    "error": e.to_string(),
                    "error_code": 4
                })
            );
            std::process::exit(4);
        }
    };

    // 5) Explicit re-sort, then extract section bodies
    let sorted = sort_entries_by_page(&toc_entries);
    let sections = extract_sections(&pages, &sorted);
    eprintln!(
        "{}",
        serde_json::json!({
            "tool": "extract_sections",
            "file": cfg.document,
            "sections": sections.len()
        })
    );

    // 6) Emit both record files
    match write_jsonl(&toc_entries, &cfg.toc_path()) {
        Ok(emit) => log_emit(&emit),
        Err(e) => exit_emit_failed(&cfg.toc_path(), &e),
    }
    match write_jsonl(&sections, &cfg.sections_path()) {
        Ok(emit) => log_emit(&emit),
        Err(e) => exit_emit_failed(&cfg.sections_path(), &e),
    }

    // 7) Reconcile and write the validation report
    let report = reconcile(&toc_entries, &sections);
    eprintln!(
        "{}",
        serde_json::json!({
            "tool": "reconcile",
            "total_toc": report.summary.total_toc,
            "total_parsed": report.summary.total_parsed,
            "matched": report.summary.matched,
            "toc_only": report.summary.toc_only,
            "parsed_only": report.summary.parsed_only
        })
    );
    let report_path = cfg.report_path();
    match write_report(&report, &report_path) {
        Ok(()) => {
            eprintln!(
                "{}",
                serde_json::json!({
                    "tool": "write_report",
                    "path": report_path.to_string_lossy()
                })
            );
        }
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::json!({
                    "tool": "write_report",
                    "path": report_path.to_string_lossy(),
                    "error": e.to_string(),
                    "error_code": 7
                })
            );
            std::process::exit(7);
        }
    }
}
