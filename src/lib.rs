use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Command;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shape of a ToC line: `<section_id> <title> <page>`, anchored end to end.
/// The section id is either dot-separated digit groups ("3.2.1") or an
/// alphabetic label ("Appendix A"); the title must be at least 3 characters
/// and contain no period, which excludes ordinary sentences.
static TOC_ENTRY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<section_id>\d+(?:\.\d+)*|[A-Za-z][\w\s]*)\s+(?P<title>[^.]{3,})\s+(?P<page>\d+)\s*$")
        .unwrap()
});

static NUMERIC_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+(\.\d+)*$").unwrap());

static FIGURE_TABLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(Figure|Table)\s+\d+").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DepsResult {
    pub ok: bool,
    pub missing: Vec<String>,
}

/// Check required/optional CLI dependencies.
/// - Required: pdftotext (Poppler)
/// - Optional: pdfinfo (per-page extraction; form-feed fallback without it)
/// Returns a DepsResult. `ok` is true iff required deps are present.
pub fn check_deps() -> DepsResult {
    let mut missing = Vec::new();

    let has_pdftotext = which::which("pdftotext").is_ok();
    if !has_pdftotext {
        missing.push("pdftotext".to_string());
    }

    // optional
    if which::which("pdfinfo").is_err() {
        missing.push("pdfinfo".to_string());
    }

    DepsResult { ok: has_pdftotext, missing }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Read(String),
    #[error("Failed to parse config: {0}")]
    Parse(String),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub document: String,
    pub doc_title: String,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub toc_file: Option<String>,
    #[serde(default)]
    pub sections_file: Option<String>,
    #[serde(default)]
    pub report_file: Option<String>,
}

impl RunConfig {
    pub fn output_dir(&self) -> String {
        self.output_dir.clone().unwrap_or_else(|| "./output".to_string())
    }
    pub fn toc_path(&self) -> PathBuf {
        Path::new(&self.output_dir()).join(self.toc_file.as_deref().unwrap_or("toc.jsonl"))
    }
    pub fn sections_path(&self) -> PathBuf {
        Path::new(&self.output_dir())
            .join(self.sections_file.as_deref().unwrap_or("sections.jsonl"))
    }
    pub fn report_path(&self) -> PathBuf {
        Path::new(&self.output_dir())
            .join(self.report_file.as_deref().unwrap_or("validation_report.xlsx"))
    }
}

/// Load and validate the run configuration from a YAML file.
/// The config is read once at process start and passed by parameter from
/// there on; nothing in the pipeline reads it ambiently.
pub fn load_config(path: &Path) -> Result<RunConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
    let cfg: RunConfig = serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;

    if cfg.document.trim().is_empty() {
        return Err(ConfigError::Invalid("missing document".into()));
    }
    if cfg.doc_title.trim().is_empty() {
        return Err(ConfigError::Invalid("missing doc_title".into()));
    }

    Ok(cfg)
}

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("FileNotFound: {0}")]
    FileNotFound(String),
    #[error("EncryptedPdf: {0}")]
    EncryptedPdf(String),
    #[error("AcquireFailed: {0}")]
    Other(String),
}

fn looks_encrypted(stderr: &[u8]) -> bool {
    let err = String::from_utf8_lossy(stderr).to_lowercase();
    err.contains("encrypt") || err.contains("password")
}

fn pdfinfo_page_count(path: &Path) -> Result<Option<usize>, AcquireError> {
    if which::which("pdfinfo").is_err() {
        return Ok(None);
    }
    let out = match Command::new("pdfinfo").arg(path).output() {
        Ok(out) => out,
        Err(_) => return Ok(None),
    };
    if !out.status.success() {
        if looks_encrypted(&out.stderr) {
            return Err(AcquireError::EncryptedPdf(path.display().to_string()));
        }
        return Ok(None);
    }
    let s = String::from_utf8_lossy(&out.stdout);
    for line in s.lines() {
        if let Some(rest) = line.strip_prefix("Pages:") {
            return Ok(rest.trim().parse::<usize>().ok());
        }
    }
    Ok(None)
}

/// Acquire the page-text sequence from a document via Poppler's pdftotext,
/// one string per page in page order. Prefers per-page extraction when
/// pdfinfo can report the page count; otherwise falls back to a single pass
/// split on form feed. This is the pipeline's only contact with the
/// document format; everything downstream consumes plain page texts.
pub fn acquire_pages(path: &Path) -> Result<Vec<String>, AcquireError> {
    if !path.exists() {
        return Err(AcquireError::FileNotFound(path.display().to_string()));
    }

    if let Some(n_pages) = pdfinfo_page_count(path)? {
        let mut pages: Vec<String> = Vec::with_capacity(n_pages);
        for i in 1..=n_pages {
            let out = Command::new("pdftotext")
                .arg("-q")
                .arg("-f")
                .arg(i.to_string())
                .arg("-l")
                .arg(i.to_string())
                .arg(path)
                .arg("-")
                .output()
                .map_err(|e| AcquireError::Other(e.to_string()))?;
            if !out.status.success() {
                if looks_encrypted(&out.stderr) {
                    return Err(AcquireError::EncryptedPdf(path.display().to_string()));
                }
                return Err(AcquireError::Other(format!("pdftotext failed on page {}", i)));
            }
            pages.push(String::from_utf8_lossy(&out.stdout).to_string());
        }
        Ok(pages)
    } else {
        let out = Command::new("pdftotext")
            .arg("-q")
            .arg(path)
            .arg("-")
            .output()
            .map_err(|e| AcquireError::Other(e.to_string()))?;
        if !out.status.success() {
            if looks_encrypted(&out.stderr) {
                return Err(AcquireError::EncryptedPdf(path.display().to_string()));
            }
            return Err(AcquireError::Other("pdftotext failed".into()));
        }
        let s = String::from_utf8_lossy(&out.stdout);
        let mut pages: Vec<String> = s.split('\u{000C}').map(|x| x.to_string()).collect();
        while matches!(pages.last(), Some(last) if last.trim().is_empty()) {
            pages.pop();
        }
        Ok(pages)
    }
}

/// Raw fields of a recognized ToC line, before hierarchy enrichment.
/// `page` holds the trailing page number printed on the line itself; the
/// assembler replaces it with the 1-based page the line was found on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub section_id: String,
    pub title: String,
    pub page: usize,
}

/// Capability: classify one line as a ToC entry or not.
/// Kept behind a trait so a structural recognizer (font/position metadata)
/// can replace the regex heuristic without touching hierarchy or
/// extraction.
pub trait LineRecognizer {
    fn recognize(&self, line: &str) -> Option<RawEntry>;
}

/// Default recognizer: the `<section_id> <title> <page>` regex heuristic.
/// Non-matching lines return None silently; most lines in a document are
/// not ToC entries. A dotted number mid-sentence with a trailing numeral
/// can still produce a false positive; reconciliation surfaces those.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexRecognizer;

impl LineRecognizer for RegexRecognizer {
    fn recognize(&self, line: &str) -> Option<RawEntry> {
        let caps = TOC_ENTRY_RE.captures(line.trim())?;
        let page = caps.name("page")?.as_str().parse::<usize>().ok()?;
        Some(RawEntry {
            section_id: caps.name("section_id")?.as_str().trim().to_string(),
            title: caps.name("title")?.as_str().trim().to_string(),
            page,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TocEntry {
    pub doc_title: String,
    pub section_id: String,
    pub title: String,
    pub page: usize,
    pub level: usize,
    pub parent_id: Option<String>,
    pub full_path: String,
    pub tags: Vec<String>,
}

/// Enrich a recognized line into a full ToC entry: nesting level and parent
/// id from the dotted numeric form (level 1, no parent otherwise), display
/// path, and a figure/table tag when the title names one. Pure function of
/// its inputs.
pub fn build_entry(doc_title: &str, raw: &RawEntry) -> TocEntry {
    let (level, parent_id) = if NUMERIC_ID_RE.is_match(&raw.section_id) {
        let parts: Vec<&str> = raw.section_id.split('.').collect();
        let parent = if parts.len() > 1 {
            Some(parts[..parts.len() - 1].join("."))
        } else {
            None
        };
        (parts.len(), parent)
    } else {
        (1, None)
    };

    let mut tags = Vec::new();
    if FIGURE_TABLE_RE.is_match(&raw.title) {
        // "figure" wins when a title mentions both
        if raw.title.to_lowercase().contains("figure") {
            tags.push("figure".to_string());
        } else {
            tags.push("table".to_string());
        }
    }

    TocEntry {
        doc_title: doc_title.to_string(),
        section_id: raw.section_id.clone(),
        title: raw.title.clone(),
        page: raw.page,
        level,
        parent_id,
        full_path: format!("{} {}", raw.section_id, raw.title).trim().to_string(),
        tags,
    }
}

#[derive(Debug, Error)]
pub enum TocError {
    #[error("NoTocEntriesFound")]
    NoEntriesFound,
}

/// Scan every line of every page with the recognizer and assemble the
/// ordered entry list. `page` on each entry is the 1-based index of the
/// page the ToC line was found on, treated downstream as the assertion of
/// where that section starts. Output preserves scan order; the extractor
/// re-sorts by page separately. Errors when no line anywhere matches: a
/// document with no detectable ToC cannot be processed further.
pub fn assemble_toc(
    pages: &[String],
    doc_title: &str,
    recognizer: &dyn LineRecognizer,
) -> Result<Vec<TocEntry>, TocError> {
    let mut entries = Vec::new();
    for (page_index, text) in pages.iter().enumerate() {
        for line in text.split('\n') {
            if let Some(raw) = recognizer.recognize(line) {
                let mut entry = build_entry(doc_title, &raw);
                entry.page = page_index + 1;
                entries.push(entry);
            }
        }
    }
    if entries.is_empty() {
        return Err(TocError::NoEntriesFound);
    }
    Ok(entries)
}

/// Explicit re-sort step between assembly and extraction. Stable, so
/// entries on the same page keep their scan order.
pub fn sort_entries_by_page(entries: &[TocEntry]) -> Vec<TocEntry> {
    let mut sorted = entries.to_vec();
    sorted.sort_by_key(|e| e.page);
    sorted
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Section {
    #[serde(flatten)]
    pub entry: TocEntry,
    pub content: String,
}

fn heading_pattern(section_id: &str) -> Regex {
    Regex::new(&format!("(?i){}", regex::escape(section_id))).unwrap()
}

/// Extract the body text for one entry, bounded by the next entry.
/// The section's own id is the start anchor on the start page; the next
/// entry's id is the end anchor on the end page. A missing anchor degrades
/// to the whole page text, never an error.
fn section_content(pages: &[String], entry: &TocEntry, next: Option<&TocEntry>) -> String {
    if pages.is_empty() {
        return String::new();
    }
    let start_page = entry.page.saturating_sub(1).min(pages.len() - 1);
    // exclusive upper bound; pages.len() means "through end of document"
    let end_page = next
        .map(|n| n.page.saturating_sub(1))
        .unwrap_or(pages.len())
        .min(pages.len());

    let mut parts: Vec<String> = Vec::new();

    let page_text = &pages[start_page];
    match heading_pattern(&entry.section_id).find(page_text) {
        Some(m) => parts.push(page_text[m.end()..].trim().to_string()),
        None => parts.push(page_text.trim().to_string()),
    }

    for text in pages.iter().take(end_page).skip(start_page + 1) {
        parts.push(text.trim().to_string());
    }

    // When adjacent entries share a page the start-page pass already covered
    // that text, so the end anchor is not applied a second time.
    if let Some(next) = next {
        if end_page > start_page && end_page < pages.len() {
            let end_text = &pages[end_page];
            match heading_pattern(&next.section_id).find(end_text) {
                Some(m) => parts.push(end_text[..m.start()].trim().to_string()),
                None => parts.push(end_text.trim().to_string()),
            }
        }
    }

    parts.join(" ").trim().to_string()
}

/// Compute one Section per entry, in order. Expects `sorted_entries`
/// ascending by page (see sort_entries_by_page); each entry's span runs to
/// the next entry's page, and the last entry runs through the end of the
/// document. Content may be empty but is never absent.
pub fn extract_sections(pages: &[String], sorted_entries: &[TocEntry]) -> Vec<Section> {
    sorted_entries
        .iter()
        .enumerate()
        .map(|(i, entry)| Section {
            entry: entry.clone(),
            content: section_content(pages, entry, sorted_entries.get(i + 1)),
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconciliationSummary {
    pub total_toc: usize,
    pub total_parsed: usize,
    pub matched: usize,
    pub toc_only: usize,
    pub parsed_only: usize,
}

/// One row of the side-by-side comparison table. An absent side means the
/// id was only seen on the other side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComparisonRow {
    pub section_id: String,
    pub title_toc: Option<String>,
    pub page_toc: Option<usize>,
    pub title_parsed: Option<String>,
    pub page_parsed: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconciliationReport {
    pub no_entries: bool,
    pub summary: ReconciliationSummary,
    pub toc_only: Vec<String>,
    pub parsed_only: Vec<String>,
    pub rows: Vec<ComparisonRow>,
}

/// Cross-validate the declared ToC against the extracted sections: project
/// both lists onto (section_id, title, page) and full-outer-join on
/// section_id. Discrepancies are the report's expected output, not errors.
/// Duplicate ids join on their first occurrence; totals still count every
/// record. Row order is ToC order first, then parsed-only ids in parsed
/// order. An empty ToC yields a minimal "no entries" report without error.
pub fn reconcile(toc_entries: &[TocEntry], sections: &[Section]) -> ReconciliationReport {
    if toc_entries.is_empty() {
        return ReconciliationReport {
            no_entries: true,
            summary: ReconciliationSummary {
                total_toc: 0,
                total_parsed: sections.len(),
                matched: 0,
                toc_only: 0,
                parsed_only: 0,
            },
            toc_only: Vec::new(),
            parsed_only: Vec::new(),
            rows: Vec::new(),
        };
    }

    let mut parsed_by_id: HashMap<&str, (&str, usize)> = HashMap::new();
    for s in sections {
        parsed_by_id
            .entry(s.entry.section_id.as_str())
            .or_insert((s.entry.title.as_str(), s.entry.page));
    }

    let mut rows: Vec<ComparisonRow> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for e in toc_entries {
        if !seen.insert(e.section_id.as_str()) {
            continue;
        }
        let parsed = parsed_by_id.get(e.section_id.as_str());
        rows.push(ComparisonRow {
            section_id: e.section_id.clone(),
            title_toc: Some(e.title.clone()),
            page_toc: Some(e.page),
            title_parsed: parsed.map(|(t, _)| t.to_string()),
            page_parsed: parsed.map(|(_, p)| *p),
        });
    }
    // One-section-per-entry construction makes this side empty in normal
    // runs; still handled for duplicate-id and future-extension cases.
    for s in sections {
        if seen.insert(s.entry.section_id.as_str()) {
            rows.push(ComparisonRow {
                section_id: s.entry.section_id.clone(),
                title_toc: None,
                page_toc: None,
                title_parsed: Some(s.entry.title.clone()),
                page_parsed: Some(s.entry.page),
            });
        }
    }

    let matched = rows
        .iter()
        .filter(|r| r.title_toc.is_some() && r.title_parsed.is_some())
        .count();
    let toc_only: Vec<String> = rows
        .iter()
        .filter(|r| r.title_parsed.is_none())
        .map(|r| format!("{} - {}", r.section_id, r.title_toc.as_deref().unwrap_or("")))
        .collect();
    let parsed_only: Vec<String> = rows
        .iter()
        .filter(|r| r.title_toc.is_none())
        .map(|r| format!("{} - {}", r.section_id, r.title_parsed.as_deref().unwrap_or("")))
        .collect();

    ReconciliationReport {
        no_entries: false,
        summary: ReconciliationSummary {
            total_toc: toc_entries.len(),
            total_parsed: sections.len(),
            matched,
            toc_only: toc_only.len(),
            parsed_only: parsed_only.len(),
        },
        toc_only,
        parsed_only,
        rows,
    }
}

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("WriteFailed: {0}")]
    WriteFailed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitResult {
    pub path: String,
    pub records: usize,
    pub sha256: String,
}

/// Atomically write one JSON object per line, UTF-8, in input order.
/// Writes to a temp file then renames. Returns the destination path, the
/// record count, and the sha256 of the emitted bytes.
pub fn write_jsonl<T: Serialize>(items: &[T], path: &Path) -> Result<EmitResult, OutputError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| OutputError::WriteFailed(e.to_string()))?;
    }

    let mut buf = String::new();
    for item in items {
        let line =
            serde_json::to_string(item).map_err(|e| OutputError::WriteFailed(e.to_string()))?;
        buf.push_str(&line);
        buf.push('\n');
    }

    let pid = std::process::id();
    let tmp = path.with_extension(format!("jsonl.tmp.{}", pid));
    std::fs::write(&tmp, &buf).map_err(|e| OutputError::WriteFailed(e.to_string()))?;
    std::fs::rename(&tmp, path).map_err(|e| OutputError::WriteFailed(e.to_string()))?;

    Ok(EmitResult {
        path: path.to_string_lossy().to_string(),
        records: items.len(),
        sha256: sha256_hex(buf.as_bytes()),
    })
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("ReportWriteFailed: {0}")]
    WriteFailed(String),
}

/// Write the reconciliation report as a two-sheet workbook: "Summary"
/// (metric/value rows plus the one-sided row labels) and "Detailed
/// Comparison" (the full side-by-side table). The empty-ToC report still
/// produces both sheets: a single status row, and the bare
/// (section_id, title, page) schema.
pub fn write_report(report: &ReconciliationReport, path: &Path) -> Result<(), ReportError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ReportError::WriteFailed(e.to_string()))?;
    }
    let mut workbook = build_workbook(report).map_err(|e| ReportError::WriteFailed(e.to_string()))?;
    workbook
        .save(path)
        .map_err(|e| ReportError::WriteFailed(e.to_string()))?;
    Ok(())
}

fn build_workbook(
    report: &ReconciliationReport,
) -> Result<rust_xlsxwriter::Workbook, rust_xlsxwriter::XlsxError> {
    use rust_xlsxwriter::Workbook;

    let mut workbook = Workbook::new();

    let summary = workbook.add_worksheet();
    summary.set_name("Summary")?;
    if report.no_entries {
        summary.write_string(0, 0, "Status")?;
        summary.write_string(1, 0, "No TOC entries found")?;
    } else {
        summary.write_string(0, 0, "Metric")?;
        summary.write_string(0, 1, "Value")?;
        let counts = [
            ("Total Sections in TOC", report.summary.total_toc),
            ("Total Sections Parsed", report.summary.total_parsed),
            ("Sections Matched", report.summary.matched),
            ("Sections in TOC only", report.summary.toc_only),
            ("Sections in Parsed only", report.summary.parsed_only),
        ];
        let mut row = 1u32;
        for (metric, value) in counts {
            summary.write_string(row, 0, metric)?;
            summary.write_number(row, 1, value as f64)?;
            row += 1;
        }
        if !report.toc_only.is_empty() {
            summary.write_string(row, 0, "Sections in TOC only:")?;
            row += 1;
            for label in &report.toc_only {
                summary.write_string(row, 0, label)?;
                row += 1;
            }
        }
        if !report.parsed_only.is_empty() {
            summary.write_string(row, 0, "Sections in Parsed only:")?;
            row += 1;
            for label in &report.parsed_only {
                summary.write_string(row, 0, label)?;
                row += 1;
            }
        }
    }

    let detail = workbook.add_worksheet();
    detail.set_name("Detailed Comparison")?;
    if report.no_entries {
        for (col, header) in ["section_id", "title", "page"].iter().enumerate() {
            detail.write_string(0, col as u16, *header)?;
        }
    } else {
        let headers = ["section_id", "title_toc", "page_toc", "title_parsed", "page_parsed"];
        for (col, header) in headers.iter().enumerate() {
            detail.write_string(0, col as u16, *header)?;
        }
        for (i, r) in report.rows.iter().enumerate() {
            let row = (i + 1) as u32;
            detail.write_string(row, 0, &r.section_id)?;
            if let Some(t) = &r.title_toc {
                detail.write_string(row, 1, t)?;
            }
            if let Some(p) = r.page_toc {
                detail.write_number(row, 2, p as f64)?;
            }
            if let Some(t) = &r.title_parsed {
                detail.write_string(row, 3, t)?;
            }
            if let Some(p) = r.page_parsed {
                detail.write_number(row, 4, p as f64)?;
            }
        }
    }

    Ok(workbook)
}

// Utility to compute sha256 hex
pub fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let out = hasher.finalize();
    out.iter().map(|b| format!("{:02x}", b)).collect()
}
