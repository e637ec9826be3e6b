use specpdf_to_jsonl::{
    assemble_toc, extract_sections, sort_entries_by_page, RegexRecognizer,
};

fn entries_from(pages: &[String]) -> Vec<specpdf_to_jsonl::TocEntry> {
    let entries = assemble_toc(pages, "Doc", &RegexRecognizer).unwrap();
    sort_entries_by_page(&entries)
}

#[test]
fn content_runs_from_own_heading_to_next_heading() {
    let pages = vec![
        "3 Overview bla bla 1\n".to_string(),
        "3 Overview\nIntro text here\n4 Architecture\nmore body".to_string(),
    ];
    // hand-built entries: "3" starts on page 1, "4" on page 2
    let toc = entries_from(&[pages[0].clone(), "4 Architecture notes 2\n".to_string()]);
    assert_eq!(toc.len(), 2);
    let sections = extract_sections(&pages, &toc);

    let first = &sections[0];
    assert_eq!(first.entry.section_id, "3");
    // after the first "3" on the start page
    assert!(first.content.contains("Overview bla bla 1"));
    // up to, not including, the "4" heading on the end page
    assert!(first.content.contains("Intro text here"));
    assert!(!first.content.contains("Architecture"));
}

#[test]
fn last_entry_reads_through_end_of_document() {
    let pages = vec![
        "7 Final chapter text 1\n".to_string(),
        "middle page body".to_string(),
        "last page body".to_string(),
    ];
    let toc = entries_from(&pages[..1]);
    let sections = extract_sections(&pages, &toc);
    assert_eq!(sections.len(), 1);
    assert!(sections[0].content.contains("middle page body"));
    assert!(sections[0].content.contains("last page body"));
}

#[test]
fn missing_heading_falls_back_to_whole_page() {
    let pages = vec!["no heading anywhere on this page".to_string()];
    let mut toc = entries_from(&["9.9 Ghost section 1\n".to_string()]);
    toc[0].page = 1;
    let sections = extract_sections(&pages, &toc);
    assert_eq!(sections[0].content, "no heading anywhere on this page");
}

#[test]
fn heading_match_is_case_insensitive() {
    let pages = vec!["APPENDIX B\nrows follow".to_string()];
    let toc = entries_from(&["Appendix B Glossary 1\n".to_string()]);
    assert_eq!(toc[0].section_id, "Appendix B");
    let sections = extract_sections(&pages, &toc);
    assert_eq!(sections[0].content, "rows follow");
}

#[test]
fn adjacent_entries_on_same_page_do_not_duplicate_text() {
    let pages = vec!["1 Intro\nshared body once\n2 Next\nrest".to_string()];
    let toc = entries_from(&["1 Intro section 1\n2 Next section 1\n".to_string()]);
    assert_eq!(toc.len(), 2);
    let sections = extract_sections(&pages, &toc);
    // degenerate window: start page == end page, end anchor pass skipped
    assert_eq!(sections[0].content.matches("shared body once").count(), 1);
    assert_eq!(sections[1].content.matches("rest").count(), 1);
}

#[test]
fn out_of_range_page_is_clamped() {
    let pages = vec!["only page text".to_string()];
    let mut toc = entries_from(&["5 Phantom entry 1\n".to_string()]);
    toc[0].page = 40;
    let sections = extract_sections(&pages, &toc);
    assert_eq!(sections[0].content, "only page text");
}

#[test]
fn one_section_per_entry_in_order() {
    let pages = vec![
        "1 First thing 1\n2 Second thing 1\n".to_string(),
        "body".to_string(),
    ];
    let toc = entries_from(&pages);
    let sections = extract_sections(&pages, &toc);
    assert_eq!(sections.len(), toc.len());
    for (s, e) in sections.iter().zip(toc.iter()) {
        assert_eq!(s.entry.section_id, e.section_id);
    }
}

#[test]
fn empty_page_sequence_yields_empty_content() {
    let toc = entries_from(&["1 Something here 1\n".to_string()]);
    let sections = extract_sections(&[], &toc);
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].content, "");
}

#[test]
fn pipeline_is_idempotent() {
    let pages = vec![
        "1 Introduction text 2\n2 Details follow 5\n".to_string(),
        "1 Introduction\nbody of one\n2 Details\nbody of two".to_string(),
    ];
    let run = || {
        let toc = assemble_toc(&pages, "Doc", &RegexRecognizer).unwrap();
        let sorted = sort_entries_by_page(&toc);
        let sections = extract_sections(&pages, &sorted);
        (
            serde_json::to_string(&toc).unwrap(),
            serde_json::to_string(&sections).unwrap(),
        )
    };
    assert_eq!(run(), run());
}
