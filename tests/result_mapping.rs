use std::fs;
use std::path::Path;

use facetriage::case::{CaseStore, MemoryCase};
use facetriage::config;
use facetriage::hash::HashStats;
use facetriage::names;
use facetriage::provenance::DFXML_FNAME;
use facetriage::results::{self, ANNOTATED_DIR, FACES_FOUND_FNAME, WANTED_FNAME};

fn test_config() -> config::Config {
    let mut cfg = config::load_config(None).expect("config").config;
    cfg.run_id = "mapping_test".to_string();
    cfg.generate_hashes = false;
    cfg
}

fn write_results(workspace: &Path, wanted: &[&str], faces: &[&str]) {
    fs::create_dir_all(workspace).expect("workspace");
    fs::write(workspace.join(WANTED_FNAME), wanted.join("\n")).expect("wanted");
    fs::write(workspace.join(FACES_FOUND_FNAME), faces.join("\n")).expect("faces");
}

#[test]
fn creates_findings_for_both_result_lists() {
    let dir = tempfile::tempdir().expect("tempdir");
    let workspace = dir.path().join("run");

    let mut case = MemoryCase::new();
    case.add_file(1, "a.jpg", &vec![1u8; 64]);
    case.add_file(2, "b.jpg", &vec![2u8; 64]);
    let files = case.evidence().to_vec();

    write_results(&workspace, &["a__id__1.jpg"], &["a__id__1.jpg", "b__id__2.jpg"]);

    let cfg = test_config();
    let mut stats = HashStats::default();
    let outcome = results::map_results(&mut case, &files, "usb01", &workspace, &cfg, &mut stats);

    assert_eq!(outcome.images_with_faces, 2);
    assert_eq!(outcome.findings_created, 3);

    let a_findings = case.findings_for(1);
    assert_eq!(a_findings.len(), 2);
    assert_eq!(a_findings[0].category, "usb01/Wanted faces");
    assert_eq!(a_findings[1].category, "usb01/Images with faces");
    assert_eq!(case.findings_for(2)[0].category, "usb01/Images with faces");
    assert_eq!(case.indexed.len(), 3);
}

#[test]
fn mapping_twice_creates_nothing_new() {
    let dir = tempfile::tempdir().expect("tempdir");
    let workspace = dir.path().join("run");

    let mut case = MemoryCase::new();
    case.add_file(1, "a.jpg", &vec![1u8; 64]);
    let files = case.evidence().to_vec();

    write_results(&workspace, &[], &["a__id__1.jpg"]);

    let cfg = test_config();
    let mut stats = HashStats::default();
    let first = results::map_results(&mut case, &files, "usb01", &workspace, &cfg, &mut stats);
    assert_eq!(first.findings_created, 1);

    let second = results::map_results(&mut case, &files, "usb01", &workspace, &cfg, &mut stats);
    assert_eq!(second.findings_created, 0);
    // The line is still counted, only the finding is deduplicated.
    assert_eq!(second.images_with_faces, 1);
    assert_eq!(case.findings.len(), 1);
}

#[test]
fn malformed_and_unknown_id_lines_are_skipped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let workspace = dir.path().join("run");

    let mut case = MemoryCase::new();
    case.add_file(1, "a.jpg", &vec![1u8; 64]);
    let files = case.evidence().to_vec();

    write_results(
        &workspace,
        &[],
        &["no_separator.jpg", "gone__id__42.jpg", "a__id__1.jpg", ""],
    );

    let cfg = test_config();
    let mut stats = HashStats::default();
    let outcome = results::map_results(&mut case, &files, "usb01", &workspace, &cfg, &mut stats);

    // Empty lines are not counted; malformed ones are counted but unmapped.
    assert_eq!(outcome.images_with_faces, 3);
    assert_eq!(outcome.findings_created, 1);
    assert_eq!(case.findings.len(), 1);
    assert_eq!(case.findings[0].evidence_id, 1);
}

#[test]
fn missing_result_files_map_to_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let workspace = dir.path().join("run");
    fs::create_dir_all(&workspace).expect("workspace");

    let mut case = MemoryCase::new();
    case.add_file(1, "a.jpg", &vec![1u8; 64]);
    let files = case.evidence().to_vec();

    let cfg = test_config();
    let mut stats = HashStats::default();
    let outcome = results::map_results(&mut case, &files, "usb01", &workspace, &cfg, &mut stats);
    assert_eq!(outcome.findings_created, 0);
    assert!(case.findings.is_empty());
}

#[test]
fn registers_annotated_image_as_derived_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let workspace = dir.path().join("run");

    let mut case = MemoryCase::new();
    case.add_file(7, "holiday.jpg", &vec![3u8; 64]);
    let files = case.evidence().to_vec();

    write_results(&workspace, &[], &["holiday__id__7.jpg"]);
    let staged_name = names::staged_file_name("holiday.jpg", 7);
    let annotated_dir = workspace.join(ANNOTATED_DIR);
    fs::create_dir_all(&annotated_dir).expect("annotated dir");
    fs::write(annotated_dir.join(&staged_name), vec![4u8; 128]).expect("annotated file");

    let cfg = test_config();
    let mut stats = HashStats::default();
    let outcome = results::map_results(&mut case, &files, "usb01", &workspace, &cfg, &mut stats);

    assert_eq!(outcome.derived_registered, 1);
    let derived = &case.derived[0];
    assert_eq!(derived.label, "Annotated_holiday.jpg");
    assert_eq!(derived.relative_path, "annotated/holiday__id__7.jpg");
    assert_eq!(derived.size, 128);
    assert_eq!(derived.source_id, 7);
}

#[test]
fn file_in_both_lists_is_enriched_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let workspace = dir.path().join("run");

    let mut case = MemoryCase::new();
    case.add_file(1, "a.jpg", b"abc");
    let files = case.evidence().to_vec();

    // A recognized wanted face is also a detected face, so the same line
    // shows up in both result files.
    write_results(&workspace, &["a__id__1.jpg"], &["a__id__1.jpg"]);
    fs::write(
        workspace.join(DFXML_FNAME),
        "<dfxml><fileobject><filename>a</filename></fileobject></dfxml>",
    )
    .expect("write dfxml");

    let mut cfg = test_config();
    cfg.generate_hashes = true;
    let mut stats = HashStats::default();
    let outcome = results::map_results(&mut case, &files, "usb01", &workspace, &cfg, &mut stats);

    assert_eq!(outcome.findings_created, 2);
    assert_eq!(outcome.enriched, 1);

    let doc = fs::read_to_string(workspace.join(DFXML_FNAME)).expect("read back");
    assert_eq!(doc.matches("<hashdigest").count(), 3);
}

#[test]
fn indexing_failure_keeps_the_finding() {
    let dir = tempfile::tempdir().expect("tempdir");
    let workspace = dir.path().join("run");

    let mut case = MemoryCase::new();
    case.add_file(1, "a.jpg", &vec![1u8; 64]);
    case.fail_indexing = true;
    let files = case.evidence().to_vec();

    write_results(&workspace, &[], &["a__id__1.jpg"]);

    let cfg = test_config();
    let mut stats = HashStats::default();
    let outcome = results::map_results(&mut case, &files, "usb01", &workspace, &cfg, &mut stats);

    assert_eq!(outcome.findings_created, 1);
    assert_eq!(case.findings.len(), 1);
    assert!(case.indexed.is_empty());
}
