use std::fs;

use facetriage::case::MemoryCase;
use facetriage::hash::HashStats;
use facetriage::provenance::{self, DFXML_FNAME};

const SHA1_ABC: &str = "a9993e364706816aba3e25717850c26c9cd0d89d";
const SHA256_ABC: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
const MD5_ABC: &str = "900150983cd24fb0d6963f7d28e17f72";

#[test]
fn appends_three_hash_nodes_in_fixed_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(DFXML_FNAME);
    fs::write(
        &path,
        "<dfxml><fileobject><filename>a</filename><filesize>3</filesize></fileobject>\
         <fileobject><filename>b</filename></fileobject></dfxml>",
    )
    .expect("write dfxml");

    let mut case = MemoryCase::new();
    case.add_file(1, "a.jpg", b"abc");
    let file = case.evidence()[0].clone();

    let mut stats = HashStats::default();
    let matched =
        provenance::enrich_document(&path, &file, &case, true, &mut stats).expect("enrich");
    assert!(matched);

    let doc = fs::read_to_string(&path).expect("read back");
    let expected = format!(
        "<hashdigest type=\"sha1\">{SHA1_ABC}</hashdigest>\
         <hashdigest type=\"sha256\">{SHA256_ABC}</hashdigest>\
         <hashdigest type=\"md5\">{MD5_ABC}</hashdigest></fileobject>"
    );
    assert!(doc.contains(&expected), "hash nodes missing or misordered: {doc}");
    assert_eq!(doc.matches("<hashdigest").count(), 3);

    // The non-matching entry stays bare.
    assert!(doc.contains("<fileobject><filename>b</filename></fileobject>"));
}

#[test]
fn disabled_hashing_writes_placeholder_digests() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(DFXML_FNAME);
    fs::write(
        &path,
        "<dfxml><fileobject><filename>a</filename></fileobject></dfxml>",
    )
    .expect("write dfxml");

    let mut case = MemoryCase::new();
    case.add_file(1, "a.jpg", b"abc");
    let file = case.evidence()[0].clone();

    let mut stats = HashStats::default();
    let matched =
        provenance::enrich_document(&path, &file, &case, false, &mut stats).expect("enrich");
    assert!(matched);

    let doc = fs::read_to_string(&path).expect("read back");
    assert_eq!(doc.matches("<hashdigest type=\"sha1\">0</hashdigest>").count(), 1);
    assert_eq!(doc.matches("<hashdigest type=\"sha256\">0</hashdigest>").count(), 1);
    assert_eq!(doc.matches("<hashdigest type=\"md5\">0</hashdigest>").count(), 1);
    assert!(stats.md5.is_zero() && stats.sha1.is_zero() && stats.sha256.is_zero());
}

#[test]
fn matches_on_base_name_not_full_name() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(DFXML_FNAME);
    fs::write(
        &path,
        "<dfxml><fileobject><filename>a.jpg</filename></fileobject></dfxml>",
    )
    .expect("write dfxml");

    let mut case = MemoryCase::new();
    case.add_file(1, "a.jpg", b"abc");
    let file = case.evidence()[0].clone();

    let mut stats = HashStats::default();
    let matched =
        provenance::enrich_document(&path, &file, &case, true, &mut stats).expect("enrich");
    assert!(!matched);
}
