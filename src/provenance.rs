//! Provenance (DFXML) enrichment.
//!
//! The engine emits a DFXML document with one `fileobject` element per
//! processed file. After mapping, each finding's entry is completed with
//! `hashdigest` children (sha1, then sha256, then md5), matched by
//! the file's base name. The document is re-read and rewritten in place on
//! every call; the caller invokes this at most once per file or duplicate
//! hash nodes will accumulate.

use std::path::Path;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use thiserror::Error;
use tracing::{debug, warn};

use crate::case::{CaseError, CaseStore, EvidenceFile};
use crate::hash::{self, HashAlgorithm, HashError, HashStats};
use crate::names;

/// Name of the provenance document inside the workspace.
pub const DFXML_FNAME: &str = "dfxml.xml";

/// Placeholder digest written when hashing is disabled, preserving the
/// document shape.
const DISABLED_DIGEST: &str = "0";

#[derive(Debug, Error)]
pub enum ProvenanceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("case error: {0}")]
    Case(#[from] CaseError),
    #[error("hash error: {0}")]
    Hash(#[from] HashError),
}

struct Digests {
    sha1: String,
    sha256: String,
    md5: String,
}

/// Append hash nodes to every `fileobject` whose `filename` equals the
/// target file's base name. Returns whether any entry matched.
///
/// When `compute_hashes` is false, placeholder zero digests are written
/// instead so downstream consumers still see the three nodes.
pub fn enrich_document(
    doc_path: &Path,
    file: &EvidenceFile,
    case: &dyn CaseStore,
    compute_hashes: bool,
    stats: &mut HashStats,
) -> Result<bool, ProvenanceError> {
    if !file.readable {
        debug!("'{}' is not readable; provenance entry left bare", file.name);
        return Ok(false);
    }

    let digests = compute_digests(case, file, compute_hashes, stats)?;
    let (target_base, _) = names::split_base_and_extension(&file.name);

    let xml = std::fs::read_to_string(doc_path)?;
    let mut reader = Reader::from_str(&xml);
    let mut writer = Writer::new(Vec::new());

    let mut in_fileobject = false;
    let mut in_filename = false;
    let mut current_name = String::new();
    let mut matched = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                match e.name().as_ref() {
                    b"fileobject" => {
                        in_fileobject = true;
                        current_name.clear();
                    }
                    b"filename" if in_fileobject => in_filename = true,
                    _ => {}
                }
                writer.write_event(Event::Start(e))?;
            }
            Event::Text(t) => {
                if in_filename {
                    current_name.push_str(&t.unescape()?);
                }
                writer.write_event(Event::Text(t))?;
            }
            Event::End(e) => {
                match e.name().as_ref() {
                    b"filename" => in_filename = false,
                    b"fileobject" => {
                        if in_fileobject && current_name == target_base {
                            write_hash_nodes(&mut writer, &digests)?;
                            matched = true;
                        }
                        in_fileobject = false;
                    }
                    _ => {}
                }
                writer.write_event(Event::End(e))?;
            }
            Event::Eof => break,
            other => writer.write_event(other)?,
        }
    }

    std::fs::write(doc_path, writer.into_inner())?;

    if !matched {
        warn!(
            "no provenance entry with filename '{}' found in {}",
            target_base,
            doc_path.display()
        );
    }
    Ok(matched)
}

fn compute_digests(
    case: &dyn CaseStore,
    file: &EvidenceFile,
    compute_hashes: bool,
    stats: &mut HashStats,
) -> Result<Digests, ProvenanceError> {
    if !compute_hashes {
        return Ok(Digests {
            sha1: DISABLED_DIGEST.to_string(),
            sha256: DISABLED_DIGEST.to_string(),
            md5: DISABLED_DIGEST.to_string(),
        });
    }

    let mut digest_for = |algorithm: HashAlgorithm| -> Result<String, ProvenanceError> {
        let output = hash::hash_stream(case.open_content(file)?, algorithm)?;
        stats.record(algorithm, output.elapsed);
        Ok(output.hex_digest)
    };

    Ok(Digests {
        sha1: digest_for(HashAlgorithm::Sha1)?,
        sha256: digest_for(HashAlgorithm::Sha256)?,
        md5: digest_for(HashAlgorithm::Md5)?,
    })
}

fn write_hash_nodes(
    writer: &mut Writer<Vec<u8>>,
    digests: &Digests,
) -> Result<(), ProvenanceError> {
    // Order is part of the document contract: sha1, sha256, md5.
    for (label, digest) in [
        (HashAlgorithm::Sha1.label(), &digests.sha1),
        (HashAlgorithm::Sha256.label(), &digests.sha256),
        (HashAlgorithm::Md5.label(), &digests.md5),
    ] {
        let mut node = BytesStart::new("hashdigest");
        node.push_attribute(("type", label));
        writer.write_event(Event::Start(node))?;
        writer.write_event(Event::Text(BytesText::new(digest)))?;
        writer.write_event(Event::End(BytesEnd::new("hashdigest")))?;
    }
    Ok(())
}
