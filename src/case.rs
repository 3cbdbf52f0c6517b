//! Seam to the host case-management system.
//!
//! The pipeline never owns evidence: it reads [`EvidenceFile`] records and
//! content streams through [`CaseStore`] and writes findings and derived
//! files back through the same trait. [`LocalCase`] is the directory-backed
//! implementation used by the CLI; [`MemoryCase`] backs tests and dry runs.

use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::names;

#[derive(Debug, Error)]
pub enum CaseError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("no evidence file with id {0}")]
    NoSuchEvidence(u64),
    #[error("indexing failed: {0}")]
    Index(String),
}

/// One evidence file as enumerated by the host case system. Immutable from
/// the pipeline's point of view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceFile {
    pub id: u64,
    pub name: String,
    pub size: u64,
    /// Extension without the leading dot; empty when the name has none.
    pub extension: String,
    pub readable: bool,
}

impl EvidenceFile {
    pub fn from_name(id: u64, name: &str, size: u64, readable: bool) -> Self {
        let (_, ext) = names::split_base_and_extension(name);
        Self {
            id,
            name: name.to_string(),
            size,
            extension: ext.to_string(),
            readable,
        }
    }
}

/// Handle to a finding created through [`CaseStore::new_artifact_for_file`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactHandle {
    pub evidence_id: u64,
    pub category: String,
}

/// Result of attempting to create a finding.
#[derive(Debug)]
pub enum ArtifactOutcome {
    Created(ArtifactHandle),
    AlreadyExists,
}

/// A case-visible pointer to a staged annotated image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DerivedFile {
    pub label: String,
    pub relative_path: String,
    pub size: u64,
    pub source_id: u64,
    pub module: String,
}

/// Findings and content API of the host case system. The host serializes
/// concurrent writers; one pipeline run talks to one store.
pub trait CaseStore {
    /// Open the byte stream of an evidence file.
    fn open_content(&self, file: &EvidenceFile) -> Result<Box<dyn Read>, CaseError>;

    /// Create a finding of `category` on the given evidence file, unless
    /// one already exists.
    fn new_artifact_for_file(
        &mut self,
        evidence_id: u64,
        category: &str,
    ) -> Result<ArtifactOutcome, CaseError>;

    /// Request keyword indexing of a finding. Failures leave the finding
    /// in place.
    fn index_artifact(&mut self, artifact: &ArtifactHandle) -> Result<(), CaseError>;

    /// Register an annotated derivative of an evidence file.
    fn add_derived_file(&mut self, derived: &DerivedFile) -> Result<(), CaseError>;
}

// ---------------------------------------------------------------------------
// Directory-backed store used by the CLI
// ---------------------------------------------------------------------------

const FINDINGS_FNAME: &str = "findings.jsonl";
const DERIVED_FNAME: &str = "derived_files.jsonl";

/// Case store backed by an evidence directory. Findings and derived files
/// are appended to JSONL logs under the case directory; the findings log
/// doubles as the idempotency record across runs.
pub struct LocalCase {
    evidence: Vec<EvidenceFile>,
    paths: HashMap<u64, PathBuf>,
    findings: BufWriter<File>,
    derived: BufWriter<File>,
    existing: HashSet<(u64, String)>,
}

impl LocalCase {
    /// Enumerate `evidence_root` (recursively, in filename order) and open
    /// the findings logs under `case_dir`.
    pub fn open(evidence_root: &Path, case_dir: &Path) -> Result<Self, CaseError> {
        std::fs::create_dir_all(case_dir)?;

        let mut evidence = Vec::new();
        let mut paths = HashMap::new();
        let mut next_id = 1u64;
        let walker = walkdir::WalkDir::new(evidence_root).sort_by_file_name();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("skipping unreadable directory entry: {err}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            evidence.push(EvidenceFile::from_name(next_id, &name, size, true));
            paths.insert(next_id, entry.into_path());
            next_id += 1;
        }

        let findings_path = case_dir.join(FINDINGS_FNAME);
        let existing = load_existing_findings(&findings_path)?;
        if !existing.is_empty() {
            debug!("loaded {} existing findings from previous runs", existing.len());
        }

        let findings = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&findings_path)?;
        let derived = OpenOptions::new()
            .create(true)
            .append(true)
            .open(case_dir.join(DERIVED_FNAME))?;

        Ok(Self {
            evidence,
            paths,
            findings: BufWriter::new(findings),
            derived: BufWriter::new(derived),
            existing,
        })
    }

    pub fn evidence(&self) -> &[EvidenceFile] {
        &self.evidence
    }

    pub fn flush(&mut self) -> Result<(), CaseError> {
        self.findings.flush()?;
        self.derived.flush()?;
        Ok(())
    }
}

fn load_existing_findings(path: &Path) -> Result<HashSet<(u64, String)>, CaseError> {
    let mut existing = HashSet::new();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(existing),
        Err(err) => return Err(err.into()),
    };
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ArtifactHandle>(&line) {
            Ok(handle) => {
                existing.insert((handle.evidence_id, handle.category));
            }
            Err(err) => warn!("malformed findings log line skipped: {err}"),
        }
    }
    Ok(existing)
}

impl CaseStore for LocalCase {
    fn open_content(&self, file: &EvidenceFile) -> Result<Box<dyn Read>, CaseError> {
        let path = self
            .paths
            .get(&file.id)
            .ok_or(CaseError::NoSuchEvidence(file.id))?;
        Ok(Box::new(File::open(path)?))
    }

    fn new_artifact_for_file(
        &mut self,
        evidence_id: u64,
        category: &str,
    ) -> Result<ArtifactOutcome, CaseError> {
        if !self.paths.contains_key(&evidence_id) {
            return Err(CaseError::NoSuchEvidence(evidence_id));
        }
        let key = (evidence_id, category.to_string());
        if self.existing.contains(&key) {
            return Ok(ArtifactOutcome::AlreadyExists);
        }
        let handle = ArtifactHandle {
            evidence_id,
            category: category.to_string(),
        };
        serde_json::to_writer(&mut self.findings, &handle)?;
        self.findings.write_all(b"\n")?;
        self.existing.insert(key);
        Ok(ArtifactOutcome::Created(handle))
    }

    fn index_artifact(&mut self, artifact: &ArtifactHandle) -> Result<(), CaseError> {
        // The local store has no keyword index.
        debug!(
            "no keyword index for local case; finding ({}, {}) left unindexed",
            artifact.evidence_id, artifact.category
        );
        Ok(())
    }

    fn add_derived_file(&mut self, derived: &DerivedFile) -> Result<(), CaseError> {
        serde_json::to_writer(&mut self.derived, derived)?;
        self.derived.write_all(b"\n")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory store for tests and dry runs
// ---------------------------------------------------------------------------

/// In-memory case store. Evidence content lives in a map; findings and
/// derived files accumulate in plain vectors for inspection.
#[derive(Default)]
pub struct MemoryCase {
    pub evidence: Vec<EvidenceFile>,
    content: HashMap<u64, Vec<u8>>,
    pub findings: Vec<ArtifactHandle>,
    pub indexed: Vec<ArtifactHandle>,
    pub derived: Vec<DerivedFile>,
    /// When set, `index_artifact` fails; the finding must survive anyway.
    pub fail_indexing: bool,
}

impl MemoryCase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, id: u64, name: &str, content: &[u8]) {
        self.evidence
            .push(EvidenceFile::from_name(id, name, content.len() as u64, true));
        self.content.insert(id, content.to_vec());
    }

    pub fn evidence(&self) -> &[EvidenceFile] {
        &self.evidence
    }

    pub fn findings_for(&self, evidence_id: u64) -> Vec<&ArtifactHandle> {
        self.findings
            .iter()
            .filter(|f| f.evidence_id == evidence_id)
            .collect()
    }
}

impl CaseStore for MemoryCase {
    fn open_content(&self, file: &EvidenceFile) -> Result<Box<dyn Read>, CaseError> {
        let bytes = self
            .content
            .get(&file.id)
            .ok_or(CaseError::NoSuchEvidence(file.id))?
            .clone();
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn new_artifact_for_file(
        &mut self,
        evidence_id: u64,
        category: &str,
    ) -> Result<ArtifactOutcome, CaseError> {
        if !self.content.contains_key(&evidence_id) {
            return Err(CaseError::NoSuchEvidence(evidence_id));
        }
        if self
            .findings
            .iter()
            .any(|f| f.evidence_id == evidence_id && f.category == category)
        {
            return Ok(ArtifactOutcome::AlreadyExists);
        }
        let handle = ArtifactHandle {
            evidence_id,
            category: category.to_string(),
        };
        self.findings.push(handle.clone());
        Ok(ArtifactOutcome::Created(handle))
    }

    fn index_artifact(&mut self, artifact: &ArtifactHandle) -> Result<(), CaseError> {
        if self.fail_indexing {
            return Err(CaseError::Index("index backend unavailable".to_string()));
        }
        self.indexed.push(artifact.clone());
        Ok(())
    }

    fn add_derived_file(&mut self, derived: &DerivedFile) -> Result<(), CaseError> {
        self.derived.push(derived.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_case_findings_are_idempotent() {
        let mut case = MemoryCase::new();
        case.add_file(1, "a.jpg", b"bytes");

        let first = case.new_artifact_for_file(1, "Images with faces").expect("create");
        assert!(matches!(first, ArtifactOutcome::Created(_)));

        let second = case.new_artifact_for_file(1, "Images with faces").expect("repeat");
        assert!(matches!(second, ArtifactOutcome::AlreadyExists));
        assert_eq!(case.findings.len(), 1);
    }

    #[test]
    fn memory_case_rejects_unknown_evidence() {
        let mut case = MemoryCase::new();
        let err = case.new_artifact_for_file(99, "Images with faces");
        assert!(matches!(err, Err(CaseError::NoSuchEvidence(99))));
    }

    #[test]
    fn evidence_file_extension_derives_from_name() {
        let file = EvidenceFile::from_name(1, "photo.backup.JPG", 10, true);
        assert_eq!(file.extension, "JPG");
        let bare = EvidenceFile::from_name(2, "README", 10, true);
        assert_eq!(bare.extension, "");
    }

    #[test]
    fn local_case_enumerates_and_persists_findings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let evidence_root = dir.path().join("evidence");
        std::fs::create_dir_all(&evidence_root).expect("mkdir");
        std::fs::write(evidence_root.join("a.jpg"), vec![1u8; 64]).expect("write");
        std::fs::write(evidence_root.join("b.png"), vec![2u8; 32]).expect("write");

        let case_dir = dir.path().join("case");
        let mut case = LocalCase::open(&evidence_root, &case_dir).expect("open");
        assert_eq!(case.evidence().len(), 2);
        assert_eq!(case.evidence()[0].name, "a.jpg");
        assert_eq!(case.evidence()[0].size, 64);

        let outcome = case.new_artifact_for_file(1, "Images with faces").expect("create");
        assert!(matches!(outcome, ArtifactOutcome::Created(_)));
        case.flush().expect("flush");
        drop(case);

        // A second run sees the finding from the log and refuses duplicates.
        let mut case = LocalCase::open(&evidence_root, &case_dir).expect("reopen");
        let outcome = case.new_artifact_for_file(1, "Images with faces").expect("repeat");
        assert!(matches!(outcome, ArtifactOutcome::AlreadyExists));
    }
}
