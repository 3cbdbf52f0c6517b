//! Result mapping.
//!
//! Parses the engine's two result files (the wanted/recognized list,
//! then the faces-found list, always in that order), resolves the
//! embedded evidence ids back to case files, and creates findings, derived
//! annotated-file records, and provenance enrichment. Every per-line and
//! per-file failure is recovered locally: one corrupt line never aborts a
//! multi-thousand-file batch.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::MODULE_NAME;
use crate::case::{ArtifactOutcome, CaseStore, DerivedFile, EvidenceFile};
use crate::config::Config;
use crate::hash::HashStats;
use crate::names;
use crate::provenance::{self, DFXML_FNAME};

/// Engine output listing images where the wanted person was recognized.
pub const WANTED_FNAME: &str = "wanted.txt";
/// Engine output listing images with at least one detected face.
pub const FACES_FOUND_FNAME: &str = "faces_found.txt";
/// Workspace subdirectory with annotated copies (faces boxed).
pub const ANNOTATED_DIR: &str = "annotated";
/// Label prefix for derived annotated files.
pub const ANNOTATED_LABEL: &str = "Annotated_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindingCategory {
    WantedFaces,
    ImagesWithFaces,
}

impl FindingCategory {
    pub fn label(&self) -> &'static str {
        match self {
            FindingCategory::WantedFaces => "Wanted faces",
            FindingCategory::ImagesWithFaces => "Images with faces",
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct MapOutcome {
    /// Lines in the faces-found list, i.e. images with at least one face.
    pub images_with_faces: u64,
    pub findings_created: u64,
    pub derived_registered: u64,
    pub enriched: u64,
}

/// Map both result files under `workspace` onto the evidence set.
pub fn map_results(
    case: &mut dyn CaseStore,
    files: &[EvidenceFile],
    source_name: &str,
    workspace: &Path,
    cfg: &Config,
    stats: &mut HashStats,
) -> MapOutcome {
    ResultMapper::new(case, files, source_name, workspace, cfg, stats).run()
}

struct ResultMapper<'a> {
    case: &'a mut dyn CaseStore,
    index: HashMap<u64, &'a EvidenceFile>,
    source_name: &'a str,
    workspace: &'a Path,
    cfg: &'a Config,
    stats: &'a mut HashStats,
    /// Evidence ids whose provenance entry was already enriched this run.
    enriched: HashSet<u64>,
    outcome: MapOutcome,
}

impl<'a> ResultMapper<'a> {
    fn new(
        case: &'a mut dyn CaseStore,
        files: &'a [EvidenceFile],
        source_name: &'a str,
        workspace: &'a Path,
        cfg: &'a Config,
        stats: &'a mut HashStats,
    ) -> Self {
        let index = files.iter().map(|file| (file.id, file)).collect();
        Self {
            case,
            index,
            source_name,
            workspace,
            cfg,
            stats,
            enriched: HashSet::new(),
            outcome: MapOutcome::default(),
        }
    }

    fn run(mut self) -> MapOutcome {
        // The wanted list is always mapped before the faces-found list.
        self.process_list(WANTED_FNAME, FindingCategory::WantedFaces);
        self.process_list(FACES_FOUND_FNAME, FindingCategory::ImagesWithFaces);
        self.outcome
    }

    fn process_list(&mut self, fname: &str, category: FindingCategory) {
        let path = self.workspace.join(fname);
        if !path.exists() {
            info!("no {fname} result file in workspace; nothing to map");
            return;
        }
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) => {
                warn!("cannot open result file {}: {err}", path.display());
                return;
            }
        };

        for line in BufReader::new(file).lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    warn!("unreadable line in {fname}: {err}");
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            if category == FindingCategory::ImagesWithFaces {
                self.outcome.images_with_faces += 1;
            }
            self.process_line(&line, category);
        }
    }

    fn process_line(&mut self, line: &str, category: FindingCategory) {
        let Some(record) = names::parse_result_line(line) else {
            debug!("malformed result line skipped: '{line}'");
            return;
        };
        // Stale or corrupted ids resolve to nothing; skip silently.
        let Some(evidence) = self.index.get(&record.evidence_id).copied() else {
            debug!("result line references unknown evidence id {}", record.evidence_id);
            return;
        };

        let label = format!("{}/{}", self.source_name, category.label());
        let handle = match self.case.new_artifact_for_file(evidence.id, &label) {
            Ok(ArtifactOutcome::Created(handle)) => handle,
            Ok(ArtifactOutcome::AlreadyExists) => {
                info!("finding already exists for '{}' ({label}); ignoring", evidence.name);
                return;
            }
            Err(err) => {
                warn!("failed to create finding for '{}': {err}", evidence.name);
                return;
            }
        };
        self.outcome.findings_created += 1;

        // An indexing failure leaves the finding in place, just unindexed.
        if let Err(err) = self.case.index_artifact(&handle) {
            warn!("error indexing finding for '{}': {err}", evidence.name);
        }

        self.register_annotated(evidence);

        if self.cfg.generate_hashes {
            self.enrich(evidence);
        }
    }

    /// Register the staged annotated image for this evidence file, if the
    /// engine produced one. The staged path is reconstructed from
    /// name+id+extension; that naming is a fixed contract with the engine.
    fn register_annotated(&mut self, evidence: &EvidenceFile) {
        let (base, _ext) = names::split_base_and_extension(&evidence.name);
        if base.is_empty() {
            warn!(
                "cannot decompose filename '{}' into base+extension; derived file skipped",
                evidence.name
            );
            return;
        }

        let staged_name = names::staged_file_name(&evidence.name, evidence.id);
        let annotated_path = self.workspace.join(ANNOTATED_DIR).join(&staged_name);
        if !annotated_path.exists() {
            debug!("no annotated image for '{}'", evidence.name);
            return;
        }
        let size = match std::fs::metadata(&annotated_path) {
            Ok(meta) => meta.len(),
            Err(err) => {
                warn!("cannot stat annotated image {}: {err}", annotated_path.display());
                return;
            }
        };

        let derived = DerivedFile {
            label: format!("{ANNOTATED_LABEL}{}", evidence.name),
            relative_path: format!("{ANNOTATED_DIR}/{staged_name}"),
            size,
            source_id: evidence.id,
            module: MODULE_NAME.to_string(),
        };
        match self.case.add_derived_file(&derived) {
            Ok(()) => self.outcome.derived_registered += 1,
            Err(err) => warn!("failed to register derived file for '{}': {err}", evidence.name),
        }
    }

    /// Enrich the provenance entry at most once per file. A file listed in
    /// both result lists gets two findings but must not accumulate a second
    /// set of hash nodes.
    fn enrich(&mut self, evidence: &EvidenceFile) {
        if !self.enriched.insert(evidence.id) {
            debug!("provenance entry for '{}' already enriched", evidence.name);
            return;
        }
        let doc_path = self.workspace.join(DFXML_FNAME);
        if !doc_path.exists() {
            debug!("no provenance document in workspace; enrichment skipped");
            return;
        }
        match provenance::enrich_document(
            &doc_path,
            evidence,
            &*self.case,
            self.cfg.generate_hashes,
            self.stats,
        ) {
            Ok(true) => self.outcome.enriched += 1,
            Ok(false) => {}
            Err(err) => warn!("provenance enrichment failed for '{}': {err}", evidence.name),
        }
    }
}
