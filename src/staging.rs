//! Evidence staging.
//!
//! Copies candidate images out of the case into a plain directory tree the
//! engine can read: one `img/` directory for files at or above the size
//! threshold, one `small_files/` quarantine below it. Alongside the copies
//! it writes an append-only manifest of `<name>:<size>` lines and a
//! repeated-files report derived from an MD5 duplicate index. The MD5 here
//! is a content-equality heuristic for the report, not a forensic
//! guarantee.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use crate::case::{CaseError, CaseStore, EvidenceFile};
use crate::config::Config;
use crate::hash::{self, HashAlgorithm, HashError};
use crate::names;

/// Staged copies the engine scans.
pub const IMAGES_DIR: &str = "img";
/// Quarantine for files below the size threshold.
pub const SMALL_FILES_DIR: &str = "small_files";
/// Manifest of every enumerated file and its size.
pub const MANIFEST_FNAME: &str = "filenames+size.log.txt";
/// Report listing files whose content hash collided.
pub const REPEATED_FILES_FNAME: &str = "repeated_files.log.txt";

const SECTION_SEP: &str = "#---------------------------------------------------------";

#[derive(Debug, Error)]
pub enum StageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("case error: {0}")]
    Case(#[from] CaseError),
    #[error("hash error: {0}")]
    Hash(#[from] HashError),
}

#[derive(Debug, Default)]
pub struct StagingReport {
    pub total_files: u64,
    pub staged_files: u64,
    pub small_files: u64,
    pub skipped_annotated: u64,
    pub duplicate_groups: u64,
    /// False when a per-file copy failed and the loop was aborted; the
    /// partial manifest is kept but the repeated-files report is
    /// suppressed.
    pub files_copied: bool,
    /// True when the images directory already existed and staging was
    /// skipped for the whole run.
    pub already_staged: bool,
    pub elapsed: Duration,
}

/// Content-hash index used for the repeated-files report. Zero-byte files
/// are never recorded.
#[derive(Debug, Default)]
pub struct DuplicateIndex {
    entries: BTreeMap<String, DuplicateEntry>,
}

#[derive(Debug)]
pub struct DuplicateEntry {
    pub size: u64,
    pub names: Vec<String>,
}

impl DuplicateIndex {
    pub fn record(&mut self, digest: String, size: u64, name: &str) {
        self.entries
            .entry(digest)
            .and_modify(|entry| entry.names.push(name.to_string()))
            .or_insert_with(|| DuplicateEntry {
                size,
                names: vec![name.to_string()],
            });
    }

    /// Entries with more than one name, i.e. actual repetitions.
    pub fn duplicate_groups(&self) -> impl Iterator<Item = &DuplicateEntry> {
        self.entries.values().filter(|entry| entry.names.len() > 1)
    }
}

/// Stage `files` under `module_dir`.
///
/// Re-running against an already-staged module directory is a no-op, not
/// an error. A copy failure aborts the remaining loop but preserves the
/// partial manifest.
pub fn stage(
    case: &dyn CaseStore,
    files: &[EvidenceFile],
    cfg: &Config,
    module_dir: &Path,
) -> Result<StagingReport, StageError> {
    let start = Instant::now();
    let mut report = StagingReport {
        files_copied: true,
        ..StagingReport::default()
    };

    let images_dir = module_dir.join(IMAGES_DIR);
    if images_dir.exists() {
        info!(
            "staging directory {} already exists; treating run as already staged",
            images_dir.display()
        );
        report.already_staged = true;
        report.elapsed = start.elapsed();
        return Ok(report);
    }

    std::fs::create_dir_all(module_dir)?;
    std::fs::create_dir(&images_dir)?;
    let small_dir = module_dir.join(SMALL_FILES_DIR);
    std::fs::create_dir(&small_dir)?;

    let mut manifest = BufWriter::new(File::create(module_dir.join(MANIFEST_FNAME))?);
    writeln!(manifest, "{SECTION_SEP}")?;
    writeln!(manifest, "# Filename:size (bytes)")?;
    writeln!(manifest, "# START: {}", timestamp())?;
    writeln!(manifest, "{SECTION_SEP}")?;

    let mut index = DuplicateIndex::default();

    for file in files {
        report.total_files += 1;

        if names::has_annotated_prefix(&file.name) {
            info!("annotated output re-ingested as evidence: '{}' (skipping)", file.name);
            report.skipped_annotated += 1;
            continue;
        }

        writeln!(manifest, "{}:{}", file.name, file.size)?;

        if let Err(err) = stage_one(case, file, cfg, &images_dir, &small_dir, &mut report, &mut index)
        {
            warn!("staging aborted after failure on '{}': {err}", file.name);
            report.files_copied = false;
            break;
        }
    }

    writeln!(manifest, "# DONE: {}", timestamp())?;
    if !report.files_copied {
        writeln!(manifest, "# Exception occurred")?;
    }
    manifest.flush()?;

    if report.files_copied {
        report.duplicate_groups =
            write_repeated_report(&index, &module_dir.join(REPEATED_FILES_FNAME))?;
    } else {
        info!("repeated-files report suppressed: staging did not cover the full set");
    }

    report.elapsed = start.elapsed();
    info!(
        "staged {} of {} files ({} quarantined below {} bytes, {} annotated skipped)",
        report.staged_files,
        report.total_files,
        report.small_files,
        cfg.min_file_size,
        report.skipped_annotated
    );
    Ok(report)
}

fn stage_one(
    case: &dyn CaseStore,
    file: &EvidenceFile,
    cfg: &Config,
    images_dir: &Path,
    small_dir: &Path,
    report: &mut StagingReport,
    index: &mut DuplicateIndex,
) -> Result<(), StageError> {
    let staged_name = names::staged_file_name(&file.name, file.id);

    if file.size >= cfg.min_file_size {
        copy_content(case, file, &images_dir.join(&staged_name))?;
        report.staged_files += 1;
    } else {
        copy_content(case, file, &small_dir.join(&staged_name))?;
        report.small_files += 1;
        info!("quarantining small file: {} ({} bytes)", file.name, file.size);
    }

    if file.size > 0 {
        let digest = hash::hash_stream(case.open_content(file)?, HashAlgorithm::Md5)?;
        index.record(digest.hex_digest, file.size, &file.name);
    }

    Ok(())
}

fn copy_content(case: &dyn CaseStore, file: &EvidenceFile, dest: &Path) -> Result<(), StageError> {
    let mut reader = case.open_content(file)?;
    let mut out = File::create(dest)?;
    std::io::copy(&mut reader, &mut out)?;
    Ok(())
}

/// Write the repeated-files report and return the number of duplicate
/// groups listed.
fn write_repeated_report(index: &DuplicateIndex, path: &Path) -> Result<u64, StageError> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "{SECTION_SEP}")?;
    writeln!(out, "# Repeated files")?;
    writeln!(out, "# {}", timestamp())?;
    writeln!(out, "{SECTION_SEP}")?;

    let mut groups = 0u64;
    for entry in index.duplicate_groups() {
        let mut line = entry.size.to_string();
        for name in &entry.names {
            line.push(':');
            line.push_str(name);
        }
        writeln!(out, "{line}")?;
        groups += 1;
    }

    writeln!(out, "{SECTION_SEP}")?;
    writeln!(out, "# DONE: {}", timestamp())?;
    writeln!(out, "{SECTION_SEP}")?;
    out.flush()?;
    Ok(groups)
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d_%Hh%Mm%Ss").to_string()
}
