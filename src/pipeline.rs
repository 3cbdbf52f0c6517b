//! Sequential triage pipeline.
//!
//! One orchestrating thread drives the three phases in order: staging,
//! engine subprocess, result mapping. Only the engine phase is
//! cancellable; staging runs to completion or failure, and the cancel
//! flag is re-checked between phases. Each evidence source gets an
//! isolated working directory keyed by its name, so concurrent runs of
//! different sources never share mutable files.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::case::{CaseStore, EvidenceFile};
use crate::config::Config;
use crate::engine::{self, EngineExit, EngineInvocation, EngineOutcome, RunConfig};
use crate::hash::HashStats;
use crate::results;
use crate::staging;

/// Subdirectory under `<output>/<source>` holding this module's files.
pub const MODULE_DIR: &str = "triage";

/// Inputs of one pipeline run.
pub struct TriageRun<'a> {
    pub cfg: &'a Config,
    pub engine_path: &'a Path,
    pub output_root: &'a Path,
    /// Evidence-source name; keys the run's working directory.
    pub source_name: &'a str,
}

/// End-of-run statistics, aggregated from the per-phase reports.
#[derive(Debug, Default)]
pub struct TriageStats {
    pub total_files: u64,
    pub staged_files: u64,
    pub small_files: u64,
    pub skipped_annotated: u64,
    pub duplicate_groups: u64,
    pub images_with_faces: u64,
    pub findings_created: u64,
    pub derived_registered: u64,
    pub copy_secs: f64,
    pub engine_secs: f64,
    pub mapping_secs: f64,
    pub hash_stats: HashStats,
    pub recognition: bool,
    pub cancelled: bool,
}

/// Run the full triage pipeline for one evidence source.
///
/// Cancellation yields `Ok` with `cancelled` set; it is a normal
/// termination path, not an error. Fatal errors (invalid config upstream,
/// engine launch failure, staging directory creation) surface as `Err`.
pub fn run_triage(
    run: &TriageRun<'_>,
    case: &mut dyn CaseStore,
    evidence: &[EvidenceFile],
    cancel: Arc<AtomicBool>,
) -> Result<TriageStats> {
    let run_start = Instant::now();
    let mut stats = TriageStats::default();

    let files: Vec<EvidenceFile> = evidence
        .iter()
        .filter(|file| run.cfg.accepts(&file.name))
        .cloned()
        .collect();
    if files.is_empty() {
        warn!("didn't find any usable evidence files; nothing to do");
        return Ok(stats);
    }
    info!(
        "{} of {} evidence files match the accepted extensions",
        files.len(),
        evidence.len()
    );

    if cancel.load(Ordering::Relaxed) {
        stats.cancelled = true;
        return Ok(stats);
    }

    let module_dir = run.output_root.join(run.source_name).join(MODULE_DIR);

    // Phase 1: staging.
    let report = staging::stage(&*case, &files, run.cfg, &module_dir)
        .with_context(|| format!("staging under {}", module_dir.display()))?;
    stats.total_files = report.total_files;
    stats.staged_files = report.staged_files;
    stats.small_files = report.small_files;
    stats.skipped_annotated = report.skipped_annotated;
    stats.duplicate_groups = report.duplicate_groups;
    stats.copy_secs = report.elapsed.as_secs_f64();
    info!(
        "file copy phase took {:.2}s ({} files staged)",
        stats.copy_secs, stats.staged_files
    );

    let wanted_dir = resolve_wanted_dir(run.cfg);
    stats.recognition = wanted_dir.is_some();

    // Phase 2: engine subprocess. The workspace is a per-run directory so
    // re-runs never clobber earlier output.
    let workspace = module_dir.join(&run.cfg.run_id);
    std::fs::create_dir_all(&workspace)?;
    let images_dir = module_dir.join(staging::IMAGES_DIR);
    let run_config = RunConfig::new(run.cfg, &images_dir, &workspace, wanted_dir.as_deref());
    let params_path = run_config.write(&workspace)?;

    let engine_start = Instant::now();
    let invocation = EngineInvocation {
        engine_path: run.engine_path,
        params_path: &params_path,
        min_image_area: run.cfg.min_image_area,
        max_image_area: run.cfg.max_image_area,
    };
    let outcome = engine::run_engine(
        &invocation,
        &cancel,
        run.cfg.poll_interval(),
        Some(&module_dir),
    )?;
    stats.engine_secs = engine_start.elapsed().as_secs_f64();

    match outcome {
        EngineOutcome::Cancelled => {
            info!("run cancelled during engine phase; workspace removed");
            stats.cancelled = true;
            return Ok(stats);
        }
        EngineOutcome::Completed(EngineExit::Success) => {
            info!("engine phase took {:.2}s", stats.engine_secs);
        }
        EngineOutcome::Completed(EngineExit::Failure { code, reason }) => {
            warn!(
                "engine failed (code {:?}: {reason}); continuing with whatever results exist",
                code
            );
        }
    }

    if cancel.load(Ordering::Relaxed) {
        stats.cancelled = true;
        return Ok(stats);
    }

    // Phase 3: result mapping and provenance enrichment.
    let map_start = Instant::now();
    let mut hash_stats = HashStats::default();
    let map_outcome = results::map_results(
        case,
        &files,
        run.source_name,
        &workspace,
        run.cfg,
        &mut hash_stats,
    );
    stats.mapping_secs = map_start.elapsed().as_secs_f64();
    stats.images_with_faces = map_outcome.images_with_faces;
    stats.findings_created = map_outcome.findings_created;
    stats.derived_registered = map_outcome.derived_registered;
    stats.hash_stats = hash_stats;

    info!(
        "found {} images with faces in {:.2}s (copy {:.2}s, engine {:.2}s, mapping {:.2}s); recognition {}",
        stats.images_with_faces,
        run_start.elapsed().as_secs_f64(),
        stats.copy_secs,
        stats.engine_secs,
        stats.mapping_secs,
        if stats.recognition { "ON" } else { "OFF" }
    );
    if run.cfg.generate_hashes {
        info!(
            "hash time: md5={:.2}s sha1={:.2}s sha256={:.2}s",
            stats.hash_stats.md5.as_secs_f64(),
            stats.hash_stats.sha1.as_secs_f64(),
            stats.hash_stats.sha256.as_secs_f64()
        );
    } else {
        info!("hashes not computed");
    }

    Ok(stats)
}

/// Recognition is on only when a reference-photo folder is configured and
/// actually exists; anything else downgrades to detection-only with a log
/// line instead of an error.
fn resolve_wanted_dir(cfg: &Config) -> Option<PathBuf> {
    match &cfg.wanted_faces_dir {
        None => {
            info!("face recognition OFF (no folder with reference photos given)");
            None
        }
        Some(dir) if dir.as_os_str().is_empty() => {
            info!("face recognition OFF (no folder with reference photos given)");
            None
        }
        Some(dir) if !dir.exists() => {
            warn!(
                "folder with reference photos NOT found: '{}'; recognition OFF",
                dir.display()
            );
            None
        }
        Some(dir) => {
            info!("face recognition ON (reference photos: '{}')", dir.display());
            Some(dir.clone())
        }
    }
}
