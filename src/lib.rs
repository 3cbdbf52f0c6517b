//! # facetriage
//!
//! Forensic image-triage pipeline. Given the evidence files of a case it
//! stages candidate images into a working area (deduplicating and
//! quarantining undersized files), runs an external face
//! detection/recognition engine as a cancellable subprocess, maps the
//! engine's result files back to evidence items as tagged findings, and
//! enriches a DFXML provenance document with per-file hashes.
//!
//! The engine itself and the host case database are external
//! collaborators; the seam to the case system is the [`case::CaseStore`]
//! trait.

pub mod case;
pub mod cli;
pub mod config;
pub mod engine;
pub mod hash;
pub mod logging;
pub mod names;
pub mod pipeline;
pub mod provenance;
pub mod results;
pub mod staging;
pub mod util;

/// Module name recorded on findings and derived files.
pub const MODULE_NAME: &str = "facetriage";
