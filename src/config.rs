use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};
use serde::Deserialize;

/// Model weights consumed by the engine, one explicit field per purpose
/// instead of a string-keyed map.
#[derive(Debug, Deserialize, Clone)]
pub struct ModelPaths {
    pub detector_model: PathBuf,
    pub recognition_model: PathBuf,
    pub shape_predictor: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub run_id: String,
    /// Extensions the engine can decode, with leading dot (".jpg").
    pub accepted_extensions: Vec<String>,
    /// Files below this size (bytes) are quarantined, not staged.
    pub min_file_size: u64,
    /// Append digests to the provenance document after mapping.
    pub generate_hashes: bool,
    /// Cancellation poll interval while the engine runs.
    pub poll_interval_secs: u64,
    pub models: ModelPaths,
    /// Reference photos of the person to find; empty disables recognition.
    pub wanted_faces_dir: Option<PathBuf>,
    /// Optional pixel-area bounds forwarded to the engine.
    pub min_image_area: Option<u64>,
    pub max_image_area: Option<u64>,
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// True when `name` carries one of the accepted extensions
    /// (case-insensitive).
    pub fn accepts(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        self.accepted_extensions
            .iter()
            .any(|ext| lower.ends_with(&ext.to_ascii_lowercase()))
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
}

pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig> {
    let bytes: Vec<u8> = if let Some(p) = path {
        std::fs::read(p)?
    } else {
        include_bytes!("../config/default.yml").to_vec()
    };

    let mut config: Config = serde_yaml::from_slice(&bytes)?;
    if config.run_id.trim().is_empty() {
        config.run_id = generate_run_id();
    }

    Ok(LoadedConfig { config })
}

/// Startup validation. Failures here are fatal before any I/O happens.
pub fn validate(cfg: &Config) -> Result<()> {
    if cfg.accepted_extensions.is_empty() {
        bail!("at least one accepted extension must be configured");
    }
    for (label, path) in [
        ("detector_model", &cfg.models.detector_model),
        ("recognition_model", &cfg.models.recognition_model),
        ("shape_predictor", &cfg.models.shape_predictor),
    ] {
        if path.as_os_str().is_empty() {
            bail!("model path {label} is not configured");
        }
    }
    Ok(())
}

fn generate_run_id() -> String {
    chrono::Local::now().format("%Y-%m-%d_%Hh%Mm%Ss").to_string()
}
