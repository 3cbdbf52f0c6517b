//! Engine subprocess orchestration.
//!
//! Serializes the run parameters to JSON, launches the external
//! detection/recognition engine, and polls a cancellation flag while the
//! child runs. Cancellation is a first-class terminal state, not an
//! error: the child is killed, the run's working directory is removed,
//! and the caller gets [`EngineOutcome::Cancelled`].

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{Config, ModelPaths};

/// Name of the serialized parameter file inside the workspace.
pub const PARAMS_FNAME: &str = "params.json";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to launch engine {path}: {source}")]
    Launch {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parameter object consumed by the engine. Written once per run and
/// immutable afterwards.
#[derive(Debug, Serialize)]
pub struct RunConfig {
    pub paths: EngineModelPaths,
    /// Folder with reference photos; empty string disables recognition.
    pub wanted_faces: String,
    #[serde(rename = "imagesPath")]
    pub images_path: PathBuf,
    #[serde(rename = "doRecognition")]
    pub do_recognition: bool,
    pub workspace: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct EngineModelPaths {
    pub detector_model: PathBuf,
    pub recognition_model: PathBuf,
    pub shape_predictor: PathBuf,
}

impl From<&ModelPaths> for EngineModelPaths {
    fn from(models: &ModelPaths) -> Self {
        Self {
            detector_model: models.detector_model.clone(),
            recognition_model: models.recognition_model.clone(),
            shape_predictor: models.shape_predictor.clone(),
        }
    }
}

impl RunConfig {
    pub fn new(
        cfg: &Config,
        images_path: &Path,
        workspace: &Path,
        wanted_faces: Option<&Path>,
    ) -> Self {
        let (wanted, do_recognition) = match wanted_faces {
            Some(dir) => (dir.to_string_lossy().into_owned(), true),
            None => (String::new(), false),
        };
        Self {
            paths: EngineModelPaths::from(&cfg.models),
            wanted_faces: wanted,
            images_path: images_path.to_path_buf(),
            do_recognition,
            workspace: workspace.to_path_buf(),
        }
    }

    /// Serialize to `<workspace>/params.json` and return the path.
    pub fn write(&self, workspace: &Path) -> Result<PathBuf, EngineError> {
        let path = workspace.join(PARAMS_FNAME);
        let file = std::fs::File::create(&path)?;
        serde_json::to_writer(file, self)?;
        Ok(path)
    }
}

/// How an engine run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutcome {
    Completed(EngineExit),
    /// The user cancelled mid-run; child killed, working directory removed.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineExit {
    Success,
    Failure {
        /// Exit code; `None` when the child was terminated by a signal.
        code: Option<i32>,
        reason: String,
    },
}

/// Fixed taxonomy of engine exit codes. Codes outside the known range are
/// reported as unclassified.
pub fn classify_exit_code(code: i32) -> Option<&'static str> {
    match code {
        1 => Some("engine parameter error"),
        2 => Some("error loading parameter file"),
        3 => Some("error parsing parameter file"),
        4 => Some("image directory not found"),
        5 => Some("error initializing recognition network"),
        6 => Some("error initializing shape predictor"),
        7 => Some("error initializing detection network"),
        8 => Some("no faces found in any image"),
        9 => Some("no target faces found"),
        10 => Some("CUDA out of memory"),
        11 => Some("no usable CUDA devices"),
        _ => None,
    }
}

fn failure_reason(code: i32) -> String {
    match classify_exit_code(code) {
        Some(reason) => reason.to_string(),
        None => format!(
            "unclassified engine failure (code {code}); run the engine manually for diagnostics"
        ),
    }
}

/// One engine invocation: `engine --params <json> [--min N] [--max N]`.
#[derive(Debug)]
pub struct EngineInvocation<'a> {
    pub engine_path: &'a Path,
    pub params_path: &'a Path,
    pub min_image_area: Option<u64>,
    pub max_image_area: Option<u64>,
}

/// Launch the engine and poll `cancel` once per `poll_interval` until the
/// child exits.
///
/// A spawn failure is fatal and surfaces immediately. A nonzero exit is
/// mapped through the taxonomy and returned as `Completed(Failure { .. })`
/// so the caller can still harvest partial results. On cancellation the
/// child is killed and `cleanup_dir` (when given) is removed.
pub fn run_engine(
    invocation: &EngineInvocation<'_>,
    cancel: &AtomicBool,
    poll_interval: Duration,
    cleanup_dir: Option<&Path>,
) -> Result<EngineOutcome, EngineError> {
    let mut command = Command::new(invocation.engine_path);
    command.arg("--params").arg(invocation.params_path);
    if let Some(min) = invocation.min_image_area {
        command.arg("--min").arg(min.to_string());
    }
    if let Some(max) = invocation.max_image_area {
        command.arg("--max").arg(max.to_string());
    }

    let mut child = command.spawn().map_err(|source| EngineError::Launch {
        path: invocation.engine_path.to_path_buf(),
        source,
    })?;
    info!(
        "engine launched: {} --params {}",
        invocation.engine_path.display(),
        invocation.params_path.display()
    );

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(EngineOutcome::Completed(classify_status(status)));
        }

        if cancel.load(Ordering::Relaxed) {
            info!("cancellation requested; terminating engine");
            if let Err(err) = child.kill() {
                warn!("failed to kill engine process: {err}");
            }
            let _ = child.wait();
            if let Some(dir) = cleanup_dir {
                remove_run_dir(dir);
            }
            return Ok(EngineOutcome::Cancelled);
        }

        std::thread::sleep(poll_interval);
    }
}

fn classify_status(status: std::process::ExitStatus) -> EngineExit {
    match status.code() {
        Some(0) => {
            info!("engine terminated with no problems");
            EngineExit::Success
        }
        Some(code) => {
            let reason = failure_reason(code);
            error!("engine exited with code {code}: {reason}");
            EngineExit::Failure {
                code: Some(code),
                reason,
            }
        }
        None => {
            let reason = "engine terminated by signal".to_string();
            error!("{reason}");
            EngineExit::Failure { code: None, reason }
        }
    }
}

/// Best-effort removal of the run's working tree; an already-missing
/// directory is fine.
pub fn remove_run_dir(dir: &Path) {
    if let Err(err) = std::fs::remove_dir_all(dir) {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!("failed to remove {}: {err}", dir.display());
        }
    }
}
