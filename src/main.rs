use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use tracing::info;

use facetriage::{case::LocalCase, cli, config, logging, pipeline, util};

fn main() -> Result<()> {
    logging::init_logging();

    let cli_opts = cli::parse();
    let loaded = config::load_config(cli_opts.config_path.as_deref())?;
    let mut cfg = loaded.config;
    if let Some(extensions) = cli_opts.extensions.clone() {
        cfg.accepted_extensions = extensions;
    }
    if let Some(min_size) = cli_opts.min_file_size {
        cfg.min_file_size = min_size;
    }
    if cli_opts.no_hashes {
        cfg.generate_hashes = false;
    }
    if let Some(wanted) = cli_opts.wanted_faces.clone() {
        cfg.wanted_faces_dir = Some(wanted);
    }
    config::validate(&cfg)?;

    let source_name = match cli_opts.source_name.clone() {
        Some(name) => name,
        None => match cli_opts.evidence.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => bail!(
                "cannot derive a source name from {}; pass --source-name",
                cli_opts.evidence.display()
            ),
        },
    };

    util::ensure_output_dir(&cli_opts.output)?;
    let case_dir = cli_opts.output.join(&source_name);
    let mut case = LocalCase::open(&cli_opts.evidence, &case_dir)
        .with_context(|| format!("enumerating evidence in {}", cli_opts.evidence.display()))?;
    let evidence = case.evidence().to_vec();

    info!(
        "starting run_id={} source={} evidence_files={} engine={}",
        cfg.run_id,
        source_name,
        evidence.len(),
        cli_opts.engine.display()
    );

    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::Relaxed);
    })
    .context("installing Ctrl+C handler")?;

    let run = pipeline::TriageRun {
        cfg: &cfg,
        engine_path: &cli_opts.engine,
        output_root: &cli_opts.output,
        source_name: &source_name,
    };
    let stats = pipeline::run_triage(&run, &mut case, &evidence, cancel)?;
    case.flush()?;

    if stats.cancelled {
        info!("triage run cancelled");
    } else {
        info!(
            "triage run finished: {} findings created, {} derived files registered",
            stats.findings_created, stats.derived_registered
        );
    }
    Ok(())
}
