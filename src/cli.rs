use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CliOptions {
    /// Directory with the evidence files to triage
    #[arg(short, long)]
    pub evidence: PathBuf,

    /// Output directory for staged files, findings, and reports
    #[arg(short, long, default_value = "./output")]
    pub output: PathBuf,

    /// Path to the face detection/recognition engine executable
    #[arg(long)]
    pub engine: PathBuf,

    /// Optional path to config file (YAML)
    #[arg(long)]
    pub config_path: Option<PathBuf>,

    /// Evidence-source name (defaults to the evidence directory name)
    #[arg(long)]
    pub source_name: Option<String>,

    /// Folder with reference photos of the person to find (enables recognition)
    #[arg(long)]
    pub wanted_faces: Option<PathBuf>,

    /// Restrict accepted extensions (comma-separated, e.g. .jpg,.png)
    #[arg(long, value_delimiter = ',')]
    pub extensions: Option<Vec<String>>,

    /// Minimum image size in bytes; smaller files are quarantined
    #[arg(long)]
    pub min_file_size: Option<u64>,

    /// Skip hash enrichment of the provenance document
    #[arg(long)]
    pub no_hashes: bool,
}

pub fn parse() -> CliOptions {
    CliOptions::parse()
}
