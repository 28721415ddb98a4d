use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Default)]
#[command(name = "brainstorm-study")]
#[command(version)]
#[command(about = "Phase-timed experiment runner for AI-assisted brainstorming studies")]
pub struct Args {
    /// TOML config file (server, timing, generation, conditions)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// TOML secrets file with OPENAI_API_KEY and ADMIN_PASSPHRASE
    #[arg(long)]
    pub secrets: Option<PathBuf>,

    /// Interface to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Port for the study server
    #[arg(long)]
    pub port: Option<u16>,

    /// Completion model identifier
    #[arg(long)]
    pub model: Option<String>,

    /// Directory holding the guideline images
    #[arg(long)]
    pub assets_dir: Option<PathBuf>,

    /// Survey URL participants are linked to at the end
    #[arg(long)]
    pub survey_url: Option<String>,
}
