use std::sync::Arc;

use clap::Parser;
use colored::*;
use tracing_subscriber::EnvFilter;

use brainstorm_study::admin::AdminGate;
use brainstorm_study::cli::Args;
use brainstorm_study::config::{Secrets, StudyConfig};
use brainstorm_study::error::StudyError;
use brainstorm_study::providers::OpenAiProvider;
use brainstorm_study::web::{self, AppState};

async fn run(args: Args) -> Result<(), StudyError> {
    let mut config = StudyConfig::load(args.config.as_deref())?;
    config.apply_args(&args);
    config.validate()?;
    let registry = config.registry()?;
    let secrets = Secrets::from_env(args.secrets.as_deref())?;

    tracing::info!(
        model = %config.generation.model,
        conditions = registry.len(),
        assets = %config.assets_dir.display(),
        "configuration loaded"
    );

    let provider = OpenAiProvider::with_base(
        secrets.openai_api_key,
        config.api_base.clone(),
        config.generation.clone(),
    );
    let state = AppState::new(
        config,
        registry,
        Arc::new(provider),
        AdminGate::new(secrets.admin_passphrase),
    );
    web::serve(state).await
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("brainstorm_study=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("{} {}", "error:".bright_red().bold(), e);
        std::process::exit(1);
    }
}
