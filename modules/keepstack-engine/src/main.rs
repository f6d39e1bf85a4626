use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use keepstack_common::{Mode, Tuning};
use keepstack_engine::sim_adapter::{SimFollowExtractor, SimPageHandle, SimSavedExtractor};
use keepstack_engine::CollectionService;
use keepstack_vault::{data_dir, Vault};
use simpage::{PageScript, SimPage};

#[derive(Parser)]
#[command(name = "keepstack", about = "Scroll-driven collection engine")]
struct Cli {
    /// Collection mode: saved | following
    mode: Mode,

    /// Path to the page script JSON driving the simulated session
    #[arg(long)]
    script: PathBuf,

    /// Vault directory (default: DATA_DIR env var, then "data")
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Page origin used to absolutize relative links
    #[arg(long, default_value = "https://sim.page")]
    origin: String,

    /// Override the mode's default flush batch size
    #[arg(long)]
    batch_size: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("keepstack=info")),
        )
        .init();

    let cli = Cli::parse();

    let script_json = std::fs::read_to_string(&cli.script)
        .with_context(|| format!("read script {}", cli.script.display()))?;
    let script = PageScript::from_json(&script_json)
        .with_context(|| format!("parse script {}", cli.script.display()))?;

    let dir = cli.data_dir.unwrap_or_else(data_dir);
    let vault = Arc::new(Vault::open(&dir)?);
    info!(mode = %cli.mode, dir = %dir.display(), "Keepstack starting");

    let page = SimPageHandle::new(cli.origin, SimPage::new(script));
    let mut service = CollectionService::new(
        page.clone(),
        SimSavedExtractor::new(page.clone()),
        SimFollowExtractor::new(page),
        vault,
    );
    if let Some(batch_size) = cli.batch_size {
        service = service.with_tuning(Tuning::for_mode(cli.mode).with_batch_size(batch_size));
    }

    let outcome = service.start_collection(cli.mode).await;
    if let Some(meta) = &outcome.meta {
        print!("{meta}");
    }
    if !outcome.ok {
        anyhow::bail!(
            "collection run failed: {}",
            outcome.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }
    Ok(())
}
