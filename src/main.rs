//! Command-line entrypoint for the characterization bench.

use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use tokio::sync::watch;

use powerbench::catalog;
use powerbench::config::Settings;
use powerbench::instrument::InstrumentSession;
use powerbench::orchestrator::Orchestrator;
use powerbench::programmer::JlinkProgrammer;

#[derive(Parser, Debug)]
#[command(name = "powerbench", about = "Automated current-draw characterization bench")]
struct Cli {
    /// Config name under config/ (e.g. "system" for config/system.toml).
    #[arg(long)]
    config: Option<String>,

    /// Override the experiment catalog root directory.
    #[arg(long)]
    catalog_root: Option<PathBuf>,

    /// Parse and print the catalog without touching any instrument.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::new(cli.config.as_deref())?;
    if let Some(root) = cli.catalog_root {
        settings.catalog.root_dir = root;
    }
    settings.validate()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("powerbench={}", settings.log_level).parse()?),
        )
        .init();

    let experiments = catalog::read_catalog(&settings.catalog.root_dir)?;
    if experiments.is_empty() {
        warn!(
            "No experiments found under {}",
            settings.catalog.root_dir.display()
        );
        return Ok(());
    }

    if cli.dry_run {
        for descriptor in &experiments {
            println!("{}\t{}", descriptor.dir_name, descriptor);
        }
        return Ok(());
    }

    let session = InstrumentSession::open(&settings.instruments).await?;
    session.configure().await?;

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Stop requested; finishing the experiment in flight");
            let _ = stop_tx.send(true);
        }
    });

    let programmer = JlinkProgrammer::new(settings.programmer.clone());
    let manifest_path = settings.catalog.root_dir.join("run-manifest.json");

    let orchestrator = Orchestrator::new(session, Box::new(programmer), settings, stop_rx);
    let manifest = orchestrator.run(&experiments).await;
    manifest.save(&manifest_path)?;
    info!("Run manifest written to {}", manifest_path.display());

    if manifest.failed() > 0 {
        std::process::exit(1);
    }
    Ok(())
}
