//! Pentecter binary entry point: parses CLI args, loads configuration,
//! initializes logging, wires up the substrates, and runs a `Team`
//! session against every target until interrupted.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use pentecter::application::team::{Team, TeamCollaborators};
use pentecter::cli::Cli;
use pentecter::infrastructure::config::ConfigLoader;
use pentecter::infrastructure::logging;
use pentecter::infrastructure::memory::FileMemoryStore;
use pentecter::infrastructure::substrates::{MockBrain, ShellCommandRunner};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path).context("failed to load configuration")?,
        None => ConfigLoader::load().context("failed to load configuration")?,
    };
    if let Some(level) = &cli.log_level {
        config.log.level = level.clone();
    }
    if let Some(dir) = &cli.memory_dir {
        config.memory_dir = Some(dir.clone());
    }

    let _logger = logging::init(&config.log).context("failed to initialize logging")?;
    info!(targets = ?cli.targets, dry_run = cli.dry_run, "starting pentecter session");

    if !cli.dry_run {
        anyhow::bail!(
            "no reasoning backend is wired into this binary; pass --dry-run to run a scripted \
             MockBrain session, or embed pentecter as a library with a real Brain"
        );
    }

    let (events_tx, mut events_rx) = tokio::sync::mpsc::channel::<pentecter::domain::models::Event>(256);
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            info!(target_id = event.target_id, kind = ?event.kind, "event");
        }
    });

    let memory: Option<Arc<dyn pentecter::domain::ports::MemoryStore>> = config
        .memory_dir
        .as_ref()
        .map(|dir| Arc::new(FileMemoryStore::new(dir.clone())) as Arc<dyn pentecter::domain::ports::MemoryStore>);

    let auto_approve = cli.auto_approve;
    let brain: Arc<dyn pentecter::domain::ports::Brain> = Arc::new(MockBrain::immediate_complete());
    let sub_brain: Arc<dyn pentecter::domain::ports::Brain> = Arc::new(MockBrain::immediate_complete());

    let team = Team::new(
        brain,
        Some(sub_brain),
        TeamCollaborators {
            runner_factory: Box::new(move |_id, _host| Arc::new(ShellCommandRunner::new(auto_approve)) as Arc<dyn pentecter::domain::ports::CommandRunner>),
            events: events_tx,
            memory,
            knowledge: None,
            skills: None,
            mcp: None,
            config: config.clone(),
        },
    );

    for host in &cli.targets {
        team.add_target(host);
    }

    let ctx = CancellationToken::new();
    team.start(ctx.clone());

    signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutdown requested, cancelling session");
    ctx.cancel();

    Ok(())
}
