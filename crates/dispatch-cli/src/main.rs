//! dispatch - courier dispatch by agent negotiation.

use std::io;

use anyhow::Context;
use clap::Parser;
use dispatch_cli::cli::{Cli, Commands, RunArgs};
use dispatch_cli::{Scenario, Session};
use dispatch_core::DispatchConfig;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so the JSON export on stdout stays clean
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args).await?,
    }

    Ok(())
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => DispatchConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => DispatchConfig::default(),
    };
    let scenario = Scenario::load(&args.scenario)
        .with_context(|| format!("loading scenario {}", args.scenario.display()))?;
    info!(
        scenario = %args.scenario.display(),
        rule = ?config.displacement_rule,
        search = ?config.variant_search,
        "starting dispatch"
    );

    let session = Session::new(config, args.out.clone());
    session.load(&scenario).await?;

    let mut stdout = io::stdout();
    let export = session.export(&mut stdout).await?;
    info!(
        records = export.records.len(),
        placed = export.placed(),
        orders = export.orders.len(),
        "initial negotiation exported"
    );

    if args.interactive {
        session
            .run_interactive(tokio::io::stdin(), &mut stdout)
            .await?;
    }

    session.shutdown().await;
    Ok(())
}
