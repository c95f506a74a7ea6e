//! Command-line DPR calculator and build optimizer.
//!
//! Every command reads a build as JSON (camelCase `BuildConfiguration`):
//!
//! ```bash
//! dpr curve fighter.json --advantage advantage
//! dpr delta fighter.json --buff haste
//! dpr combat paladin.json --strategy aggressive
//! dpr paths fighter.json --classes fighter,rogue --objective tier-average
//! ```

mod commands;
mod report;

use anyhow::Result;
use clap::Parser;
use commands::{Combat, Curve, Delta, Paths};
use std::path::PathBuf;

/// D&D 5e damage-per-round analysis
#[derive(Parser)]
#[command(name = "dpr")]
#[command(about = "DPR curves, toggle deltas and build optimizers", long_about = None)]
#[command(version)]
struct Cli {
    /// Engine settings JSON file (debounce, timeouts, target AC, search widths)
    #[arg(long, global = true, value_name = "FILE", env = "DPR_SETTINGS")]
    settings: Option<PathBuf>,

    /// Print JSON instead of a table
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// DPR across a range of armor classes
    Curve(Curve),

    /// DPR gained by toggling one buff or feat
    Delta(Delta),

    /// Best three-round action sequence
    Combat(Combat),

    /// Best class level orderings from 1 to 20
    Paths(Paths),
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (RUST_LOG, DPR_SETTINGS)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = commands::load_settings(cli.settings.as_deref()).await?;

    match cli.command {
        Command::Curve(cmd) => cmd.execute(&settings, cli.json).await,
        Command::Delta(cmd) => cmd.execute(&settings, cli.json).await,
        Command::Combat(cmd) => cmd.execute(&settings, cli.json).await,
        Command::Paths(cmd) => cmd.execute(&settings, cli.json).await,
    }
}
