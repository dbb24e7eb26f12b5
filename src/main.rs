use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use vigil::api::AttendanceApi;
use vigil::libs::config::Config;
use vigil::libs::daemon;

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the service: startup backfill, then the reconciliation scheduler
    #[command(about = "Run the attendance service")]
    Run,

    /// One-shot reconciliation of records left open on previous days
    #[command(about = "Close stale records and exit")]
    Backfill,
}

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help(true))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "vigil=info".into()))
        .init();

    let cli = Cli::parse();
    let config = Config::read()?;
    let api = AttendanceApi::new(config)?;

    match cli.command {
        Commands::Run => daemon::run(Arc::new(api)).await,
        Commands::Backfill => {
            let closed = api.startup_backfill()?;
            println!("closed {closed} stale records");
            Ok(())
        }
    }
}
