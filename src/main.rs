use anyhow::Result;
use clap::{Parser, Subcommand};
use referent::app;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "referent", about = "Board meeting minutes service", version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run the HTTP service (default)
    Serve,
    /// Delete expired demo meetings and exit
    Reap,
    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("Referent {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(CliCommand::Reap) => app::run_reap(),
        Some(CliCommand::Serve) | None => app::run_service().await,
    }
}
