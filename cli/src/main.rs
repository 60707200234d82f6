//! `routecat` entry point.

use clap::Parser;
use routecat_cli::Cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("routecat v{} starting", env!("CARGO_PKG_VERSION"));

    let code = cli.run().await;
    std::process::exit(code);
}
