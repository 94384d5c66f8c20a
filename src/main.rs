use clap::Parser;
use tracing_subscriber::EnvFilter;

use fluxo::app::App;
use fluxo::cli::{Cli, Command};
use fluxo::config::FluxoConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = FluxoConfig::load()?;
    let actor = cli.actor();
    let app = if matches!(cli.command, Command::Demo) {
        App::in_memory(config)?
    } else {
        App::open(config).await?
    };
    app.run(cli.command, &actor).await
}

// Logs go to stderr; stdout is reserved for command output.
fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
