use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use standfast::app::AppContext;
use standfast::cli::{commands, Cli, Commands};
use standfast::config::Config;
use standfast::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("standfast=info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Run { targets } => {
            let ctx = AppContext::new(config)?;
            commands::run_targets(&ctx, &targets).await?;
        }
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let ctx = AppContext::new(config)?;
            server::serve(Arc::new(ctx), &bind).await?;
        }
        Commands::Targets => {
            let ctx = AppContext::new(config)?;
            commands::list_targets(&ctx);
        }
        Commands::Status => {
            let ctx = AppContext::new(config)?;
            commands::show_status(&ctx)?;
        }
    }

    Ok(())
}
