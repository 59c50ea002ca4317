use std::path::Path;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use postwatch::cli::{commands, Cli, Commands};
use postwatch::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::InitConfig { force } => {
            commands::init_config(cli.config.as_deref(), force)?;
        }
        Commands::Run { duration } => {
            let (config, _guard) = load_config(cli.config.as_deref())?;
            commands::run(config, duration).await?;
        }
        Commands::ShowConfig => {
            let (config, _guard) = load_config(cli.config.as_deref())?;
            commands::show_config(&config)?;
        }
    }

    Ok(())
}

/// Load the config and install logging as it describes.
fn load_config(path: Option<&Path>) -> anyhow::Result<(Config, Option<WorkerGuard>)> {
    let config = Config::load(path)?;
    let guard = postwatch::logging::init(&config.logging)?;
    Ok((config, guard))
}
