use anyhow::anyhow;
use clap::Parser;

use storydev::cli::commands;
use storydev::cli::{Cli, Commands};
use storydev::config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Init writes the settings file, so it must not require one
    if let Commands::Init { force } = cli.command {
        storydev::logging::init();
        return commands::init::run(&cli.config_dir, force);
    }

    let settings = Settings::load(&cli.config_dir)
        .map_err(|e| anyhow!("Failed to load configuration from {}: {e}", cli.config_dir.display()))?;
    storydev::logging::init_with_config(&settings.logging);
    storydev::debug_event!("config", "loaded", "{}", cli.config_dir.display());

    match cli.command {
        Commands::Dev(args) => commands::dev::run(args, settings).await,
        Commands::Index { json } => commands::index::run(&settings, json).await,
        Commands::Entries { legacy, prod } => commands::entries::run(&settings, legacy, prod),
        Commands::Init { .. } => Ok(()),
    }
}
