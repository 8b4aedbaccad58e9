//! CLI argument parsing using clap.
//!
//! Contains the Cli struct, the Commands enum and per-command flags.

use clap::{
    Args, Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Component story dev server
#[derive(Parser, Debug)]
#[command(
    name = "storydev",
    version = env!("CARGO_PKG_VERSION"),
    about = "Component story dev server",
    long_about = "Index story files, synthesize bundler entries and run the preview and manager builds.",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = "Examples:\n  storydev init\n  storydev dev --port 6007 --no-open\n  storydev index --json\n  storydev entries --legacy"
)]
pub struct Cli {
    /// Directory holding storydev.toml and the preview annotations
    #[arg(short, long, global = true, default_value = ".storybook", env = "SD_CONFIG_DIR")]
    pub config_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a default storydev.toml
    #[command(about = "Write a default storydev.toml into the config directory")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Start the dev server
    #[command(
        about = "Serve the story index and start both builders",
        after_help = "Builder commands come from [builders.preview] and [builders.manager] in storydev.toml."
    )]
    Dev(DevArgs),

    /// Build the story index once and print it
    #[command(about = "Scan story files and print the index")]
    Index {
        /// Print the full index as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the virtual entries the preview bundler would receive
    #[command(about = "Print synthesized virtual entries as JSON")]
    Entries {
        /// Use the per-annotation legacy strategy instead of the consolidated one
        #[arg(long)]
        legacy: bool,

        /// Generate for a production build (no pipelined imports)
        #[arg(long)]
        prod: bool,
    },
}

/// Overrides for the `[server]` table.
#[derive(Args, Debug, Default)]
pub struct DevArgs {
    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host to bind and advertise
    #[arg(long)]
    pub host: Option<String>,

    /// Directory served at the site root (repeatable, `dir:/mount` supported)
    #[arg(short = 's', long = "static-dir", value_name = "DIR")]
    pub static_dirs: Vec<PathBuf>,

    /// CI mode: never open a browser
    #[arg(long)]
    pub ci: bool,

    /// Exit once both builders have started
    #[arg(long)]
    pub smoke_test: bool,

    /// Do not open a browser
    #[arg(long)]
    pub no_open: bool,

    /// Skip the preview build
    #[arg(long)]
    pub ignore_preview: bool,

    /// Log both builders' configuration before starting them
    #[arg(long)]
    pub debug_config: bool,

    /// Do not report telemetry
    #[arg(long)]
    pub disable_telemetry: bool,
}
