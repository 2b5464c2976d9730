mod commands;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tessera", about = "Electron microscopy tile montaging tool")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print or save the default montage config
    Config(commands::config::ConfigArgs),
    /// Parse a persisted transform and apply it to points
    Transform(commands::transform::TransformArgs),
    /// Align the tiles of a manifest into a montage
    Montage(commands::montage::MontageArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Config(args) => commands::config::run(args),
        Commands::Transform(args) => commands::transform::run(args),
        Commands::Montage(args) => commands::montage::run(args),
    }
}
