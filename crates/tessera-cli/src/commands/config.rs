use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tessera_core::parallel::PoolSize;
use tessera_core::pipeline::config::MontageConfig;

#[derive(Args)]
pub struct ConfigArgs {
    /// Write config to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Fix the RANSAC seed for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,

    /// Worker threads (default: all cores)
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,

    /// Leave out block matching and elastic refinement
    #[arg(long)]
    pub no_refine: bool,
}

/// Print or save a default MontageConfig as TOML.
pub fn run(args: &ConfigArgs) -> Result<()> {
    let mut config = MontageConfig::default();
    config.align.seed = args.seed;
    if let Some(n) = args.threads {
        config.threads = PoolSize::Threads(n);
    }
    if args.no_refine {
        config.block_match = None;
        config.elastic.enabled = false;
    }
    let toml_str = toml::to_string_pretty(&config).context("Failed to serialize config")?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, &toml_str)
                .with_context(|| format!("Failed to write config to {}", path.display()))?;
            println!("Config saved to {}", path.display());
        }
        None => print!("{toml_str}"),
    }

    Ok(())
}
