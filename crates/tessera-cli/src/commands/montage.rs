use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use tessera_core::blockmatch::{MosaicRenderer, TileRenderer};
use tessera_core::io::{save_flat_image, Manifest, MontageResult};
use tessera_core::parallel::{CancellationToken, ExecutorProvider};
use tessera_core::pipeline::config::MontageConfig;
use tessera_core::pipeline::{run_montage_reported, PipelineStage, ProgressReporter};
use tracing::info;

use crate::summary::{print_montage_result, print_montage_summary};

#[derive(Args)]
pub struct MontageArgs {
    /// Manifest listing tile images and their initial offsets (TOML)
    pub manifest: PathBuf,

    /// Montage config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Skip block matching and elastic refinement
    #[arg(long)]
    pub no_refine: bool,

    /// Output file for the per-tile transforms
    #[arg(short, long, default_value = "result.toml")]
    pub output: PathBuf,

    /// Also render the aligned montage to this image (PNG or TIFF)
    #[arg(long)]
    pub render: Option<PathBuf>,

    /// Scale of the rendered montage
    #[arg(long, default_value = "0.25")]
    pub scale: f64,
}

/// Drives an indicatif bar from montage stage events.
struct BarReporter {
    pb: ProgressBar,
}

impl ProgressReporter for BarReporter {
    fn begin_stage(&self, stage: PipelineStage, total_items: Option<usize>) {
        self.pb.set_message(stage.to_string());
        self.pb.set_length(total_items.unwrap_or(1).max(1) as u64);
        self.pb.set_position(0);
    }

    fn advance(&self, items_done: usize) {
        self.pb.set_position(items_done as u64);
    }

    fn finish_stage(&self) {
        if let Some(len) = self.pb.length() {
            self.pb.set_position(len);
        }
    }
}

pub fn run(args: &MontageArgs) -> Result<()> {
    let mut config: MontageConfig = if let Some(ref config_path) = args.config {
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config {}", config_path.display()))?;
        toml::from_str(&contents).context("Invalid montage config")?
    } else {
        MontageConfig::default()
    };
    if args.no_refine {
        config.block_match = None;
    }
    config.validate().context("Invalid montage config")?;

    let manifest = Manifest::load(&args.manifest)
        .with_context(|| format!("Failed to read manifest {}", args.manifest.display()))?;
    let rasters = manifest.load_rasters().context("Failed to load tile images")?;
    let placements = manifest.placements();

    print_montage_summary(&args.manifest, &args.output, rasters.len(), &config);

    let pb = ProgressBar::new(1);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg:28} [{bar:40}] {pos}/{len}")?
            .progress_chars("=> "),
    );
    let reporter = Arc::new(BarReporter { pb: pb.clone() });

    let provider = ExecutorProvider::new();
    let output = run_montage_reported(
        &rasters,
        &placements,
        &config,
        &provider,
        reporter,
        &CancellationToken::new(),
    );
    provider.shutdown();
    let output = output?;
    pb.finish_with_message("Done");

    MontageResult::new(&manifest, &output.transforms)
        .save(&args.output)
        .with_context(|| format!("Failed to write result to {}", args.output.display()))?;

    print_montage_result(&output);
    println!("\nTransforms saved to {}", args.output.display());

    if let Some(ref render_path) = args.render {
        let roi = output.graph.world_bounds().to_rect();
        let renderer =
            MosaicRenderer::new(&rasters, output.transforms.clone(), config.elastic.mesh_resolution)?;
        let tiles: Vec<usize> = (0..renderer.num_tiles()).collect();
        info!(?roi, scale = args.scale, "rendering montage");
        let flat = renderer
            .render(&tiles, roi, args.scale)
            .context("Failed to render montage")?;
        save_flat_image(&flat, render_path)
            .with_context(|| format!("Failed to write {}", render_path.display()))?;
        println!(
            "Montage rendered to {} ({}x{})",
            render_path.display(),
            flat.width(),
            flat.height()
        );
    }

    Ok(())
}
