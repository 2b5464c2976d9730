pub mod config;
mod montage;
mod types;

pub use montage::{run_montage, run_montage_reported, TilePlacement};
pub use types::{MontageOutput, NoOpReporter, PipelineStage, ProgressReporter};
