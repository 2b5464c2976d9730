use crate::align::{OptimizeSummary, TileGraph};
use crate::transform::Transform;

/// Montage processing stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    ExtractingFeatures,
    MatchingFeatures,
    Optimizing,
    BlockMatching,
    Refining,
    Elastic,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExtractingFeatures => write!(f, "Extracting features"),
            Self::MatchingFeatures => write!(f, "Matching tile pairs"),
            Self::Optimizing => write!(f, "Optimizing tiles"),
            Self::BlockMatching => write!(f, "Block matching"),
            Self::Refining => write!(f, "Refining tiles"),
            Self::Elastic => write!(f, "Fitting elastic transforms"),
        }
    }
}

/// Result of a montage run.
#[derive(Clone, Debug)]
pub struct MontageOutput {
    /// Final transform of every tile, in input order.
    pub transforms: Vec<Transform>,
    /// Tile graph after the last optimization.
    pub graph: TileGraph,
    /// Pairs connected by feature matching.
    pub connected_pairs: usize,
    /// Block-matching jobs that failed and were skipped.
    pub failed_pairs: Vec<(usize, usize)>,
    /// Summary of the last optimization, one entry per component.
    pub summaries: Vec<OptimizeSummary>,
}

/// Thread-safe progress reporting for the montage.
///
/// Implementors can use this to drive progress bars, logging, or any other
/// UI feedback. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new stage has started. `total_items` is the number of work items in
    /// this stage (e.g., tile count), if known.
    fn begin_stage(&self, _stage: PipelineStage, _total_items: Option<usize>) {}

    /// One work item within the current stage has completed.
    fn advance(&self, _items_done: usize) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}
}

/// Reporter that ignores every event.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}
