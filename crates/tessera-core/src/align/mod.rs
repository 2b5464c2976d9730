pub mod connect;
pub mod features;
pub mod matching;
pub mod optimizer;
pub mod tile;

pub use connect::{
    align_tiles, connect_tiles, extract_features, fit_pair, match_pairs, AlignParams, PairModel,
};
pub use features::{DogExtractor, Feature, FeatureExtractor, FeatureParams};
pub use matching::match_features;
pub use optimizer::{optimize, OptimizeParams, OptimizeSummary};
pub use tile::{Tile, TileGraph};
