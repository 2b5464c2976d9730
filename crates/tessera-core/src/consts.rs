/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f64 = 1e-10;

/// Minimum number of in-flight jobs kept by the progressive executor.
pub const MIN_AHEAD: usize = 4;

/// Extra threads allowed over the hardware concurrency when sizing a pool.
pub const POOL_OVERCOMMIT: usize = 2;

/// Default RANSAC iteration cap for pairwise tile alignment.
pub const DEFAULT_RANSAC_ITERATIONS: usize = 1000;

/// RANSAC needs this many times a model's minimum match count as candidates.
pub const RANSAC_CANDIDATE_FACTOR: usize = 3;

/// Default trust multiplier for the robust refit after RANSAC.
pub const DEFAULT_MAX_TRUST: f64 = 3.0;

/// Slope below which the optimizer considers the worst-tile error flat.
pub const PLATEAU_SLOPE: f64 = 1e-4;

/// Direct render path is used while `w * h * scale² * 4` stays below this.
pub const DIRECT_RENDER_BYTES: f64 = (1u64 << 29) as f64;

/// Absolute ceiling on the pixel count of a single rendered raster.
pub const MAX_RASTER_PIXELS: f64 = (1u64 << 31) as f64;

/// Block radius never drops below this many working-scale pixels.
pub const MIN_BLOCK_RADIUS: usize = 16;

/// Number of coefficient tokens in a serialized affine transform.
pub const AFFINE_TOKENS: usize = 6;

/// Number of coefficient tokens in a serialized homography.
pub const HOMOGRAPHY_TOKENS: usize = 9;

/// Leading tag of a serialized thin-plate spline.
pub const TPS_TAG: &str = "ThinPlateSplineR2LogR";

/// Prefix marking an uncompressed base64 block.
pub const RAW_BLOCK_MARKER: char = '@';

/// Value of the constant term appended by the polynomial kernel expansion.
pub const KERNEL_CONSTANT_TERM: f64 = 100.0;
