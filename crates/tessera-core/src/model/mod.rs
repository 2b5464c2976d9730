pub mod affine;
pub mod kind;
pub mod point;
pub mod ransac;
pub mod smoothness;

pub use affine::AffineModel2D;
pub use kind::ModelKind;
pub use point::{mean_distance, Point, PointMatch};
pub use ransac::{filter_ransac, RansacOutcome, RansacParams};
pub use smoothness::{local_smoothness_filter, SmoothnessParams};
