pub mod consts;
pub mod error;
pub mod raster;
pub mod filters;
pub mod model;
pub mod transform;
pub mod parallel;
pub mod align;
pub mod blockmatch;
pub mod pipeline;
pub mod io;
