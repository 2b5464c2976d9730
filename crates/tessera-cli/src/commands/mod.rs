pub mod config;
pub mod montage;
pub mod transform;
