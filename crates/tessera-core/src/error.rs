use thiserror::Error;

#[derive(Error, Debug)]
pub enum TesseraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed {variant} data: {reason}")]
    Format {
        variant: &'static str,
        reason: String,
    },

    #[error("Not enough data points: {required} required, {found} found")]
    NotEnoughDataPoints { required: usize, found: usize },

    #[error("Ill-defined data points: {0}")]
    IllDefinedDataPoints(String),

    #[error("Noninvertible model: {0}")]
    NoninvertibleModel(String),

    #[error("{0} interrupted")]
    Interrupted(&'static str),

    #[error("Raster of {width}x{height} exceeds the maximum buffer size")]
    RasterTooLarge { width: u64, height: u64 },

    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Empty input: {0}")]
    EmptyInput(&'static str),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Config parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Config write error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl TesseraError {
    pub(crate) fn format(variant: &'static str, reason: impl Into<String>) -> Self {
        Self::Format {
            variant,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TesseraError>;
