//! Error types for catalog access, asset signing and remote raster reads.

use thiserror::Error;

/// Errors produced while talking to the catalog or reading remote rasters.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("catalog search for '{collection}' timed out")]
    CatalogTimeout { collection: String },

    #[error("catalog search for '{collection}' failed: {reason}")]
    CatalogQueryFailed { collection: String, reason: String },

    #[error("invalid catalog query: {0}")]
    InvalidQuery(String),

    #[error("could not resolve asset {href}: {reason}")]
    AssetResolutionFailed { href: String, reason: String },

    #[error("raster read failed: {0}")]
    RasterRead(String),

    #[error("raster read timed out after {secs}s")]
    ReadTimeout { secs: u64 },

    #[error("server does not support Range requests for {url}")]
    RangeNotSupported { url: String },

    #[error("unsupported projection: {0}")]
    UnsupportedProjection(String),

    #[error("invalid TIFF: {reason}")]
    InvalidTiff { reason: String },

    #[error("area of interest does not intersect raster extent")]
    BBoxOutside,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("core error: {0}")]
    Core(#[from] geocontext_core::Error),
}

impl From<tiff::TiffError> for CloudError {
    fn from(e: tiff::TiffError) -> Self {
        match e {
            tiff::TiffError::IoError(io) => CloudError::RasterRead(io.to_string()),
            other => CloudError::InvalidTiff {
                reason: other.to_string(),
            },
        }
    }
}

/// Result alias for cloud operations.
pub type Result<T> = std::result::Result<T, CloudError>;
