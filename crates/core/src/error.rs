//! Error types for GeoContext core

use thiserror::Error;

/// Main error type for core operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("malformed geometry: {0}")]
    MalformedGeometry(String),

    #[error("unsupported geometry type '{0}': only single Polygon geometries are accepted")]
    UnsupportedGeometry(String),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;
