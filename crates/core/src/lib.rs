//! # GeoContext Core
//!
//! Core types shared by every GeoContext crate.
//!
//! This crate provides:
//! - `Raster`: georeferenced `f64` grid with a no-data value
//! - `GeoTransform`: affine transformation for georeferencing
//! - `CRS`: coordinate reference system identity
//! - `AreaOfInterest` / `BBox`: the request polygon and its bounds

pub mod crs;
pub mod error;
pub mod raster;
pub mod vector;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{GeoTransform, Raster};
pub use vector::{AreaOfInterest, BBox};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, Raster};
    pub use crate::vector::{AreaOfInterest, BBox};
}
