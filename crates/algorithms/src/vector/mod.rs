//! Vector-on-raster operations
//!
//! - **mask**: rasterize a polygon onto a grid and clip a raster to it

pub mod mask;

pub use mask::{clip_to_polygon, polygon_mask};
