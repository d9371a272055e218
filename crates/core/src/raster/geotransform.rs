//! Affine geotransformation for rasters

use serde::{Deserialize, Serialize};

/// Affine transformation coefficients for georeferencing rasters.
///
/// Converts between pixel coordinates (col, row) and map coordinates (x, y):
/// ```text
/// x = origin_x + col * pixel_width
/// y = origin_y + row * pixel_height
/// ```
///
/// Only north-up grids occur in the collections we read, so rotation terms
/// are not modelled. `pixel_height` is negative for north-up images.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Pixel width (cell size in X direction)
    pub pixel_width: f64,
    /// Pixel height (cell size in Y direction, usually negative)
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Build from GeoTIFF `ModelTiepoint` `[I, J, K, X, Y, Z]` and
    /// `ModelPixelScale` `[ScaleX, ScaleY, ScaleZ]` tags.
    pub fn from_tiepoint(tiepoint: &[f64], scale: &[f64]) -> Option<Self> {
        if tiepoint.len() < 6 || scale.len() < 2 {
            return None;
        }
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        Some(Self::new(origin_x, origin_y, scale[0], -scale[1]))
    }

    /// Map coordinates of the centre of pixel (col, row)
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        let x = self.origin_x + (col as f64 + 0.5) * self.pixel_width;
        let y = self.origin_y + (row as f64 + 0.5) * self.pixel_height;
        (x, y)
    }

    /// Map coordinates of the top-left corner of pixel (col, row)
    pub fn pixel_to_geo_corner(&self, col: usize, row: usize) -> (f64, f64) {
        let x = self.origin_x + col as f64 * self.pixel_width;
        let y = self.origin_y + row as f64 * self.pixel_height;
        (x, y)
    }

    /// Convert map coordinates to fractional pixel coordinates `(col, row)`.
    ///
    /// Use `.floor()` to get integer indices.
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        if self.pixel_width.abs() < 1e-15 || self.pixel_height.abs() < 1e-15 {
            return (f64::NAN, f64::NAN);
        }
        let col = (x - self.origin_x) / self.pixel_width;
        let row = (y - self.origin_y) / self.pixel_height;
        (col, row)
    }

    /// Shift the origin to the top-left corner of pixel (col, row).
    pub fn window(&self, col: usize, row: usize) -> Self {
        let (x, y) = self.pixel_to_geo_corner(col, row);
        Self::new(x, y, self.pixel_width, self.pixel_height)
    }

    /// Calculate the bounding box `(min_x, min_y, max_x, max_y)` for a
    /// raster of given dimensions
    pub fn bounds(&self, width: usize, height: usize) -> (f64, f64, f64, f64) {
        let (x0, y0) = self.pixel_to_geo_corner(0, 0);
        let (x1, y1) = self.pixel_to_geo_corner(width, height);
        (x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}
