//! Temporal composites
//!
//! Scenes from one collection rarely share a grid (MODIS tiles, different
//! acquisition footprints), so each scene is first resampled with nearest
//! neighbour onto a [`TargetGrid`] and then stacked into a
//! [`CompositeCube`] of shape `(time, row, col)`.
//!
//! Raw sensor counts are calibrated in place: sentinel codes and no-data are
//! masked first, then `value * scale + offset` is applied. The reduction runs
//! over every populated cell of the cube, across both time and space.

use geocontext_core::raster::{GeoTransform, Raster};
use geocontext_core::{BBox, Error, Result, CRS};
use ndarray::{Array2, Array3, ArrayView2, Axis};

use crate::statistics::{summarize, ContinuousSummary};

/// Common output grid shared by every scene of a composite.
#[derive(Debug, Clone)]
pub struct TargetGrid {
    pub transform: GeoTransform,
    pub rows: usize,
    pub cols: usize,
    pub crs: CRS,
}

impl TargetGrid {
    /// Grid of square `resolution` cells covering `bbox` (given in `crs`).
    ///
    /// The edges are snapped outwards to multiples of the resolution so that
    /// the same area always yields the same grid.
    pub fn covering(bbox: &BBox, resolution: f64, crs: CRS) -> Result<Self> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(Error::Other(format!("invalid grid resolution {resolution}")));
        }
        if !bbox.is_valid() {
            return Err(Error::Other(format!(
                "invalid grid extent [{}, {}, {}, {}]",
                bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y
            )));
        }

        let min_x = (bbox.min_x / resolution).floor() * resolution;
        let max_x = (bbox.max_x / resolution).ceil() * resolution;
        let min_y = (bbox.min_y / resolution).floor() * resolution;
        let max_y = (bbox.max_y / resolution).ceil() * resolution;

        let cols = (((max_x - min_x) / resolution).round() as usize).max(1);
        let rows = (((max_y - min_y) / resolution).round() as usize).max(1);

        Ok(Self {
            transform: GeoTransform::new(min_x, max_y, resolution, -resolution),
            rows,
            cols,
            crs,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Number of cells, saturating on overflow.
    pub fn cell_count(&self) -> usize {
        self.rows.saturating_mul(self.cols)
    }

    /// Fail when the grid holds more than `max_cells` cells.
    ///
    /// Checked before any layer is allocated: every scene becomes a full
    /// `rows x cols` array.
    pub fn ensure_at_most(&self, max_cells: usize) -> Result<()> {
        let cells = self.cell_count();
        if cells > max_cells {
            return Err(Error::Other(format!(
                "composite grid of {cells} cells ({}x{}) exceeds limit of {max_cells}",
                self.rows, self.cols
            )));
        }
        Ok(())
    }

    pub fn bounds(&self) -> BBox {
        let (min_x, min_y, max_x, max_y) = self.transform.bounds(self.cols, self.rows);
        BBox::new(min_x, min_y, max_x, max_y)
    }
}

/// Nearest-neighbour resample of `source` onto `grid`.
///
/// `to_source` maps a target cell centre (grid CRS) to source map
/// coordinates; `None` leaves the cell empty. Cells falling outside the
/// source, or on a missing source cell, become `NaN`.
pub fn resample_nearest<F>(source: &Raster, grid: &TargetGrid, to_source: F) -> Array2<f64>
where
    F: Fn(f64, f64) -> Option<(f64, f64)>,
{
    let (src_rows, src_cols) = source.shape();
    let src_gt = source.transform();
    let mut out = Array2::from_elem(grid.shape(), f64::NAN);

    for ((row, col), cell) in out.indexed_iter_mut() {
        let (x, y) = grid.transform.pixel_to_geo(col, row);
        let Some((sx, sy)) = to_source(x, y) else {
            continue;
        };
        let (fc, fr) = src_gt.geo_to_pixel(sx, sy);
        if !(fc.is_finite() && fr.is_finite()) || fc < 0.0 || fr < 0.0 {
            continue;
        }
        let (c, r) = (fc.floor() as usize, fr.floor() as usize);
        if r >= src_rows || c >= src_cols {
            continue;
        }
        let v = source.data()[(r, c)];
        if !source.is_missing(v) {
            *cell = v;
        }
    }
    out
}

/// Conversion from raw sensor counts to physical units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub scale: f64,
    pub offset: f64,
    /// Raw value meaning "no retrieval", masked before scaling
    pub invalid_raw: Option<f64>,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset: 0.0,
            invalid_raw: None,
        }
    }
}

impl Calibration {
    fn apply(&self, raw: f64) -> f64 {
        if raw.is_nan() || self.invalid_raw == Some(raw) {
            return f64::NAN;
        }
        raw * self.scale + self.offset
    }
}

/// Stack of co-registered scenes, `(time, row, col)`.
#[derive(Debug, Clone)]
pub struct CompositeCube {
    data: Array3<f64>,
}

impl CompositeCube {
    /// Stack equally shaped layers along a new leading time axis.
    pub fn stack(layers: &[Array2<f64>]) -> Result<Self> {
        let Some(first) = layers.first() else {
            return Err(Error::Other("composite needs at least one scene".into()));
        };
        let (rows, cols) = first.dim();
        if let Some(bad) = layers.iter().find(|l| l.dim() != (rows, cols)) {
            let (h, w) = bad.dim();
            return Err(Error::InvalidDimensions { width: w, height: h });
        }
        let views: Vec<ArrayView2<'_, f64>> = layers.iter().map(|l| l.view()).collect();
        let data = ndarray::stack(Axis(0), &views).map_err(|e| Error::Other(e.to_string()))?;
        Ok(Self { data })
    }

    /// `(time, rows, cols)`
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    /// Mask sentinel values, then scale and offset every remaining cell.
    pub fn apply_calibration(&mut self, calibration: &Calibration) {
        self.data.mapv_inplace(|v| calibration.apply(v));
    }

    /// Number of cells holding a value.
    pub fn populated(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }

    /// Summary over every populated cell of the cube; `None` if there is none.
    pub fn reduce(&self) -> Option<ContinuousSummary> {
        summarize(self.data.iter().copied())
    }
}
