//! Main Raster type

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::GeoTransform;
use ndarray::{Array2, ArrayView2};

/// A georeferenced 2D grid of `f64` cell values.
///
/// Every band we read is widened to `f64` on decode, so a single cell type
/// covers continuous (elevation, temperature) and categorical (class code)
/// rasters alike. Missing cells are either `NaN` or equal to `nodata`.
///
/// # Example
///
/// ```
/// use geocontext_core::Raster;
///
/// let mut raster = Raster::filled(3, 3, 1.0);
/// raster.set_nodata(Some(-9999.0));
/// raster.set(1, 1, -9999.0).unwrap();
/// assert_eq!(raster.valid_count(), 8);
/// ```
#[derive(Debug, Clone)]
pub struct Raster {
    /// Cell values in row-major order (row, col)
    data: Array2<f64>,
    transform: GeoTransform,
    crs: Option<CRS>,
    nodata: Option<f64>,
}

impl Raster {
    /// Create a new raster filled with a specific value
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self::from_array(Array2::from_elem((rows, cols), value))
    }

    /// Create a raster from row-major data
    pub fn from_vec(data: Vec<f64>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }
        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;
        Ok(Self::from_array(array))
    }

    /// Create a raster from an ndarray
    pub fn from_array(data: Array2<f64>) -> Self {
        Self {
            data,
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        }
    }

    /// Builder-style setter for transform and CRS.
    pub fn with_georef(mut self, transform: GeoTransform, crs: CRS) -> Self {
        self.transform = transform;
        self.crs = Some(crs);
        self
    }

    /// Builder-style setter for the no-data value.
    pub fn with_nodata(mut self, nodata: Option<f64>) -> Self {
        self.nodata = nodata;
        self
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<f64> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        let (rows, cols) = self.shape();
        match self.data.get_mut((row, col)) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(Error::IndexOutOfBounds { row, col, rows, cols }),
        }
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array2<f64> {
        &mut self.data
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    pub fn set_nodata(&mut self, nodata: Option<f64>) {
        self.nodata = nodata;
    }

    /// Geographic bounds (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols(), self.rows())
    }

    /// Whether `value` counts as missing: `NaN` or exactly the no-data value.
    pub fn is_missing(&self, value: f64) -> bool {
        value.is_nan() || self.nodata.map(|nd| value == nd).unwrap_or(false)
    }

    /// Number of cells that are not missing
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|&&v| !self.is_missing(v)).count()
    }

    /// Copy of the sub-grid `rows x cols` starting at (`row0`, `col0`), with
    /// the transform shifted accordingly.
    pub fn crop(&self, row0: usize, col0: usize, rows: usize, cols: usize) -> Result<Self> {
        if row0 + rows > self.rows() || col0 + cols > self.cols() {
            return Err(Error::IndexOutOfBounds {
                row: row0 + rows,
                col: col0 + cols,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        let data = self
            .data
            .slice(ndarray::s![row0..row0 + rows, col0..col0 + cols])
            .to_owned();
        Ok(Self {
            data,
            transform: self.transform.window(col0, row0),
            crs: self.crs.clone(),
            nodata: self.nodata,
        })
    }
}
