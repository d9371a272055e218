//! The seam between the statistics engines and wherever pixels come from.

use async_trait::async_trait;
use geocontext_core::{BBox, Raster};

use crate::error::Result;
use crate::signing::FetchHandle;

/// Windowed access to single-band rasters.
#[async_trait]
pub trait RasterAccess: Send + Sync {
    /// Band 1 of the raster behind `handle`, cropped to the pixel window
    /// covering `bbox` (WGS84 lon/lat). The returned raster carries its
    /// transform, CRS and no-data value in the raster's own projection.
    async fn read_window(&self, handle: &FetchHandle, bbox: &BBox) -> Result<Raster>;
}
