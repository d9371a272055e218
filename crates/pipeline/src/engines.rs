//! Pixel engines: continuous statistics, categorical coverage and temporal
//! composites.
//!
//! Every engine returns a [`SourceResult`]; read, projection and decode
//! failures are folded into [`SourceResult::Error`] here so the aggregator
//! only has to merge.

use geocontext_algorithms::statistics::{class_coverage, continuous_stats, ContinuousSummary};
use geocontext_algorithms::temporal::{resample_nearest, Calibration, CompositeCube, TargetGrid};
use geocontext_algorithms::vector::clip_to_polygon;
use geocontext_cloud::reproject::{project_bbox, project_polygon, Projection};
use geocontext_cloud::{resolve_asset, AssetSigner, CloudError, FetchHandle, RasterAccess, StacItem};
use geocontext_core::{AreaOfInterest, BBox, Raster, CRS};
use ndarray::Array2;
use tracing::{debug, warn};

use crate::result::SourceResult;

/// Message reported when a continuous source has nothing to reduce.
pub const NO_VALID_PIXELS: &str = "no valid pixels inside area of interest";

/// Largest composite grid, in cells, built unless a source overrides it.
pub const DEFAULT_MAX_GRID_CELLS: usize = 2_000_000;

// ---------------------------------------------------------------------------
// Composite settings
// ---------------------------------------------------------------------------

/// Which statistics a composite reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    MeanMinMax,
    MeanOnly,
}

/// Output names of the composite statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputKeys {
    pub mean: String,
    pub min: String,
    pub max: String,
}

impl OutputKeys {
    pub fn new(mean: impl Into<String>, min: impl Into<String>, max: impl Into<String>) -> Self {
        Self {
            mean: mean.into(),
            min: min.into(),
            max: max.into(),
        }
    }
}

/// How to build and reduce a multi-scene composite.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeSpec {
    /// Asset key of the band on every item.
    pub band: String,
    /// EPSG code of the common grid.
    pub target_epsg: u32,
    /// Cell size of the common grid, in target CRS units.
    pub resolution: f64,
    /// Added after scaling (e.g. Kelvin to Celsius).
    pub unit_offset: f64,
    /// Raw code meaning "no retrieval".
    pub invalid_raw: Option<f64>,
    pub reduction: Reduction,
    pub keys: OutputKeys,
    /// Cap on `rows * cols` of the common grid; larger areas are an error.
    pub max_grid_cells: usize,
}

// ---------------------------------------------------------------------------
// Single-scene engines
// ---------------------------------------------------------------------------

/// mean/min/max/std of the raster behind `handle`, inside the polygon.
pub async fn compute_continuous_stats(
    access: &dyn RasterAccess,
    handle: &FetchHandle,
    aoi: &AreaOfInterest,
) -> SourceResult {
    let clipped = match clipped_window(access, handle, aoi).await {
        Ok(clipped) => clipped,
        Err(e) => return failed(handle, e),
    };
    match clipped.as_ref().and_then(continuous_stats) {
        Some(s) => SourceResult::stats([
            ("mean", s.mean),
            ("min", s.min),
            ("max", s.max),
            ("std", s.std_dev),
        ]),
        None => SourceResult::error(NO_VALID_PIXELS),
    }
}

/// Class-code percentages of the raster behind `handle`, inside the polygon.
pub async fn compute_coverage(
    access: &dyn RasterAccess,
    handle: &FetchHandle,
    aoi: &AreaOfInterest,
) -> SourceResult {
    let clipped = match clipped_window(access, handle, aoi).await {
        Ok(clipped) => clipped,
        Err(CloudError::BBoxOutside) => None,
        Err(e) => return failed(handle, e),
    };
    let coverage = clipped.as_ref().map(class_coverage).unwrap_or_default();
    if coverage.is_empty() {
        return SourceResult::Empty;
    }
    SourceResult::stats(coverage.into_iter().map(|(class, pct)| (class.to_string(), pct)))
}

/// Read the window under the AOI bounds and clip it to the polygon, in the
/// raster's own CRS. `None` when no pixel centre is inside.
async fn clipped_window(
    access: &dyn RasterAccess,
    handle: &FetchHandle,
    aoi: &AreaOfInterest,
) -> Result<Option<Raster>, CloudError> {
    let raster = access.read_window(handle, &aoi.bounds()).await?;
    let proj = raster_projection(&raster)?;
    let polygon = project_polygon(aoi.polygon(), &proj);
    let clipped = clip_to_polygon(&raster, &polygon)?;
    debug!(
        host = handle.host(),
        window = ?raster.shape(),
        valid = clipped.as_ref().map(Raster::valid_count).unwrap_or(0),
        "clipped to polygon"
    );
    Ok(clipped)
}

fn raster_projection(raster: &Raster) -> Result<Projection, CloudError> {
    let crs = raster
        .crs()
        .ok_or_else(|| CloudError::RasterRead("raster carries no CRS".into()))?;
    Projection::from_crs(crs)
}

fn failed(handle: &FetchHandle, e: CloudError) -> SourceResult {
    warn!(host = handle.host(), error = %e, "raster engine failed");
    SourceResult::error(e.to_string())
}

// ---------------------------------------------------------------------------
// Temporal composite
// ---------------------------------------------------------------------------

/// Composite every item onto a common grid covering `bbox` (WGS84) and
/// reduce the whole cube.
///
/// The scale factor comes from the first item's `raster:bands`. Sentinel and
/// no-data values are masked on the raw counts, before scale and offset.
/// Reading any scene fails the whole source, and so does a grid larger than
/// `spec.max_grid_cells`; no items or no populated cell is
/// [`SourceResult::Empty`].
pub async fn compute_annual_composite(
    access: &dyn RasterAccess,
    signer: &dyn AssetSigner,
    items: &[StacItem],
    spec: &CompositeSpec,
    bbox: &BBox,
) -> SourceResult {
    match composite(access, signer, items, spec, bbox).await {
        Ok(Some(s)) => match spec.reduction {
            Reduction::MeanMinMax => SourceResult::stats([
                (spec.keys.mean.as_str(), s.mean),
                (spec.keys.min.as_str(), s.min),
                (spec.keys.max.as_str(), s.max),
            ]),
            Reduction::MeanOnly => SourceResult::stats([(spec.keys.mean.as_str(), s.mean)]),
        },
        Ok(None) => SourceResult::Empty,
        Err(e) => {
            warn!(band = %spec.band, error = %e, "composite failed");
            SourceResult::error(e.to_string())
        }
    }
}

async fn composite(
    access: &dyn RasterAccess,
    signer: &dyn AssetSigner,
    items: &[StacItem],
    spec: &CompositeSpec,
    bbox: &BBox,
) -> Result<Option<ContinuousSummary>, CloudError> {
    let Some(first) = items.first() else {
        return Ok(None);
    };

    let target = Projection::from_epsg(spec.target_epsg)?;
    let grid = TargetGrid::covering(
        &project_bbox(bbox, &target),
        spec.resolution,
        CRS::from_epsg(spec.target_epsg),
    )?;
    grid.ensure_at_most(spec.max_grid_cells)?;
    let scale = first.asset(&spec.band).map(|a| a.scale()).unwrap_or(1.0);

    let reads = items
        .iter()
        .map(|item| read_scene(access, signer, item, &spec.band, bbox, &grid, target));
    let layers = futures::future::try_join_all(reads).await?;

    let mut cube = CompositeCube::stack(&layers)?;
    cube.apply_calibration(&Calibration {
        scale,
        offset: spec.unit_offset,
        invalid_raw: spec.invalid_raw,
    });
    debug!(
        scenes = layers.len(),
        grid = ?grid.shape(),
        populated = cube.populated(),
        scale,
        "composite stacked"
    );
    Ok(cube.reduce())
}

/// One scene resampled onto `grid`, raw counts, missing cells as NaN.
async fn read_scene(
    access: &dyn RasterAccess,
    signer: &dyn AssetSigner,
    item: &StacItem,
    band: &str,
    bbox: &BBox,
    grid: &TargetGrid,
    target: Projection,
) -> Result<Array2<f64>, CloudError> {
    let handle = resolve_asset(signer, item, band).await?;
    let mut raster = match access.read_window(&handle, bbox).await {
        Ok(raster) => raster,
        // The item footprint touches the bbox but its pixels do not.
        Err(CloudError::BBoxOutside) => {
            return Ok(Array2::from_elem(grid.shape(), f64::NAN));
        }
        Err(e) => return Err(e),
    };

    if raster.nodata().is_none() {
        let catalog_nodata = item
            .asset(band)
            .and_then(|a| a.raster_band(0))
            .and_then(|b| b.nodata);
        raster.set_nodata(catalog_nodata);
    }

    let source = raster_projection(&raster)?;
    Ok(resample_nearest(&raster, grid, move |x, y| {
        let (lon, lat) = target.inverse(x, y);
        Some(source.forward(lon, lat))
    }))
}
