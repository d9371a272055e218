//! In-memory fakes of the three collaborators (testing only)
//!
//! Provides `FakeCatalog`, `FakeSigner` and `FakeRasterAccess` that satisfy
//! the trait contracts without any network access, plus small builders for
//! items, rasters and areas of interest.
//!
//! Compiled for this crate's own tests and behind the `testing` feature.
//! The builders panic on inconsistent input.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use geo_types::{LineString, Polygon};
use geocontext_cloud::{
    AssetSigner, Catalog, CatalogQuery, CloudError, FetchHandle, RasterAccess, StacItem,
};
use geocontext_core::{AreaOfInterest, BBox, GeoTransform, Raster, CRS};

type CloudResult<T> = geocontext_cloud::Result<T>;

// ---------------------------------------------------------------------------
// FakeCatalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Response {
    Items(Vec<StacItem>),
    Fail(String),
    Timeout,
    Hang,
}

/// Increments a counter when a hung search future is dropped.
struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Catalog answering from a per-collection table. Unknown collections have
/// no coverage.
#[derive(Default)]
pub struct FakeCatalog {
    responses: HashMap<String, Response>,
    queries: Mutex<Vec<CatalogQuery>>,
    cancelled: Arc<AtomicUsize>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(mut self, collection: &str, items: Vec<StacItem>) -> Self {
        self.responses.insert(collection.into(), Response::Items(items));
        self
    }

    /// Searches of `collection` fail with `CatalogQueryFailed`.
    pub fn with_failure(mut self, collection: &str, reason: &str) -> Self {
        self.responses.insert(collection.into(), Response::Fail(reason.into()));
        self
    }

    /// Searches of `collection` fail with `CatalogTimeout`.
    pub fn with_timeout(mut self, collection: &str) -> Self {
        self.responses.insert(collection.into(), Response::Timeout);
        self
    }

    /// Searches of `collection` never complete.
    pub fn with_hang(mut self, collection: &str) -> Self {
        self.responses.insert(collection.into(), Response::Hang);
        self
    }

    /// Every query received so far, in arrival order.
    pub fn queries(&self) -> Vec<CatalogQuery> {
        self.queries.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Number of hung searches whose future was dropped.
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Catalog for FakeCatalog {
    async fn search(&self, query: &CatalogQuery) -> CloudResult<Vec<StacItem>> {
        self.queries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(query.clone());

        match self.responses.get(&query.collection) {
            None => Ok(Vec::new()),
            Some(Response::Items(items)) => {
                Ok(items.iter().take(query.limit as usize).cloned().collect())
            }
            Some(Response::Fail(reason)) => Err(CloudError::CatalogQueryFailed {
                collection: query.collection.clone(),
                reason: reason.clone(),
            }),
            Some(Response::Timeout) => Err(CloudError::CatalogTimeout {
                collection: query.collection.clone(),
            }),
            Some(Response::Hang) => {
                let _guard = DropCounter(self.cancelled.clone());
                std::future::pending::<()>().await;
                Ok(Vec::new())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// FakeSigner
// ---------------------------------------------------------------------------

/// Signer returning hrefs unchanged, except those marked as failing.
#[derive(Default)]
pub struct FakeSigner {
    failing: HashSet<String>,
    signed: Mutex<Vec<String>>,
}

impl FakeSigner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, href: &str) -> Self {
        self.failing.insert(href.into());
        self
    }

    /// Hrefs signed so far.
    pub fn signed(&self) -> Vec<String> {
        self.signed.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl AssetSigner for FakeSigner {
    async fn sign(&self, href: &str) -> CloudResult<FetchHandle> {
        if self.failing.contains(href) {
            return Err(CloudError::AssetResolutionFailed {
                href: href.into(),
                reason: "sign endpoint returned HTTP 403".into(),
            });
        }
        self.signed
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(href.into());
        Ok(FetchHandle::new(href))
    }
}

// ---------------------------------------------------------------------------
// FakeRasterAccess
// ---------------------------------------------------------------------------

/// Raster access serving whole in-memory rasters by URL.
#[derive(Default)]
pub struct FakeRasterAccess {
    rasters: HashMap<String, Result<Raster, String>>,
    reads: AtomicUsize,
}

impl FakeRasterAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_raster(mut self, url: &str, raster: Raster) -> Self {
        self.rasters.insert(url.into(), Ok(raster));
        self
    }

    /// Reads of `url` fail with `RasterRead(reason)`.
    pub fn with_failure(mut self, url: &str, reason: &str) -> Self {
        self.rasters.insert(url.into(), Err(reason.into()));
        self
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RasterAccess for FakeRasterAccess {
    async fn read_window(&self, handle: &FetchHandle, _bbox: &BBox) -> CloudResult<Raster> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        match self.rasters.get(&handle.url) {
            Some(Ok(raster)) => Ok(raster.clone()),
            Some(Err(reason)) => Err(CloudError::RasterRead(reason.clone())),
            None => Err(CloudError::RasterRead(format!("no raster at {}", handle.url))),
        }
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Item with one asset `key` pointing at `href`.
pub fn item(id: &str, key: &str, href: &str) -> StacItem {
    item_with_band(id, key, href, None, None)
}

/// Item whose asset carries `raster:bands[0]` scale and nodata.
pub fn item_with_band(
    id: &str,
    key: &str,
    href: &str,
    scale: Option<f64>,
    nodata: Option<f64>,
) -> StacItem {
    let mut band = serde_json::Map::new();
    if let Some(scale) = scale {
        band.insert("scale".into(), scale.into());
    }
    if let Some(nodata) = nodata {
        band.insert("nodata".into(), nodata.into());
    }
    let value = serde_json::json!({
        "id": id,
        "properties": {"datetime": "2024-06-01T00:00:00Z"},
        "assets": {key: {"href": href, "raster:bands": [band]}}
    });
    // Literal JSON above always matches the StacItem schema
    serde_json::from_value(value).unwrap_or_else(|e| panic!("bad fake item: {e}"))
}

/// WGS84 raster of `rows x cols` cells exactly covering `[min_x, min_y, max_x, max_y]`.
pub fn grid_raster(values: Vec<f64>, rows: usize, cols: usize, bounds: [f64; 4]) -> Raster {
    let [min_x, min_y, max_x, max_y] = bounds;
    let transform = GeoTransform::new(
        min_x,
        max_y,
        (max_x - min_x) / cols as f64,
        -(max_y - min_y) / rows as f64,
    );
    Raster::from_vec(values, rows, cols)
        .unwrap_or_else(|e| panic!("bad fake raster: {e}"))
        .with_georef(transform, CRS::wgs84())
}

/// Axis-aligned square polygon as an area of interest.
pub fn square_aoi(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> AreaOfInterest {
    let ring = LineString::from(vec![
        (min_x, min_y),
        (max_x, min_y),
        (max_x, max_y),
        (min_x, max_y),
        (min_x, min_y),
    ]);
    AreaOfInterest::new(Polygon::new(ring, vec![]))
        .unwrap_or_else(|e| panic!("bad fake polygon: {e}"))
}
