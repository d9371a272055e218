//! STAC (SpatioTemporal Asset Catalog) data types.
//!
//! Serde models for the parts of STAC Item Search (POST /search) the context
//! pipeline touches: the search body, item datetime, assets and the
//! `raster:bands` extension that carries scale, offset and no-data.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Search request
// ---------------------------------------------------------------------------

/// One entry of the `sortby` extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortBy {
    pub field: String,
    pub direction: String,
}

impl SortBy {
    /// Most recent acquisitions first.
    pub fn newest_first() -> Self {
        Self {
            field: "properties.datetime".to_string(),
            direction: "desc".to_string(),
        }
    }
}

/// Body for `POST /search` (STAC API – Item Search).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StacSearchParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,

    /// GeoJSON geometry; catalogs reject requests carrying both this and `bbox`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intersects: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sortby: Option<Vec<SortBy>>,
}

impl StacSearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a single collection.
    pub fn collection(mut self, name: &str) -> Self {
        self.collections = Some(vec![name.to_string()]);
        self
    }

    /// Set the bounding box `[west, south, east, north]`.
    pub fn bbox(mut self, bbox: [f64; 4]) -> Self {
        self.bbox = Some(bbox.to_vec());
        self.intersects = None;
        self
    }

    /// Filter by geometry instead of bbox.
    pub fn intersects(mut self, geometry: serde_json::Value) -> Self {
        self.intersects = Some(geometry);
        self.bbox = None;
        self
    }

    /// Set datetime or datetime range (e.g. `"2024-01-01/2024-12-31"`).
    pub fn datetime(mut self, dt: &str) -> Self {
        self.datetime = Some(dt.to_string());
        self
    }

    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn sort(mut self, sort: SortBy) -> Self {
        self.sortby.get_or_insert_with(Vec::new).push(sort);
        self
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// A STAC Item Collection (GeoJSON FeatureCollection).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItemCollection {
    #[serde(rename = "type", default)]
    pub type_: String,

    pub features: Vec<StacItem>,

    #[serde(rename = "numberMatched", skip_serializing_if = "Option::is_none")]
    pub number_matched: Option<u64>,
}

impl StacItemCollection {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// A single STAC Item (GeoJSON Feature).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItem {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,

    /// Bounding box `[west, south, east, north]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,

    #[serde(default)]
    pub properties: StacItemProperties,

    #[serde(default)]
    pub assets: HashMap<String, StacAsset>,
}

impl StacItem {
    /// Get an asset by key.
    pub fn asset(&self, key: &str) -> Option<&StacAsset> {
        self.assets.get(key)
    }

    /// Acquisition datetime as the catalog reported it.
    pub fn datetime(&self) -> Option<&str> {
        self.properties.datetime.as_deref()
    }

    /// EPSG code from the `proj:epsg` property, if present.
    pub fn epsg(&self) -> Option<u32> {
        self.properties
            .extra
            .get("proj:epsg")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32)
    }
}

/// STAC Item properties.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StacItemProperties {
    /// ISO 8601 datetime; null for items that only carry a range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// A single STAC Asset (file reference).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacAsset {
    pub href: String,

    /// Media type (e.g., `"image/tiff; application=geotiff; profile=cloud-optimized"`).
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,

    /// `raster:bands` extension entries.
    #[serde(rename = "raster:bands", default, skip_serializing_if = "Vec::is_empty")]
    pub raster_bands: Vec<RasterBand>,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl StacAsset {
    /// Metadata of band `index` (0-based), if the catalog published any.
    pub fn raster_band(&self, index: usize) -> Option<&RasterBand> {
        self.raster_bands.get(index)
    }

    /// Multiplier from stored values to physical units; 1.0 when unspecified.
    pub fn scale(&self) -> f64 {
        self.raster_band(0).and_then(|b| b.scale).unwrap_or(1.0)
    }
}

/// One band of the `raster:bands` extension.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RasterBand {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodata: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
