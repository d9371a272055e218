//! # GeoContext Cloud
//!
//! Remote data access for the context pipeline:
//!
//! - STAC item search against Planetary Computer, Earth Search or any STAC API
//! - Planetary Computer SAS signing of asset hrefs
//! - Windowed reads of Cloud Optimized GeoTIFFs over HTTP Range requests,
//!   with a shared block cache so only the tiles under the area of interest
//!   are fetched
//! - The handful of projections the supported collections use (geographic,
//!   Web Mercator, UTM, MODIS sinusoidal)

pub mod cache;
pub mod cog_reader;
pub mod error;
pub mod geotiff;
pub mod http;
pub mod range_reader;
pub mod raster_access;
pub mod reproject;
pub mod signing;
pub mod stac_client;
pub mod stac_models;
pub mod tile_index;

pub use cog_reader::{CogRasterReader, CogReaderOptions};
pub use error::{CloudError, Result};
pub use raster_access::RasterAccess;
pub use reproject::Projection;
pub use signing::{
    resolve_asset, AssetSigner, FetchHandle, PassthroughSigner, PlanetaryComputerSigner,
};
pub use stac_client::{Catalog, CatalogQuery, StacCatalog, StacClient, StacClientOptions};
pub use stac_models::{RasterBand, StacAsset, StacItem, StacItemCollection, StacSearchParams};

#[cfg(test)]
mod test_support;
