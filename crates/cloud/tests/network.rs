//! End-to-end checks against live catalogs.
//!
//! All tests here need network access and are ignored by default.
//! Run with: `cargo test -p geocontext-cloud -- --ignored`

use std::time::Duration;

use geocontext_cloud::{
    resolve_asset, AssetSigner, Catalog, CatalogQuery, CogRasterReader, CogReaderOptions,
    PlanetaryComputerSigner, RasterAccess, StacCatalog, StacClient, StacClientOptions,
};
use geocontext_core::BBox;

/// Around Lake Garda.
fn bbox() -> BBox {
    BBox::new(10.6, 45.6, 10.7, 45.7)
}

fn pc() -> StacClient {
    StacClient::new(StacCatalog::PlanetaryComputer, StacClientOptions::default())
        .expect("failed to create client")
}

#[tokio::test]
#[ignore]
async fn pc_nasadem_search() {
    let items = pc()
        .search(&CatalogQuery::new("nasadem", bbox(), 1))
        .await
        .expect("search failed");
    assert_eq!(items.len(), 1);
    assert!(items[0].asset("elevation").is_some());
}

#[tokio::test]
#[ignore]
async fn pc_modis_lst_is_newest_first_with_scale() {
    let query =
        CatalogQuery::new("modis-11A2-061", bbox(), 12).with_datetime("2023-01-01/2023-12-31");
    let items = pc().search(&query).await.expect("search failed");
    assert!(!items.is_empty() && items.len() <= 12);

    let dates: Vec<&str> = items.iter().filter_map(|i| i.datetime()).collect();
    let mut sorted = dates.clone();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(dates, sorted, "items should be most recent first");

    let lst = items[0].asset("LST_Day_1km").expect("LST asset");
    assert!((lst.scale() - 0.02).abs() < 1e-9);
}

#[tokio::test]
#[ignore]
async fn pc_sign_and_read_dem_window() {
    let items = pc()
        .search(&CatalogQuery::new("nasadem", bbox(), 1))
        .await
        .expect("search failed");
    let signer = PlanetaryComputerSigner::new(Duration::from_secs(60)).unwrap();
    let handle = resolve_asset(&signer, &items[0], "elevation").await.expect("signing failed");
    assert!(handle.url.contains("sig="));

    let reader = CogRasterReader::new(CogReaderOptions::default()).unwrap();
    let raster = reader.read_window(&handle, &bbox()).await.expect("read failed");
    println!("DEM window {:?}, {} valid cells", raster.shape(), raster.valid_count());
    assert!(raster.valid_count() > 0);
}

#[tokio::test]
#[ignore]
async fn pc_sign_rejects_unknown_storage() {
    let signer = PlanetaryComputerSigner::new(Duration::from_secs(30)).unwrap();
    assert!(signer.sign("https://example.com/not-a-pc-asset.tif").await.is_err());
}

#[tokio::test]
#[ignore]
async fn earth_search_reachable() {
    let client = StacClient::new(StacCatalog::EarthSearch, StacClientOptions::default()).unwrap();
    let query = CatalogQuery::new("cop-dem-glo-30", bbox(), 1);
    let items = client.search(&query).await.expect("search failed");
    assert!(items.len() <= 1);
}
