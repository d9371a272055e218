//! Async STAC client for searching spatio-temporal asset catalogs.
//!
//! Supports Planetary Computer and Earth Search out of the box, plus
//! arbitrary STAC API endpoints via [`StacCatalog::Custom`].
//!
//! A search is a single POST with a bounded timeout. There is no pagination
//! and no retry: the pipeline only ever wants the newest `limit` items.

use std::time::Duration;

use async_trait::async_trait;
use geocontext_core::BBox;
use tracing::{debug, info};

use crate::error::{CloudError, Result};
use crate::stac_models::{SortBy, StacItem, StacItemCollection, StacSearchParams};

// ---------------------------------------------------------------------------
// Catalog enum
// ---------------------------------------------------------------------------

/// Well-known STAC catalogs plus custom endpoints.
#[derive(Debug, Clone, PartialEq)]
pub enum StacCatalog {
    /// Microsoft Planetary Computer STAC API.
    PlanetaryComputer,
    /// AWS Earth Search (Element 84).
    EarthSearch,
    /// Any STAC API endpoint (root URL or full `/search` URL).
    Custom(String),
}

impl StacCatalog {
    /// Return the full POST `/search` URL for this catalog.
    pub fn search_url(&self) -> String {
        match self {
            Self::PlanetaryComputer => {
                "https://planetarycomputer.microsoft.com/api/stac/v1/search".to_string()
            }
            Self::EarthSearch => "https://earth-search.aws.element84.com/v1/search".to_string(),
            Self::Custom(base) => {
                let base = base.trim_end_matches('/');
                if base.ends_with("/search") {
                    base.to_string()
                } else {
                    format!("{}/search", base)
                }
            }
        }
    }

    /// Parse a shorthand string into a catalog.
    ///
    /// Recognized shorthands: `"pc"`, `"planetary-computer"`, `"es"`,
    /// `"earth-search"`. Anything else is treated as a custom URL and kept
    /// verbatim.
    pub fn from_str_or_url(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "pc" | "planetary-computer" | "planetarycomputer" => Self::PlanetaryComputer,
            "es" | "earth-search" | "earthsearch" => Self::EarthSearch,
            _ => Self::Custom(s.to_string()),
        }
    }

    /// Whether assets from this catalog need SAS signing before they can be read.
    pub fn needs_signing(&self) -> bool {
        matches!(self, Self::PlanetaryComputer)
    }
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// What to ask the catalog for: one collection, a spatial filter, an optional
/// time range and a result count.
#[derive(Debug, Clone)]
pub struct CatalogQuery {
    pub collection: String,
    pub bbox: BBox,
    /// `start/end` range, e.g. `2024-01-01/2024-12-31`.
    pub datetime: Option<String>,
    pub limit: u32,
    /// Exact geometry filter; replaces `bbox` in the request body when set.
    pub intersects: Option<serde_json::Value>,
}

impl CatalogQuery {
    pub fn new(collection: impl Into<String>, bbox: BBox, limit: u32) -> Self {
        Self {
            collection: collection.into(),
            bbox,
            datetime: None,
            limit,
            intersects: None,
        }
    }

    pub fn with_datetime(mut self, datetime: impl Into<String>) -> Self {
        self.datetime = Some(datetime.into());
        self
    }

    pub fn with_intersects(mut self, geometry: serde_json::Value) -> Self {
        self.intersects = Some(geometry);
        self
    }

    /// Reject queries no catalog could answer.
    pub fn validate(&self) -> Result<()> {
        if self.collection.trim().is_empty() {
            return Err(CloudError::InvalidQuery("collection name is empty".into()));
        }
        if !self.bbox.is_valid() {
            return Err(CloudError::InvalidQuery(format!(
                "bounding box {:?} is not finite or is inverted",
                self.bbox.to_array()
            )));
        }
        if self.limit == 0 {
            return Err(CloudError::InvalidQuery("limit must be at least 1".into()));
        }
        Ok(())
    }

    /// The POST `/search` body for this query, newest items first.
    pub fn to_search_params(&self) -> StacSearchParams {
        let mut params = StacSearchParams::new()
            .collection(&self.collection)
            .limit(self.limit)
            .sort(SortBy::newest_first());
        params = match &self.intersects {
            Some(geometry) => params.intersects(geometry.clone()),
            None => params.bbox(self.bbox.to_array()),
        };
        if let Some(dt) = &self.datetime {
            params = params.datetime(dt);
        }
        params
    }
}

/// A searchable catalog of raster items.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Items matching `query`, most recent first, at most `query.limit` of them.
    /// An empty vector means the catalog has no coverage.
    async fn search(&self, query: &CatalogQuery) -> Result<Vec<StacItem>>;
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for [`StacClient`].
#[derive(Debug, Clone)]
pub struct StacClientOptions {
    /// Timeout covering the whole search request, body included (default 60 s).
    pub request_timeout: Duration,
}

impl Default for StacClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Async client for STAC Item Search.
pub struct StacClient {
    catalog: StacCatalog,
    client: reqwest::Client,
    options: StacClientOptions,
}

impl StacClient {
    pub fn new(catalog: StacCatalog, options: StacClientOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| CloudError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            catalog,
            client,
            options,
        })
    }

    /// The catalog this client is configured for.
    pub fn catalog(&self) -> &StacCatalog {
        &self.catalog
    }

    async fn post_search(
        &self,
        collection: &str,
        params: &StacSearchParams,
    ) -> Result<StacItemCollection> {
        let url = self.catalog.search_url();
        let failed = |reason: String| CloudError::CatalogQueryFailed {
            collection: collection.to_string(),
            reason,
        };
        let timed_out = || CloudError::CatalogTimeout {
            collection: collection.to_string(),
        };
        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                timed_out()
            } else {
                failed(e.to_string())
            }
        };

        let request = async {
            let resp = self
                .client
                .post(&url)
                .json(params)
                .send()
                .await
                .map_err(classify)?;

            let status = resp.status();
            let body = resp.text().await.map_err(classify)?;
            if !status.is_success() {
                return Err(failed(format!(
                    "HTTP {}: {}",
                    status,
                    body.chars().take(500).collect::<String>()
                )));
            }
            serde_json::from_str::<StacItemCollection>(&body)
                .map_err(|e| failed(format!("unparsable response: {e}")))
        };

        tokio::time::timeout(self.options.request_timeout, request)
            .await
            .map_err(|_| timed_out())?
    }
}

#[async_trait]
impl Catalog for StacClient {
    async fn search(&self, query: &CatalogQuery) -> Result<Vec<StacItem>> {
        query.validate()?;
        let params = query.to_search_params();
        debug!(collection = %query.collection, datetime = ?query.datetime, "STAC search");

        let page = self.post_search(&query.collection, &params).await?;
        let mut items = page.features;
        // Some servers ignore `limit`.
        items.truncate(query.limit as usize);

        info!(collection = %query.collection, items = items.len(), "catalog search complete");
        Ok(items)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{http_response, one_shot_server};

    fn query(limit: u32) -> CatalogQuery {
        CatalogQuery::new("nasadem", BBox::new(10.0, 45.0, 10.5, 45.25), limit)
    }

    fn client(url: String, timeout: Duration) -> StacClient {
        StacClient::new(
            StacCatalog::Custom(url),
            StacClientOptions {
                request_timeout: timeout,
            },
        )
        .unwrap()
    }

    #[test]
    fn catalog_search_urls() {
        assert_eq!(
            StacCatalog::PlanetaryComputer.search_url(),
            "https://planetarycomputer.microsoft.com/api/stac/v1/search"
        );
        assert_eq!(
            StacCatalog::EarthSearch.search_url(),
            "https://earth-search.aws.element84.com/v1/search"
        );
        assert_eq!(
            StacCatalog::Custom("https://example.com/stac".into()).search_url(),
            "https://example.com/stac/search"
        );
        assert_eq!(
            StacCatalog::Custom("https://example.com/stac/search/".into()).search_url(),
            "https://example.com/stac/search"
        );
    }

    #[test]
    fn catalog_shorthands() {
        assert_eq!(StacCatalog::from_str_or_url("PC"), StacCatalog::PlanetaryComputer);
        assert_eq!(StacCatalog::from_str_or_url("earth-search"), StacCatalog::EarthSearch);
        assert_eq!(
            StacCatalog::from_str_or_url("https://Example.com/STAC"),
            StacCatalog::Custom("https://Example.com/STAC".into())
        );
        assert!(StacCatalog::PlanetaryComputer.needs_signing());
        assert!(!StacCatalog::EarthSearch.needs_signing());
    }

    #[test]
    fn query_validation() {
        assert!(query(1).validate().is_ok());
        assert!(matches!(query(0).validate(), Err(CloudError::InvalidQuery(_))));
        let mut q = query(1);
        q.collection = "  ".into();
        assert!(matches!(q.validate(), Err(CloudError::InvalidQuery(_))));
        let mut q = query(1);
        q.bbox = BBox::new(f64::NAN, 0.0, 1.0, 1.0);
        assert!(matches!(q.validate(), Err(CloudError::InvalidQuery(_))));
    }

    #[test]
    fn query_body() {
        let q = query(12).with_datetime("2024-01-01/2024-12-31");
        let body = serde_json::to_value(q.to_search_params()).unwrap();
        assert_eq!(body["collections"], serde_json::json!(["nasadem"]));
        assert_eq!(body["bbox"], serde_json::json!([10.0, 45.0, 10.5, 45.25]));
        assert_eq!(body["datetime"], "2024-01-01/2024-12-31");
        assert_eq!(body["limit"], 12);
        assert_eq!(body["sortby"][0]["direction"], "desc");

        let geom = serde_json::json!({"type": "Polygon", "coordinates": []});
        let body = serde_json::to_value(query(1).with_intersects(geom).to_search_params()).unwrap();
        assert!(body.get("bbox").is_none());
        assert!(body.get("datetime").is_none());
        assert_eq!(body["intersects"]["type"], "Polygon");
    }

    #[tokio::test]
    async fn results_are_truncated_to_limit() {
        let items: Vec<_> = (0..3)
            .map(|i| serde_json::json!({"id": format!("item-{i}"), "properties": {}, "assets": {}}))
            .collect();
        let body = serde_json::json!({"type": "FeatureCollection", "features": items}).to_string();
        let url = one_shot_server(Some(http_response("200 OK", &body))).await;

        let found = client(url, Duration::from_secs(5)).search(&query(2)).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, "item-0");
    }

    #[tokio::test]
    async fn empty_feature_list_is_not_an_error() {
        let body = r#"{"type": "FeatureCollection", "features": []}"#;
        let url = one_shot_server(Some(http_response("200 OK", body))).await;
        let found = client(url, Duration::from_secs(5)).search(&query(1)).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn server_error_is_query_failure() {
        let url = one_shot_server(Some(http_response("500 Internal Server Error", "{}"))).await;
        match client(url, Duration::from_secs(5)).search(&query(1)).await {
            Err(CloudError::CatalogQueryFailed { collection, reason }) => {
                assert_eq!(collection, "nasadem");
                assert!(reason.contains("500"), "{reason}");
            }
            other => panic!("expected CatalogQueryFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbage_body_is_query_failure() {
        let url = one_shot_server(Some(http_response("200 OK", "not json"))).await;
        assert!(matches!(
            client(url, Duration::from_secs(5)).search(&query(1)).await,
            Err(CloudError::CatalogQueryFailed { .. })
        ));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let url = one_shot_server(None).await;
        match client(url, Duration::from_millis(200)).search(&query(1)).await {
            Err(CloudError::CatalogTimeout { collection }) => assert_eq!(collection, "nasadem"),
            other => panic!("expected CatalogTimeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_query_never_hits_the_network() {
        let c = client("http://127.0.0.1:9".into(), Duration::from_millis(200));
        assert!(matches!(c.search(&query(0)).await, Err(CloudError::InvalidQuery(_))));
    }
}
