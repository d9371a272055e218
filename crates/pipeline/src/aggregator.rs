//! The context aggregator: one request, four pipelines, one summary.
//!
//! Each pipeline searches its collection, resolves the newest asset (or every
//! asset, for composites) and runs its engine. Failures stop at the pipeline
//! boundary as [`SourceResult::Error`]; only request-level problems (an
//! unbuildable catalog query) are returned as `Err`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use geocontext_cloud::{
    resolve_asset, AssetSigner, Catalog, CatalogQuery, CloudError, CogRasterReader, FetchHandle,
    PassthroughSigner, PlanetaryComputerSigner, RasterAccess, StacCatalog, StacClient,
    StacClientOptions, StacItem,
};
use geocontext_core::AreaOfInterest;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::config::ContextConfig;
use crate::engines::{compute_annual_composite, compute_continuous_stats, compute_coverage};
use crate::error::{RequestError, Result};
use crate::result::{ContextSummary, SourceResult};
use crate::sources::{Engine, Source, SourceSpec};
use crate::time_window::{Clock, SystemClock, TimeWindow};

/// How the four pipelines of a request are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// All four at once; the request takes as long as the slowest.
    #[default]
    Concurrent,
    /// One after the other, in report order.
    Sequential,
}

/// Notified right before each source's pipeline starts.
#[async_trait]
pub trait ProgressObserver: Send + Sync {
    async fn searching(&self, source: Source);
}

/// Observer that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

#[async_trait]
impl ProgressObserver for NoProgress {
    async fn searching(&self, _source: Source) {}
}

/// A source ready to run: its spec and its validated catalog query.
struct Plan {
    source: Source,
    spec: SourceSpec,
    query: CatalogQuery,
}

/// Runs the context pipelines for an area of interest.
pub struct ContextAggregator {
    catalog: Arc<dyn Catalog>,
    signer: Arc<dyn AssetSigner>,
    raster: Arc<dyn RasterAccess>,
    specs: HashMap<Source, SourceSpec>,
    clock: Arc<dyn Clock>,
    mode: ExecutionMode,
    search_by_geometry: bool,
}

impl ContextAggregator {
    /// Aggregator with the built-in source settings, system clock and
    /// concurrent execution.
    pub fn new(
        catalog: Arc<dyn Catalog>,
        signer: Arc<dyn AssetSigner>,
        raster: Arc<dyn RasterAccess>,
    ) -> Self {
        Self {
            catalog,
            signer,
            raster,
            specs: Source::ALL.iter().map(|&s| (s, s.default_spec())).collect(),
            clock: Arc::new(SystemClock),
            mode: ExecutionMode::default(),
            search_by_geometry: false,
        }
    }

    /// Wire up the real catalog client, signer and COG reader.
    pub fn from_config(config: &ContextConfig) -> std::result::Result<Self, CloudError> {
        let catalog = StacCatalog::from_str_or_url(&config.catalog.url);
        let sign = config.catalog.sign_assets.unwrap_or_else(|| catalog.needs_signing());

        let signer: Arc<dyn AssetSigner> = if sign {
            Arc::new(PlanetaryComputerSigner::new(config.catalog.timeout())?)
        } else {
            Arc::new(PassthroughSigner)
        };
        let client = StacClient::new(
            catalog,
            StacClientOptions {
                request_timeout: config.catalog.timeout(),
            },
        )?;
        let reader = CogRasterReader::new(config.raster.reader_options())?;

        let mut aggregator = Self::new(Arc::new(client), signer, Arc::new(reader))
            .with_mode(config.execution.mode)
            .with_geometry_search(config.catalog.search_by_geometry);
        for source in Source::ALL {
            aggregator = aggregator.with_source(source, config.sources.spec(source));
        }
        Ok(aggregator)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Filter catalog searches by the polygon itself (`intersects`) instead
    /// of its bounding box.
    pub fn with_geometry_search(mut self, enabled: bool) -> Self {
        self.search_by_geometry = enabled;
        self
    }

    /// Replace the settings of one source.
    pub fn with_source(mut self, source: Source, spec: SourceSpec) -> Self {
        self.specs.insert(source, spec);
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn spec(&self, source: Source) -> SourceSpec {
        self.specs
            .get(&source)
            .cloned()
            .unwrap_or_else(|| source.default_spec())
    }

    /// Build the context summary for `aoi`.
    pub async fn generate(&self, aoi: &AreaOfInterest) -> Result<ContextSummary> {
        self.generate_observed(aoi, &NoProgress).await
    }

    /// Like [`generate`](Self::generate), notifying `observer` as each
    /// pipeline is about to start, in report order.
    pub async fn generate_observed(
        &self,
        aoi: &AreaOfInterest,
        observer: &dyn ProgressObserver,
    ) -> Result<ContextSummary> {
        let window = TimeWindow::from_clock(self.clock.as_ref());
        let plans = self.plan(aoi, &window)?;
        info!(
            bbox = ?aoi.bounds().to_array(),
            window = %window,
            mode = ?self.mode,
            "generating context"
        );

        let results = match self.mode {
            ExecutionMode::Concurrent => {
                for plan in &plans {
                    observer.searching(plan.source).await;
                }
                join_all(plans.iter().map(|plan| self.run_source(plan, aoi))).await
            }
            ExecutionMode::Sequential => {
                let mut results = Vec::with_capacity(plans.len());
                for plan in &plans {
                    observer.searching(plan.source).await;
                    results.push(self.run_source(plan, aoi).await);
                }
                results
            }
        };

        Ok(ContextSummary::from_results(results))
    }

    /// Catalog queries for every source, validated up front so a bad request
    /// fails before any network traffic.
    fn plan(&self, aoi: &AreaOfInterest, window: &TimeWindow) -> Result<Vec<Plan>> {
        Source::ALL
            .iter()
            .map(|&source| {
                let spec = self.spec(source);
                let mut query =
                    CatalogQuery::new(spec.collection.clone(), aoi.bounds(), spec.limit);
                if spec.time_filtered {
                    query = query.with_datetime(window.to_catalog_string());
                }
                if self.search_by_geometry {
                    query = query.with_intersects(aoi.geometry().clone());
                }
                query.validate().map_err(|e| RequestError::InvalidQuery {
                    source_key: source.key().to_string(),
                    reason: e.to_string(),
                })?;
                Ok(Plan { source, spec, query })
            })
            .collect()
    }

    #[instrument(skip_all, fields(source = %plan.source, collection = %plan.spec.collection))]
    async fn run_source(&self, plan: &Plan, aoi: &AreaOfInterest) -> (Source, SourceResult) {
        let result = self.run_engine(&plan.spec, &plan.query, aoi).await;
        match &result {
            SourceResult::Error { message } => warn!(error = %message, "source failed"),
            other => info!(outcome = other.outcome(), "source done"),
        }
        (plan.source, result)
    }

    async fn run_engine(
        &self,
        spec: &SourceSpec,
        query: &CatalogQuery,
        aoi: &AreaOfInterest,
    ) -> SourceResult {
        let items = match self.catalog.search(query).await {
            Ok(items) => items,
            Err(e) => return SourceResult::error(e.to_string()),
        };
        info!(items = items.len(), "catalog search");
        let Some(newest) = items.first() else {
            return SourceResult::Empty;
        };

        let raster = self.raster.as_ref();
        match &spec.engine {
            Engine::Composite(composite) => {
                let signer = self.signer.as_ref();
                compute_annual_composite(raster, signer, &items, composite, &aoi.bounds()).await
            }
            Engine::ContinuousStats => match self.resolve(newest, &spec.asset).await {
                Ok(handle) => compute_continuous_stats(raster, &handle, aoi).await,
                Err(failed) => failed,
            },
            Engine::Coverage => match self.resolve(newest, &spec.asset).await {
                Ok(handle) => compute_coverage(raster, &handle, aoi).await,
                Err(failed) => failed,
            },
        }
    }

    /// Sign `asset` of `item`; a failure is already the source's result.
    async fn resolve(
        &self,
        item: &StacItem,
        asset: &str,
    ) -> std::result::Result<FetchHandle, SourceResult> {
        match resolve_asset(self.signer.as_ref(), item, asset).await {
            Ok(handle) => {
                info!(item = %item.id, host = handle.host(), "asset resolved");
                Ok(handle)
            }
            Err(e) => Err(SourceResult::error(e.to_string())),
        }
    }
}
