//! # GeoContext Pipeline
//!
//! Turns one area of interest into a [`ContextSummary`]: four independent
//! pipelines (elevation, land surface temperature, NDVI, land cover), each
//! searching the catalog, resolving assets and reducing pixels, merged into
//! one report. A failing pipeline yields an error entry for its source; it
//! never fails the request.
//!
//! [`ProgressStream`] runs the same aggregation and reports stage events
//! while it works.
//!
//! The `testing` feature exposes in-memory fakes of the catalog, signer and
//! raster reader for use in tests.

pub mod aggregator;
pub mod config;
pub mod engines;
pub mod error;
pub mod progress;
pub mod result;
pub mod sources;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod time_window;

pub use aggregator::{ContextAggregator, ExecutionMode, NoProgress, ProgressObserver};
pub use config::ContextConfig;
pub use engines::{
    compute_annual_composite, compute_continuous_stats, compute_coverage, CompositeSpec,
    OutputKeys, Reduction, DEFAULT_MAX_GRID_CELLS,
};
pub use error::{ConfigError, RequestError, Result};
pub use progress::{ProgressEvent, ProgressStream, Stage};
pub use result::{ContextSummary, SourceResult};
pub use sources::{Engine, Source, SourceSpec};
pub use time_window::{Clock, FixedClock, SystemClock, TimeWindow};
