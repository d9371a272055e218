//! # GeoContext Algorithms
//!
//! Pixel-level reductions behind the context report.
//!
//! ## Available Algorithm Categories
//!
//! - **vector**: polygon masks (pixel centre inside polygon, holes excluded)
//! - **statistics**: continuous summaries (mean/min/max/std) and categorical
//!   coverage percentages
//! - **temporal**: nearest-neighbour resampling onto a common grid and
//!   reduction of multi-scene cubes

pub mod statistics;
pub mod temporal;
pub mod vector;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::statistics::{class_coverage, continuous_stats, summarize, ContinuousSummary};
    pub use crate::temporal::{resample_nearest, Calibration, CompositeCube, TargetGrid};
    pub use crate::vector::{clip_to_polygon, polygon_mask};
    pub use geocontext_core::prelude::*;
}
