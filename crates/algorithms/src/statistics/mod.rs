//! Reductions of a clipped raster to summary values
//!
//! - **zonal**: continuous summary (count, mean, population std, min, max)
//! - **coverage**: categorical class-code percentages

pub mod coverage;
pub mod zonal;

pub use coverage::class_coverage;
pub use zonal::{continuous_stats, summarize, ContinuousSummary};
