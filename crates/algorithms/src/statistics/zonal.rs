//! Continuous zonal statistics
//!
//! Reduces every non-missing cell of a (polygon-clipped) raster to a single
//! summary. Missing means `NaN` or equal to the raster's no-data value.

use geocontext_core::raster::Raster;

/// Summary of the valid cells of one zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContinuousSummary {
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

/// Summarize a stream of values, skipping `NaN`.
///
/// Returns `None` when no finite value remains.
pub fn summarize<I>(values: I) -> Option<ContinuousSummary>
where
    I: IntoIterator<Item = f64>,
{
    let vals: Vec<f64> = values.into_iter().filter(|v| !v.is_nan()).collect();
    if vals.is_empty() {
        return None;
    }

    let count = vals.len();
    let mean = vals.iter().sum::<f64>() / count as f64;
    let var = vals.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / count as f64;
    let (min, max) = vals
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    Some(ContinuousSummary {
        count,
        mean,
        std_dev: var.sqrt(),
        min,
        max,
    })
}

/// Summary of every non-missing cell of `raster`.
pub fn continuous_stats(raster: &Raster) -> Option<ContinuousSummary> {
    summarize(
        raster
            .data()
            .iter()
            .copied()
            .filter(|&v| !raster.is_missing(v)),
    )
}
