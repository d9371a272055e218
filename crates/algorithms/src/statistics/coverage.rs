//! Categorical coverage
//!
//! Share of each class code among the valid cells of a clipped raster.

use std::collections::BTreeMap;

use geocontext_core::raster::Raster;

/// Percentage of valid cells per class code, each rounded to 2 decimals.
///
/// Cell values are truncated to `i64` class codes. Missing cells are left
/// out of the denominator. Rounding is per class, so the percentages need not
/// add up to exactly 100. Empty when no cell is valid.
pub fn class_coverage(raster: &Raster) -> BTreeMap<i64, f64> {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    let mut total = 0usize;
    for &v in raster.data().iter() {
        if raster.is_missing(v) || !v.is_finite() {
            continue;
        }
        *counts.entry(v as i64).or_default() += 1;
        total += 1;
    }

    counts
        .into_iter()
        .map(|(class, n)| (class, round2(n as f64 / total as f64 * 100.0)))
        .collect()
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn shares_of_valid_cells() {
        // 2 x class 10, 1 x class 40, 1 nodata
        let raster = Raster::from_vec(vec![10.0, 10.0, 40.0, 0.0], 2, 2)
            .unwrap()
            .with_nodata(Some(0.0));
        let cov = class_coverage(&raster);
        assert_eq!(cov.len(), 2);
        assert_relative_eq!(cov[&10], 66.67);
        assert_relative_eq!(cov[&40], 33.33);
    }

    #[test]
    fn percentages_stay_in_range() {
        let data: Vec<f64> = (0..97).map(|i| f64::from(i % 7 * 10 + 10)).collect();
        let raster = Raster::from_vec(data, 1, 97).unwrap();
        let cov = class_coverage(&raster);
        assert_eq!(cov.len(), 7);
        assert!(cov.values().all(|p| (0.0..=100.0).contains(p)));
        let sum: f64 = cov.values().sum();
        assert!((99.0..=101.0).contains(&sum), "sum = {sum}");
    }

    #[test]
    fn no_valid_cells_is_empty() {
        let raster = Raster::filled(3, 3, f64::NAN);
        assert!(class_coverage(&raster).is_empty());
    }
}
