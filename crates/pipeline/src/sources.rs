//! The four context sources and their default catalog settings.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engines::{CompositeSpec, OutputKeys, Reduction, DEFAULT_MAX_GRID_CELLS};

/// One entry of the context report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Dem,
    Temperature,
    Ndvi,
    Landcover,
}

impl Source {
    /// Report order.
    pub const ALL: [Source; 4] = [
        Source::Dem,
        Source::Temperature,
        Source::Ndvi,
        Source::Landcover,
    ];

    /// Key of this source in the summary JSON.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Dem => "dem",
            Self::Temperature => "temperature",
            Self::Ndvi => "ndvi",
            Self::Landcover => "landcover",
        }
    }

    /// Built-in settings for the Planetary Computer collections.
    pub fn default_spec(&self) -> SourceSpec {
        match self {
            Self::Dem => SourceSpec {
                collection: "nasadem".into(),
                asset: "elevation".into(),
                limit: 1,
                time_filtered: false,
                engine: Engine::ContinuousStats,
            },
            Self::Temperature => SourceSpec {
                collection: "modis-11A2-061".into(),
                asset: "LST_Day_1km".into(),
                limit: 12,
                time_filtered: true,
                engine: Engine::Composite(CompositeSpec {
                    band: "LST_Day_1km".into(),
                    target_epsg: 3857,
                    resolution: 1000.0,
                    unit_offset: -273.15,
                    invalid_raw: Some(0.0),
                    reduction: Reduction::MeanMinMax,
                    keys: OutputKeys::new("annual_mean_C", "min_C", "max_C"),
                    max_grid_cells: DEFAULT_MAX_GRID_CELLS,
                }),
            },
            Self::Ndvi => SourceSpec {
                collection: "modis-13A1-061".into(),
                asset: "500m_16_days_NDVI".into(),
                limit: 12,
                time_filtered: true,
                engine: Engine::Composite(CompositeSpec {
                    band: "500m_16_days_NDVI".into(),
                    target_epsg: 3857,
                    resolution: 500.0,
                    unit_offset: 0.0,
                    invalid_raw: None,
                    reduction: Reduction::MeanOnly,
                    keys: OutputKeys::new("annual_mean", "min", "max"),
                    max_grid_cells: DEFAULT_MAX_GRID_CELLS,
                }),
            },
            Self::Landcover => SourceSpec {
                collection: "esa-worldcover".into(),
                asset: "map".into(),
                limit: 1,
                time_filtered: false,
                engine: Engine::Coverage,
            },
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// How the pixels of a source are reduced.
#[derive(Debug, Clone, PartialEq)]
pub enum Engine {
    /// mean/min/max/std of the newest item, clipped to the polygon
    ContinuousStats,
    /// class-code percentages of the newest item, clipped to the polygon
    Coverage,
    /// calibrated reduction over every item in the time window
    Composite(CompositeSpec),
}

/// Everything needed to run one source's pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSpec {
    pub collection: String,
    /// Asset key on each item.
    pub asset: String,
    pub limit: u32,
    /// Search within the request's time window rather than taking the newest item.
    pub time_filtered: bool,
    pub engine: Engine,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_in_report_order() {
        let keys: Vec<&str> = Source::ALL.iter().map(Source::key).collect();
        assert_eq!(keys, ["dem", "temperature", "ndvi", "landcover"]);
        assert_eq!(Source::Ndvi.to_string(), "ndvi");
    }

    #[test]
    fn default_collections() {
        let dem = Source::Dem.default_spec();
        assert_eq!(dem.collection, "nasadem");
        assert_eq!((dem.asset.as_str(), dem.limit), ("elevation", 1));
        assert!(!dem.time_filtered);

        let lst = Source::Temperature.default_spec();
        assert!(lst.time_filtered);
        match lst.engine {
            Engine::Composite(spec) => {
                assert_eq!(spec.target_epsg, 3857);
                assert_eq!(spec.resolution, 1000.0);
                assert_eq!(spec.invalid_raw, Some(0.0));
                assert_eq!(spec.max_grid_cells, DEFAULT_MAX_GRID_CELLS);
            }
            other => panic!("unexpected engine {other:?}"),
        }

        assert_eq!(Source::Landcover.default_spec().engine, Engine::Coverage);
    }
}
