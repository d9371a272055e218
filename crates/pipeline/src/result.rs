//! Per-source outcomes and the merged context report.

use std::collections::BTreeMap;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::sources::Source;

/// Outcome of one source's pipeline.
///
/// Serializes as the stats object, `{}` for no coverage, or
/// `{"error": "<message>"}`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SourceResult {
    Stats(BTreeMap<String, f64>),
    /// The catalog had nothing, or nothing valid was inside the area.
    #[default]
    Empty,
    Error {
        message: String,
    },
}

impl SourceResult {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn stats<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, f64)>,
    {
        Self::Stats(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Value of one statistic, if this is a stats result holding it.
    pub fn get(&self, key: &str) -> Option<f64> {
        match self {
            Self::Stats(map) => map.get(key).copied(),
            _ => None,
        }
    }

    /// Short label for logs.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Stats(_) => "stats",
            Self::Empty => "empty",
            Self::Error { .. } => "error",
        }
    }
}

impl Serialize for SourceResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Stats(map) => map.serialize(serializer),
            Self::Empty => serializer.serialize_map(Some(0))?.end(),
            Self::Error { message } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("error", message)?;
                map.end()
            }
        }
    }
}

/// The context report: always exactly these four entries.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ContextSummary {
    pub dem: SourceResult,
    pub temperature: SourceResult,
    pub ndvi: SourceResult,
    pub landcover: SourceResult,
}

impl ContextSummary {
    pub fn get(&self, source: Source) -> &SourceResult {
        match source {
            Source::Dem => &self.dem,
            Source::Temperature => &self.temperature,
            Source::Ndvi => &self.ndvi,
            Source::Landcover => &self.landcover,
        }
    }

    pub fn set(&mut self, source: Source, result: SourceResult) {
        match source {
            Source::Dem => self.dem = result,
            Source::Temperature => self.temperature = result,
            Source::Ndvi => self.ndvi = result,
            Source::Landcover => self.landcover = result,
        }
    }

    /// Build from `(source, result)` pairs in any order.
    pub fn from_results<I: IntoIterator<Item = (Source, SourceResult)>>(results: I) -> Self {
        let mut summary = Self::default();
        for (source, result) in results {
            summary.set(source, result);
        }
        summary
    }
}
