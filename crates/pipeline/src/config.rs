//! Configuration file handling.
//!
//! Loads a `geocontext.toml`. Every section and field is optional; missing
//! values fall back to the built-in Planetary Computer setup.

use std::path::Path;
use std::time::Duration;

use geocontext_cloud::CogReaderOptions;
use serde::{Deserialize, Serialize};

use crate::aggregator::ExecutionMode;
use crate::engines::CompositeSpec;
use crate::error::ConfigError;
use crate::sources::{Engine, Source, SourceSpec};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextConfig {
    /// STAC catalog settings.
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Remote raster reader settings.
    #[serde(default)]
    pub raster: RasterConfig,

    /// Pipeline scheduling.
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Per-source overrides of collection, asset and composite parameters.
    #[serde(default)]
    pub sources: SourcesConfig,
}

impl ContextConfig {
    /// Load and validate a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no pipeline could run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.catalog.timeout_secs == 0 {
            return Err(ConfigError::Invalid("catalog.timeout_secs must be positive".into()));
        }
        if self.raster.request_timeout_secs == 0 || self.raster.read_timeout_secs == 0 {
            return Err(ConfigError::Invalid("raster timeouts must be positive".into()));
        }
        if self.raster.block_size < 512 {
            return Err(ConfigError::Invalid("raster.block_size must be at least 512 bytes".into()));
        }
        for source in Source::ALL {
            let spec = self.sources.spec(source);
            if spec.limit == 0 {
                let reason = format!("sources.{source}.limit must be at least 1");
                return Err(ConfigError::Invalid(reason));
            }
            if let Engine::Composite(c) = &spec.engine {
                if !(c.resolution.is_finite() && c.resolution > 0.0) {
                    let reason = format!("sources.{source}.resolution must be positive");
                    return Err(ConfigError::Invalid(reason));
                }
                if c.max_grid_cells == 0 {
                    let reason = format!("sources.{source}.max_grid_cells must be at least 1");
                    return Err(ConfigError::Invalid(reason));
                }
            }
        }
        Ok(())
    }
}

/// STAC catalog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// `pc`, `es`, or a STAC API URL.
    #[serde(default = "default_catalog_url")]
    pub url: String,

    /// Search and signing request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Sign asset hrefs through Planetary Computer. Unset: only for the
    /// Planetary Computer catalog.
    #[serde(default)]
    pub sign_assets: Option<bool>,

    /// Search with the polygon (`intersects`) rather than its bounding box.
    #[serde(default)]
    pub search_by_geometry: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: default_catalog_url(),
            timeout_secs: default_timeout(),
            sign_assets: None,
            search_by_geometry: false,
        }
    }
}

impl CatalogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_catalog_url() -> String {
    "pc".to_string()
}

fn default_timeout() -> u64 {
    60
}

/// Remote raster reader settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterConfig {
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,

    /// Whole-window read budget, decode included.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    #[serde(default = "default_block_size")]
    pub block_size: u64,

    #[serde(default = "default_cache_blocks")]
    pub cache_blocks: usize,

    #[serde(default = "default_max_fetches")]
    pub max_concurrent_fetches: usize,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_timeout(),
            read_timeout_secs: default_read_timeout(),
            block_size: default_block_size(),
            cache_blocks: default_cache_blocks(),
            max_concurrent_fetches: default_max_fetches(),
        }
    }
}

impl RasterConfig {
    pub fn reader_options(&self) -> CogReaderOptions {
        CogReaderOptions {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            block_size: self.block_size,
            cache_blocks: self.cache_blocks,
            max_concurrent_fetches: self.max_concurrent_fetches,
        }
    }
}

fn default_read_timeout() -> u64 {
    300
}

fn default_block_size() -> u64 {
    64 * 1024
}

fn default_cache_blocks() -> usize {
    256
}

fn default_max_fetches() -> usize {
    8
}

/// Pipeline scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub mode: ExecutionMode,

    /// Capacity of the progress event channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_channel_capacity() -> usize {
    16
}

/// One override table per source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub dem: SourceOverride,
    #[serde(default)]
    pub temperature: SourceOverride,
    #[serde(default)]
    pub ndvi: SourceOverride,
    #[serde(default)]
    pub landcover: SourceOverride,
}

impl SourcesConfig {
    pub fn get(&self, source: Source) -> &SourceOverride {
        match source {
            Source::Dem => &self.dem,
            Source::Temperature => &self.temperature,
            Source::Ndvi => &self.ndvi,
            Source::Landcover => &self.landcover,
        }
    }

    /// The source's built-in spec with this file's overrides applied.
    pub fn spec(&self, source: Source) -> SourceSpec {
        self.get(source).apply(source.default_spec())
    }
}

/// Fields left unset keep the source's built-in value. Composite fields are
/// ignored for single-scene sources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceOverride {
    pub collection: Option<String>,
    pub asset: Option<String>,
    pub limit: Option<u32>,
    pub target_epsg: Option<u32>,
    pub resolution: Option<f64>,
    pub unit_offset: Option<f64>,
    pub invalid_raw: Option<f64>,
    pub max_grid_cells: Option<usize>,
}

impl SourceOverride {
    pub fn apply(&self, mut spec: SourceSpec) -> SourceSpec {
        if let Some(collection) = &self.collection {
            spec.collection = collection.clone();
        }
        if let Some(asset) = &self.asset {
            spec.asset = asset.clone();
        }
        if let Some(limit) = self.limit {
            spec.limit = limit;
        }
        if let Engine::Composite(composite) = &mut spec.engine {
            self.apply_composite(composite, &spec.asset);
        }
        spec
    }

    fn apply_composite(&self, composite: &mut CompositeSpec, asset: &str) {
        composite.band = asset.to_string();
        if let Some(epsg) = self.target_epsg {
            composite.target_epsg = epsg;
        }
        if let Some(resolution) = self.resolution {
            composite.resolution = resolution;
        }
        if let Some(offset) = self.unit_offset {
            composite.unit_offset = offset;
        }
        if let Some(raw) = self.invalid_raw {
            composite.invalid_raw = Some(raw);
        }
        if let Some(cells) = self.max_grid_cells {
            composite.max_grid_cells = cells;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_gives_defaults() {
        let config: ContextConfig = toml::from_str("").unwrap();
        assert_eq!(config.catalog.url, "pc");
        assert_eq!(config.catalog.timeout_secs, 60);
        assert_eq!(config.raster.read_timeout_secs, 300);
        assert_eq!(config.raster.block_size, 65536);
        assert_eq!(config.execution.mode, ExecutionMode::Concurrent);
        assert_eq!(config.execution.channel_capacity, 16);
        assert!(!config.catalog.search_by_geometry);
        assert_eq!(config.sources.spec(Source::Dem), Source::Dem.default_spec());
        config.validate().unwrap();
    }

    #[test]
    fn partial_source_override_keeps_other_fields() {
        let config: ContextConfig = toml::from_str(
            r#"
            [execution]
            mode = "sequential"

            [sources.temperature]
            limit = 46
            resolution = 2000.0
            max_grid_cells = 10_000_000
            "#,
        )
        .unwrap();
        assert_eq!(config.execution.mode, ExecutionMode::Sequential);

        let spec = config.sources.spec(Source::Temperature);
        assert_eq!(spec.collection, "modis-11A2-061");
        assert_eq!(spec.limit, 46);
        let Engine::Composite(c) = spec.engine else {
            panic!("temperature is a composite");
        };
        assert_eq!(c.resolution, 2000.0);
        assert_eq!(c.target_epsg, 3857);
        assert_eq!(c.unit_offset, -273.15);
        assert_eq!(c.band, "LST_Day_1km");
        assert_eq!(c.max_grid_cells, 10_000_000);
    }

    #[test]
    fn asset_override_renames_composite_band() {
        let config: ContextConfig = toml::from_str(
            r#"
            [sources.ndvi]
            collection = "modis-13Q1-061"
            asset = "250m_16_days_NDVI"
            resolution = 250.0
            "#,
        )
        .unwrap();
        let spec = config.sources.spec(Source::Ndvi);
        assert_eq!(spec.asset, "250m_16_days_NDVI");
        let Engine::Composite(c) = spec.engine else {
            panic!("ndvi is a composite");
        };
        assert_eq!(c.band, "250m_16_days_NDVI");
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[catalog]\nurl = \"es\"\nsign_assets = false\nsearch_by_geometry = true\n\n\
             [raster]\ncache_blocks = 32"
        )
        .unwrap();

        let config = ContextConfig::from_file(file.path()).unwrap();
        assert_eq!(config.catalog.url, "es");
        assert_eq!(config.catalog.sign_assets, Some(false));
        assert!(config.catalog.search_by_geometry);
        assert_eq!(config.raster.cache_blocks, 32);
        assert_eq!(config.raster.reader_options().cache_blocks, 32);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[sources.dem]\nlimit = 0").unwrap();
        assert!(matches!(ContextConfig::from_file(file.path()), Err(ConfigError::Invalid(_))));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[sources.ndvi]\nmax_grid_cells = 0").unwrap();
        assert!(matches!(ContextConfig::from_file(file.path()), Err(ConfigError::Invalid(_))));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[catalog\nurl = ").unwrap();
        assert!(matches!(ContextConfig::from_file(file.path()), Err(ConfigError::Parse { .. })));

        assert!(matches!(
            ContextConfig::from_file(Path::new("/nonexistent/geocontext.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
