//! Coordinate Reference System identity
//!
//! A `CRS` only names a reference system. The actual coordinate math lives in
//! `geocontext_cloud::reproject`, which maps a `CRS` onto a supported
//! projection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// PROJ definition of the MODIS sinusoidal grid (sphere radius 6371007.181 m).
pub const MODIS_SINUSOIDAL_PROJ: &str =
    "+proj=sinu +lon_0=0 +x_0=0 +y_0=0 +R=6371007.181 +units=m +no_defs";

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    /// EPSG code if known
    epsg: Option<u32>,
    /// PROJ string for systems without an EPSG code
    proj: Option<String>,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            epsg: Some(code),
            proj: None,
        }
    }

    /// Create a CRS from a PROJ string
    pub fn from_proj(proj: impl Into<String>) -> Self {
        Self {
            epsg: None,
            proj: Some(proj.into()),
        }
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// Web Mercator (EPSG:3857)
    pub fn web_mercator() -> Self {
        Self::from_epsg(3857)
    }

    /// The sinusoidal grid used by MODIS land products.
    pub fn modis_sinusoidal() -> Self {
        Self::from_proj(MODIS_SINUSOIDAL_PROJ)
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Get PROJ string
    pub fn proj(&self) -> Option<&str> {
        self.proj.as_deref()
    }

    /// Whether this is a sinusoidal projection.
    pub fn is_sinusoidal(&self) -> bool {
        self.proj
            .as_deref()
            .map(|p| p.contains("+proj=sinu"))
            .unwrap_or(false)
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(proj) = &self.proj {
            return proj.clone();
        }
        "Unknown".to_string()
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

impl Default for CRS {
    fn default() -> Self {
        Self::wgs84()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crs_epsg() {
        let crs = CRS::from_epsg(4326);
        assert_eq!(crs.epsg(), Some(4326));
        assert_eq!(crs.identifier(), "EPSG:4326");
    }

    #[test]
    fn sinusoidal_detection() {
        assert!(CRS::modis_sinusoidal().is_sinusoidal());
        assert!(!CRS::web_mercator().is_sinusoidal());
    }
}
