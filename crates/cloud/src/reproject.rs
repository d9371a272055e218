//! Pure-Rust projections between WGS84 and the grids our collections use.
//!
//! - EPSG:4326 geographic (identity)
//! - EPSG:3857 Web Mercator (spherical)
//! - EPSG:326xx / 327xx UTM North/South (Snyder 1987, USGS Prof. Paper 1395)
//! - MODIS sinusoidal, sphere radius 6371007.181 m
//!
//! No libproj; everything here is closed-form.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use geo_types::{Coord, LineString, Polygon};
use geocontext_core::{BBox, CRS};

use crate::error::{CloudError, Result};

// ── WGS84 ellipsoid constants ────────────────────────────────────────────

const A: f64 = 6_378_137.0;
const F: f64 = 1.0 / 298.257_223_563;
const E2: f64 = 2.0 * F - F * F;
const E_PRIME2: f64 = E2 / (1.0 - E2);
const K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Latitude limit of the Web Mercator square.
const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// Sphere radius of the MODIS land grid.
pub const MODIS_SPHERE_RADIUS: f64 = 6_371_007.181;

/// Vertices inserted per bbox edge when projecting envelopes.
const EDGE_SAMPLES: usize = 16;

/// A supported map projection, parameterised.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Geographic,
    WebMercator,
    Utm { zone: u32, north: bool },
    Sinusoidal { radius: f64 },
}

impl Projection {
    pub fn from_epsg(epsg: u32) -> Result<Self> {
        if epsg == 4326 {
            return Ok(Self::Geographic);
        }
        if matches!(epsg, 3857 | 3785 | 900913) {
            return Ok(Self::WebMercator);
        }
        parse_utm_epsg(epsg)
            .map(|(zone, north)| Self::Utm { zone, north })
            .ok_or_else(|| CloudError::UnsupportedProjection(format!("EPSG:{epsg}")))
    }

    pub fn from_crs(crs: &CRS) -> Result<Self> {
        if let Some(code) = crs.epsg() {
            return Self::from_epsg(code);
        }
        if crs.is_sinusoidal() {
            return Ok(Self::Sinusoidal {
                radius: MODIS_SPHERE_RADIUS,
            });
        }
        Err(CloudError::UnsupportedProjection(crs.identifier()))
    }

    pub fn is_geographic(&self) -> bool {
        matches!(self, Self::Geographic)
    }

    /// WGS84 (lon, lat) in degrees → projected (x, y).
    pub fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        match *self {
            Self::Geographic => (lon, lat),
            Self::WebMercator => {
                let lat = lat.clamp(-MERCATOR_MAX_LAT, MERCATOR_MAX_LAT).to_radians();
                (A * lon.to_radians(), A * (FRAC_PI_4 + lat / 2.0).tan().ln())
            }
            Self::Utm { zone, north } => wgs84_to_utm(lon, lat, zone, north),
            Self::Sinusoidal { radius } => {
                let phi = lat.to_radians();
                (radius * lon.to_radians() * phi.cos(), radius * phi)
            }
        }
    }

    /// Projected (x, y) → WGS84 (lon, lat) in degrees.
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        match *self {
            Self::Geographic => (x, y),
            Self::WebMercator => {
                let lat = 2.0 * (y / A).exp().atan() - FRAC_PI_2;
                ((x / A).to_degrees(), lat.to_degrees())
            }
            Self::Utm { zone, north } => utm_to_wgs84(x, y, zone, north),
            Self::Sinusoidal { radius } => {
                let phi = y / radius;
                let cos_phi = phi.cos();
                let lambda = if cos_phi.abs() < 1e-12 { 0.0 } else { x / (radius * cos_phi) };
                (lambda.to_degrees(), phi.to_degrees())
            }
        }
    }
}

/// Envelope of a WGS84 bbox in `proj`, with each edge densified so curved
/// edges (sinusoidal meridians, UTM far from the central meridian) stay
/// inside the result.
pub fn project_bbox(bbox: &BBox, proj: &Projection) -> BBox {
    if proj.is_geographic() {
        return *bbox;
    }
    let n = EDGE_SAMPLES;
    let mut points = Vec::with_capacity(4 * (n + 1));
    for i in 0..=n {
        let t = i as f64 / n as f64;
        let x = bbox.min_x + t * bbox.width();
        let y = bbox.min_y + t * bbox.height();
        points.push((x, bbox.min_y));
        points.push((x, bbox.max_y));
        points.push((bbox.min_x, y));
        points.push((bbox.max_x, y));
    }
    BBox::envelope(points.into_iter().map(|(lon, lat)| proj.forward(lon, lat))).unwrap_or(*bbox)
}

/// Envelope in WGS84 of a bbox expressed in `proj`.
pub fn unproject_bbox(bbox: &BBox, proj: &Projection) -> BBox {
    if proj.is_geographic() {
        return *bbox;
    }
    let n = EDGE_SAMPLES;
    let mut points = Vec::with_capacity(4 * (n + 1));
    for i in 0..=n {
        let t = i as f64 / n as f64;
        let x = bbox.min_x + t * bbox.width();
        let y = bbox.min_y + t * bbox.height();
        points.extend([(x, bbox.min_y), (x, bbox.max_y), (bbox.min_x, y), (bbox.max_x, y)]);
    }
    BBox::envelope(points.into_iter().map(|(x, y)| proj.inverse(x, y))).unwrap_or(*bbox)
}

/// Project every vertex of a WGS84 polygon, holes included.
///
/// Edges are not densified; at the polygon sizes we handle the straight-line
/// error is well under a pixel.
pub fn project_polygon(polygon: &Polygon<f64>, proj: &Projection) -> Polygon<f64> {
    let ring = |ls: &LineString<f64>| {
        LineString::new(
            ls.0.iter()
                .map(|c| {
                    let (x, y) = proj.forward(c.x, c.y);
                    Coord { x, y }
                })
                .collect(),
        )
    };
    Polygon::new(
        ring(polygon.exterior()),
        polygon.interiors().iter().map(ring).collect(),
    )
}

/// Parse an EPSG code into UTM zone info: `Some((zone, is_north))`.
///
/// - EPSG 326xx → zone xx, North hemisphere
/// - EPSG 327xx → zone xx, South hemisphere
pub fn parse_utm_epsg(epsg: u32) -> Option<(u32, bool)> {
    match epsg {
        32601..=32660 => Some((epsg - 32600, true)),
        32701..=32760 => Some((epsg - 32700, false)),
        _ => None,
    }
}

fn central_meridian(zone: u32) -> f64 {
    ((zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians()
}

// ── Transverse Mercator (Snyder pp. 61-64) ──────────────────────────────

fn wgs84_to_utm(lon_deg: f64, lat_deg: f64, zone: u32, north: bool) -> (f64, f64) {
    let lat = lat_deg.to_radians();
    let (sin_lat, cos_lat, tan_lat) = (lat.sin(), lat.cos(), lat.tan());

    let n = A / (1.0 - E2 * sin_lat * sin_lat).sqrt();
    let t = tan_lat * tan_lat;
    let c = E_PRIME2 * cos_lat * cos_lat;
    let a = cos_lat * (lon_deg.to_radians() - central_meridian(zone));
    let (a2, a3) = (a * a, a * a * a);
    let (a4, a5, a6) = (a2 * a2, a2 * a3, a3 * a3);

    // eq. 8-9
    let easting = FALSE_EASTING
        + K0 * n
            * (a + (1.0 - t + c) * a3 / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * E_PRIME2) * a5 / 120.0);

    // eq. 8-10
    let northing = K0
        * (meridional_arc(lat)
            + n * tan_lat
                * (a2 / 2.0
                    + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                    + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * E_PRIME2) * a6 / 720.0));

    (easting, if north { northing } else { northing + FALSE_NORTHING_SOUTH })
}

fn utm_to_wgs84(easting: f64, northing: f64, zone: u32, north: bool) -> (f64, f64) {
    let y = if north { northing } else { northing - FALSE_NORTHING_SOUTH };
    let (e4, e6) = (E2 * E2, E2 * E2 * E2);

    // Footpoint latitude, eqs. 7-19 and 3-26
    let m = y / K0;
    let mu = m / (A * (1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));
    let e1 = (1.0 - (1.0 - E2).sqrt()) / (1.0 + (1.0 - E2).sqrt());
    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let (sin1, cos1, tan1) = (phi1.sin(), phi1.cos(), phi1.tan());
    let c1 = E_PRIME2 * cos1 * cos1;
    let t1 = tan1 * tan1;
    let w = 1.0 - E2 * sin1 * sin1;
    let n1 = A / w.sqrt();
    let r1 = A * (1.0 - E2) / w.powf(1.5);
    let d = (easting - FALSE_EASTING) / (n1 * K0);
    let (d2, d3) = (d * d, d * d * d);
    let (d4, d5, d6) = (d2 * d2, d2 * d3, d3 * d3);

    // eq. 8-17
    let k4 = 5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * E_PRIME2;
    let k6 = 61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * E_PRIME2 - 3.0 * c1 * c1;
    let lat = phi1 - (n1 * tan1 / r1) * (d2 / 2.0 - k4 * d4 / 24.0 + k6 * d6 / 720.0);
    // eq. 8-18
    let k5 = 5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * E_PRIME2 + 24.0 * t1 * t1;
    let lon =
        central_meridian(zone) + (d - (1.0 + 2.0 * t1 + c1) * d3 / 6.0 + k5 * d5 / 120.0) / cos1;

    (lon.to_degrees(), lat.to_degrees())
}

/// Meridional arc from equator to `lat` (radians), eq. 3-21.
fn meridional_arc(lat: f64) -> f64 {
    let (e4, e6) = (E2 * E2, E2 * E2 * E2);
    A * ((1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
        - (3.0 * E2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
}
