//! Area-of-interest geometry and bounding boxes
//!
//! Requests carry a single GeoJSON polygon in WGS84 longitude/latitude.
//! Anything else (multi-part geometries, points, lines) is rejected up front
//! rather than silently reduced to its first part.

use geo_types::{Coord, LineString, Polygon};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// An axis-aligned bounding box `[min_x, min_y, max_x, max_y]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    /// Check if two bboxes intersect.
    pub fn intersects(&self, other: &BBox) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// All four coordinates are finite and min <= max on both axes.
    pub fn is_valid(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }

    /// Envelope of a set of points.
    pub fn envelope<I: IntoIterator<Item = (f64, f64)>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let (x0, y0) = iter.next()?;
        let mut bbox = Self::new(x0, y0, x0, y0);
        for (x, y) in iter {
            bbox.min_x = bbox.min_x.min(x);
            bbox.min_y = bbox.min_y.min(y);
            bbox.max_x = bbox.max_x.max(x);
            bbox.max_y = bbox.max_y.max(y);
        }
        Some(bbox)
    }
}

/// Min/max of x and y over a ring's coordinates.
///
/// Ring closure and winding order are not checked.
pub fn bounds_of_ring(ring: &[Coord<f64>]) -> Result<BBox> {
    BBox::envelope(ring.iter().map(|c| (c.x, c.y)))
        .ok_or_else(|| Error::MalformedGeometry("exterior ring is empty".into()))
}

/// The polygon a request asks about, in WGS84 lon/lat.
///
/// Holes are kept and excluded from pixel masks; the bounding box is derived
/// once, from the exterior ring.
#[derive(Debug, Clone)]
pub struct AreaOfInterest {
    polygon: Polygon<f64>,
    bounds: BBox,
    geometry: Value,
}

impl AreaOfInterest {
    /// Wrap an existing polygon.
    pub fn new(polygon: Polygon<f64>) -> Result<Self> {
        let bounds = bounds_of_ring(&polygon.exterior().0)?;
        let geometry = polygon_to_geojson(&polygon);
        Ok(Self {
            polygon,
            bounds,
            geometry,
        })
    }

    /// Parse a GeoJSON `Feature`, a `{"geometry": ...}` wrapper, or a bare
    /// `Polygon` geometry object.
    pub fn from_geojson(value: &Value) -> Result<Self> {
        let geometry = value.get("geometry").unwrap_or(value);

        let kind = geometry
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::MalformedGeometry("geometry has no 'type' member".into()))?;
        if kind != "Polygon" {
            return Err(Error::UnsupportedGeometry(kind.to_string()));
        }

        let rings = geometry
            .get("coordinates")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                Error::MalformedGeometry("'coordinates' must be an array of rings".into())
            })?;

        let mut parsed = rings
            .iter()
            .enumerate()
            .map(|(i, ring)| parse_ring(i, ring))
            .collect::<Result<Vec<_>>>()?;

        if parsed.is_empty() {
            return Err(Error::MalformedGeometry("polygon has no exterior ring".into()));
        }
        let exterior = parsed.remove(0);
        if exterior.0.is_empty() {
            return Err(Error::MalformedGeometry("exterior ring is empty".into()));
        }

        let bounds = bounds_of_ring(&exterior.0)?;
        Ok(Self {
            polygon: Polygon::new(exterior, parsed),
            bounds,
            geometry: geometry.clone(),
        })
    }

    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    /// Bounding box of the exterior ring.
    pub fn bounds(&self) -> BBox {
        self.bounds
    }

    /// The geometry as a GeoJSON object, suitable for STAC `intersects`.
    pub fn geometry(&self) -> &Value {
        &self.geometry
    }
}

fn parse_ring(index: usize, ring: &Value) -> Result<LineString<f64>> {
    let positions = ring
        .as_array()
        .ok_or_else(|| Error::MalformedGeometry(format!("ring {index} is not an array")))?;

    positions
        .iter()
        .map(|p| parse_position(index, p))
        .collect::<Result<Vec<_>>>()
        .map(LineString::new)
}

fn parse_position(ring: usize, position: &Value) -> Result<Coord<f64>> {
    let bad = || {
        Error::MalformedGeometry(format!(
            "ring {ring}: position {position} is not a numeric [x, y] pair"
        ))
    };
    let pair = position.as_array().filter(|a| a.len() >= 2).ok_or_else(bad)?;
    let x = pair[0].as_f64().filter(|v| v.is_finite()).ok_or_else(bad)?;
    let y = pair[1].as_f64().filter(|v| v.is_finite()).ok_or_else(bad)?;
    Ok(Coord { x, y })
}

fn polygon_to_geojson(polygon: &Polygon<f64>) -> Value {
    let ring = |ls: &LineString<f64>| -> Value {
        Value::Array(ls.0.iter().map(|c| serde_json::json!([c.x, c.y])).collect())
    };
    let mut rings = vec![ring(polygon.exterior())];
    rings.extend(polygon.interiors().iter().map(ring));
    serde_json::json!({ "type": "Polygon", "coordinates": rings })
}
