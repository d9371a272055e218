//! GeoTIFF georeferencing tags.
//!
//! Reads ModelPixelScale (33550), ModelTiepoint (33922), GeoKeyDirectory
//! (34735) and GDAL_NODATA (42113) through a `tiff` decoder and turns them
//! into a `GeoTransform`, a `CRS` and a no-data value.

use std::io::{Read, Seek};

use geocontext_core::{GeoTransform, CRS};
use tiff::decoder::Decoder;
use tiff::tags::Tag;

use crate::error::{CloudError, Result};

pub const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
pub const TAG_MODEL_TIEPOINT: u16 = 33922;
pub const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
pub const TAG_GDAL_NODATA: u16 = 42113;

const KEY_GT_MODEL_TYPE: u16 = 1024;
const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const KEY_PROJECTED_CS_TYPE: u16 = 3072;
const KEY_PROJ_COORD_TRANS: u16 = 3075;

const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const CT_SINUSOIDAL: u16 = 24;
const USER_DEFINED: u16 = 32767;

/// Georeferencing of one GeoTIFF image.
#[derive(Debug, Clone)]
pub struct GeoTiffInfo {
    pub transform: GeoTransform,
    pub crs: CRS,
    pub nodata: Option<f64>,
}

impl GeoTiffInfo {
    /// Read the georeferencing tags of the decoder's current image.
    pub fn read<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Self> {
        let scale = decoder.get_tag_f64_vec(Tag::Unknown(TAG_MODEL_PIXEL_SCALE));
        let tiepoint = decoder.get_tag_f64_vec(Tag::Unknown(TAG_MODEL_TIEPOINT));
        let transform = match (tiepoint, scale) {
            (Ok(tp), Ok(sc)) => GeoTransform::from_tiepoint(&tp, &sc),
            _ => None,
        }
        .ok_or_else(|| CloudError::InvalidTiff {
            reason: "missing ModelTiepoint/ModelPixelScale tags \
                     (affine-only GeoTIFFs are not supported)"
                .into(),
        })?;

        let keys = decoder
            .get_tag_u16_vec(Tag::Unknown(TAG_GEO_KEY_DIRECTORY))
            .map_err(|_| CloudError::UnsupportedProjection("no GeoKeyDirectory tag".into()))?;
        let crs = crs_from_geokeys(&keys)?;

        let nodata = decoder
            .get_tag_ascii_string(Tag::Unknown(TAG_GDAL_NODATA))
            .ok()
            .and_then(|s| parse_gdal_nodata(&s));

        Ok(Self {
            transform,
            crs,
            nodata,
        })
    }
}

/// Value of a short GeoKey stored inline in the directory.
///
/// Directory layout: a 4-entry header `[version, revision, minor, count]`
/// followed by `count` entries `[key_id, tag_location, count, value]`.
/// Keys whose value lives in another tag (`tag_location != 0`) are skipped.
pub fn geokey(keys: &[u16], key_id: u16) -> Option<u16> {
    let count = *keys.get(3)? as usize;
    keys.get(4..)?
        .chunks_exact(4)
        .take(count)
        .find(|e| e[0] == key_id && e[1] == 0)
        .map(|e| e[3])
}

/// Identify the CRS from a GeoKeyDirectory.
///
/// In order: an EPSG projected CS code; a user-defined sinusoidal projection
/// (the MODIS grid); an EPSG geographic CS code; a geographic model type
/// with nothing more specific, taken as WGS84.
pub fn crs_from_geokeys(keys: &[u16]) -> Result<CRS> {
    let is_code = |v: &u16| (1..USER_DEFINED).contains(v);

    if let Some(code) = geokey(keys, KEY_PROJECTED_CS_TYPE).filter(is_code) {
        return Ok(CRS::from_epsg(code as u32));
    }
    if geokey(keys, KEY_PROJ_COORD_TRANS) == Some(CT_SINUSOIDAL) {
        return Ok(CRS::modis_sinusoidal());
    }
    if let Some(code) = geokey(keys, KEY_GEOGRAPHIC_TYPE).filter(is_code) {
        return Ok(CRS::from_epsg(code as u32));
    }
    if geokey(keys, KEY_GT_MODEL_TYPE) == Some(MODEL_TYPE_GEOGRAPHIC) {
        return Ok(CRS::wgs84());
    }
    Err(CloudError::UnsupportedProjection(
        "GeoKeys name no EPSG code or known projection".into(),
    ))
}

/// Parse a GDAL_NODATA string (`"-9999"`, `"nan"`, `"0\0"`).
pub fn parse_gdal_nodata(raw: &str) -> Option<f64> {
    let s = raw.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    if s.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    s.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory(entries: &[[u16; 4]]) -> Vec<u16> {
        let mut keys = vec![1, 1, 0, entries.len() as u16];
        for e in entries {
            keys.extend_from_slice(e);
        }
        keys
    }

    #[test]
    fn projected_epsg() {
        // UTM 32N as written by GDAL
        let keys = directory(&[[1024, 0, 1, 1], [1025, 0, 1, 1], [3072, 0, 1, 32632]]);
        assert_eq!(crs_from_geokeys(&keys).unwrap().epsg(), Some(32632));
    }

    #[test]
    fn modis_sinusoidal_grid() {
        let keys = directory(&[
            [1024, 0, 1, 1],
            [2048, 0, 1, 32767],
            [3072, 0, 1, 32767],
            [3074, 0, 1, 32767],
            [3075, 0, 1, 24],
            [3088, 34736, 1, 1],
        ]);
        let crs = crs_from_geokeys(&keys).unwrap();
        assert!(crs.is_sinusoidal());
        assert!(crs.epsg().is_none());
    }

    #[test]
    fn geographic_epsg_and_model_fallback() {
        let keys = directory(&[[1024, 0, 1, 2], [2048, 0, 1, 4326]]);
        assert_eq!(crs_from_geokeys(&keys).unwrap().epsg(), Some(4326));

        let keys = directory(&[[1024, 0, 1, 2], [2048, 0, 1, 32767]]);
        assert_eq!(crs_from_geokeys(&keys).unwrap().epsg(), Some(4326));
    }

    #[test]
    fn unknown_projection_is_rejected() {
        let keys = directory(&[[1024, 0, 1, 1], [3072, 0, 1, 32767], [3075, 0, 1, 1]]);
        assert!(matches!(
            crs_from_geokeys(&keys),
            Err(CloudError::UnsupportedProjection(_))
        ));
        assert!(crs_from_geokeys(&[]).is_err());
    }

    #[test]
    fn values_in_other_tags_are_ignored() {
        let keys = directory(&[[3072, 34737, 1, 5]]);
        assert_eq!(geokey(&keys, 3072), None);
    }

    #[test]
    fn gdal_nodata_strings() {
        assert_eq!(parse_gdal_nodata("-9999"), Some(-9999.0));
        assert_eq!(parse_gdal_nodata("0\0"), Some(0.0));
        assert_eq!(parse_gdal_nodata(" 255 "), Some(255.0));
        assert!(parse_gdal_nodata("nan").unwrap().is_nan());
        assert_eq!(parse_gdal_nodata("none"), None);
    }
}
