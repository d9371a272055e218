//! Polygon masks
//!
//! A pixel belongs to a polygon when its centre lies strictly inside the
//! exterior ring and outside every hole. This matches the default
//! (non all-touched) rasterization rule of GDAL.

use geo::{BoundingRect, Contains, Point, Polygon};
use geocontext_core::raster::Raster;
use geocontext_core::Result;
use ndarray::Array2;

/// Boolean mask over the raster grid, `true` where the pixel centre is inside
/// `polygon`. The polygon must be in the raster's CRS.
pub fn polygon_mask(raster: &Raster, polygon: &Polygon<f64>) -> Array2<bool> {
    let (rows, cols) = raster.shape();
    let mut mask = Array2::from_elem((rows, cols), false);
    let Some(rect) = polygon.bounding_rect() else {
        return mask;
    };
    let gt = raster.transform();

    for row in 0..rows {
        let (_, y) = gt.pixel_to_geo(0, row);
        if y < rect.min().y || y > rect.max().y {
            continue;
        }
        for col in 0..cols {
            let (x, _) = gt.pixel_to_geo(col, row);
            if x < rect.min().x || x > rect.max().x {
                continue;
            }
            if polygon.contains(&Point::new(x, y)) {
                mask[(row, col)] = true;
            }
        }
    }
    mask
}

/// Clip `raster` to `polygon`: crop to the smallest window holding every
/// inside pixel and set the remaining outside pixels to NaN.
///
/// Returns `None` when no pixel centre falls inside the polygon.
pub fn clip_to_polygon(raster: &Raster, polygon: &Polygon<f64>) -> Result<Option<Raster>> {
    let mask = polygon_mask(raster, polygon);

    let mut extent: Option<(usize, usize, usize, usize)> = None;
    for ((row, col), &inside) in mask.indexed_iter() {
        if !inside {
            continue;
        }
        extent = Some(match extent {
            None => (row, row, col, col),
            Some((r0, r1, c0, c1)) => (r0.min(row), r1.max(row), c0.min(col), c1.max(col)),
        });
    }
    let Some((r0, r1, c0, c1)) = extent else {
        return Ok(None);
    };

    let mut clipped = raster.crop(r0, c0, r1 - r0 + 1, c1 - c0 + 1)?;
    let window = mask.slice(ndarray::s![r0..=r1, c0..=c1]);
    ndarray::Zip::from(clipped.data_mut())
        .and(&window)
        .for_each(|v, &inside| {
            if !inside {
                *v = f64::NAN;
            }
        });
    Ok(Some(clipped))
}
