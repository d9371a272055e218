//! Chunk grid math for tiled and stripped GeoTIFFs.
//!
//! Maps a bounding box (already in the raster's CRS) to a pixel window and
//! to the chunks (tiles or strips) that cover it. A strip is a chunk as wide
//! as the image.

use geocontext_core::{BBox, GeoTransform};

/// Pixel window `[col0, col0 + cols) x [row0, row0 + rows)` in the full image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub col0: usize,
    pub row0: usize,
    pub cols: usize,
    pub rows: usize,
}

impl PixelWindow {
    pub fn col_end(&self) -> usize {
        self.col0 + self.cols
    }

    pub fn row_end(&self) -> usize {
        self.row0 + self.rows
    }
}

/// A chunk that overlaps the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRequest {
    /// Linear chunk index, as used by TileOffsets/StripOffsets.
    pub index: u32,
    pub chunk_col: usize,
    pub chunk_row: usize,
}

/// Layout of the chunk grid of one image.
#[derive(Debug, Clone, Copy)]
pub struct ChunkGrid {
    pub image_width: usize,
    pub image_height: usize,
    pub chunk_width: usize,
    pub chunk_height: usize,
}

impl ChunkGrid {
    pub fn chunks_across(&self) -> usize {
        self.image_width.div_ceil(self.chunk_width.max(1))
    }

    pub fn chunks_down(&self) -> usize {
        self.image_height.div_ceil(self.chunk_height.max(1))
    }

    /// Chunks overlapping `window`, row-major.
    pub fn chunks_for(&self, window: &PixelWindow) -> Vec<ChunkRequest> {
        let (cw, ch) = (self.chunk_width.max(1), self.chunk_height.max(1));
        let across = self.chunks_across();

        let col_min = window.col0 / cw;
        let col_max = window.col_end().div_ceil(cw).min(across);
        let row_min = window.row0 / ch;
        let row_max = window.row_end().div_ceil(ch).min(self.chunks_down());

        let mut out = Vec::with_capacity((col_max - col_min) * (row_max - row_min));
        for chunk_row in row_min..row_max {
            for chunk_col in col_min..col_max {
                out.push(ChunkRequest {
                    index: (chunk_row * across + chunk_col) as u32,
                    chunk_col,
                    chunk_row,
                });
            }
        }
        out
    }
}

/// Pixel window of the image covering `bbox`, clamped to the image.
///
/// `None` when the bbox misses the image entirely.
pub fn pixel_window(
    bbox: &BBox,
    transform: &GeoTransform,
    width: usize,
    height: usize,
) -> Option<PixelWindow> {
    // For north-up images, min_y maps to the larger row.
    let (col_a, row_a) = transform.geo_to_pixel(bbox.min_x, bbox.max_y);
    let (col_b, row_b) = transform.geo_to_pixel(bbox.max_x, bbox.min_y);
    if !(col_a.is_finite() && col_b.is_finite() && row_a.is_finite() && row_b.is_finite()) {
        return None;
    }

    let clamp = |v: f64, max: usize| (v.max(0.0) as usize).min(max);
    let col0 = clamp(col_a.min(col_b).floor(), width);
    let col1 = clamp(col_a.max(col_b).ceil(), width);
    let row0 = clamp(row_a.min(row_b).floor(), height);
    let row1 = clamp(row_a.max(row_b).ceil(), height);

    if col0 >= col1 || row0 >= row1 {
        return None;
    }
    Some(PixelWindow {
        col0,
        row0,
        cols: col1 - col0,
        rows: row1 - row0,
    })
}
