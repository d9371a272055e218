//! Windowed reads of remote Cloud Optimized GeoTIFFs.
//!
//! Only the chunks (tiles or strips) under the requested bbox are fetched:
//! their byte ranges are prefetched concurrently, then decoded by the `tiff`
//! crate on a blocking thread reading through the shared block cache.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use geocontext_core::{BBox, Raster};
use ndarray::Array2;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tiff::ColorType;
use tracing::{debug, info};

use crate::cache::{self, SharedBlockCache};
use crate::error::{CloudError, Result};
use crate::geotiff::GeoTiffInfo;
use crate::http::HttpClient;
use crate::range_reader::{RangeReader, RangeSource};
use crate::raster_access::RasterAccess;
use crate::reproject::{project_bbox, Projection};
use crate::signing::FetchHandle;
use crate::tile_index::{pixel_window, ChunkGrid, PixelWindow};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Options for configuring a [`CogRasterReader`].
#[derive(Debug, Clone)]
pub struct CogReaderOptions {
    /// Timeout per HTTP range request (default: 60 s).
    pub request_timeout: Duration,
    /// Timeout for a whole window read, decode included (default: 300 s).
    pub read_timeout: Duration,
    /// Size of a cached file block in bytes (default: 64 KiB).
    pub block_size: u64,
    /// Number of blocks kept in the LRU cache (default: 256).
    pub cache_blocks: usize,
    /// Maximum concurrent range requests while prefetching (default: 8).
    pub max_concurrent_fetches: usize,
}

impl Default for CogReaderOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            read_timeout: Duration::from_secs(300),
            block_size: 64 * 1024,
            cache_blocks: 256,
            max_concurrent_fetches: 8,
        }
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// [`RasterAccess`] over HTTP Range requests.
///
/// Cheap to share: all reads go through one HTTP client and one block cache.
pub struct CogRasterReader {
    client: HttpClient,
    cache: SharedBlockCache,
    options: CogReaderOptions,
}

impl CogRasterReader {
    pub fn new(options: CogReaderOptions) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(options.request_timeout)?,
            cache: cache::shared(options.cache_blocks),
            options,
        })
    }
}

/// Flags the blocking decode as abandoned when the read future goes away.
struct AbandonOnDrop(Arc<AtomicBool>);

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl RasterAccess for CogRasterReader {
    async fn read_window(&self, handle: &FetchHandle, bbox: &BBox) -> Result<Raster> {
        let abandoned = Arc::new(AtomicBool::new(false));
        let _guard = AbandonOnDrop(abandoned.clone());

        let read = async {
            let source = RangeSource::open(
                &handle.url,
                self.client.clone(),
                self.cache.clone(),
                self.options.block_size,
                self.options.max_concurrent_fetches,
                abandoned.clone(),
            )
            .await?;
            let bbox = *bbox;
            tokio::task::spawn_blocking(move || decode_window(source, &bbox))
                .await
                .map_err(|e| CloudError::RasterRead(format!("decode task failed: {e}")))?
        };

        let raster = tokio::time::timeout(self.options.read_timeout, read)
            .await
            .map_err(|_| CloudError::ReadTimeout {
                secs: self.options.read_timeout.as_secs(),
            })??;

        info!(
            host = handle.host(),
            rows = raster.rows(),
            cols = raster.cols(),
            "raster window read"
        );
        Ok(raster)
    }
}

// ---------------------------------------------------------------------------
// Decoding (blocking thread)
// ---------------------------------------------------------------------------

fn decoder_limits() -> Limits {
    let mut limits = Limits::default();
    limits.decoding_buffer_size = 512 * 1024 * 1024;
    limits.intermediate_buffer_size = 512 * 1024 * 1024;
    limits.ifd_value_size = 256 * 1024 * 1024;
    limits
}

/// Decode band 1 of the window covering `bbox` (WGS84).
fn decode_window(source: Arc<RangeSource>, bbox: &BBox) -> Result<Raster> {
    let mut decoder = Decoder::new(RangeReader::new(source.clone()))?.with_limits(decoder_limits());

    match decoder.colortype()? {
        ColorType::Gray(_) => {}
        other => {
            return Err(CloudError::InvalidTiff {
                reason: format!("expected a single-band image, found {other:?}"),
            })
        }
    }

    let (width, height) = decoder.dimensions()?;
    let info = GeoTiffInfo::read(&mut decoder)?;
    let projection = Projection::from_crs(&info.crs)?;
    let native_bbox = project_bbox(bbox, &projection);
    let window = pixel_window(&native_bbox, &info.transform, width as usize, height as usize)
        .ok_or(CloudError::BBoxOutside)?;

    let (chunk_width, chunk_height) = decoder.chunk_dimensions();
    let grid = ChunkGrid {
        image_width: width as usize,
        image_height: height as usize,
        chunk_width: chunk_width as usize,
        chunk_height: chunk_height as usize,
    };
    let chunks = grid.chunks_for(&window);
    let (offsets, byte_counts) = chunk_locations(&mut decoder)?;
    debug!(
        crs = %info.crs,
        ?window,
        chunks = chunks.len(),
        "decoding raster window"
    );

    let location = |index: u32| {
        let i = index as usize;
        match (offsets.get(i), byte_counts.get(i)) {
            (Some(&o), Some(&n)) => Ok((o, n)),
            _ => Err(CloudError::InvalidTiff {
                reason: format!("chunk {index} has no offset entry"),
            }),
        }
    };
    let ranges = chunks
        .iter()
        .map(|c| location(c.index))
        .collect::<Result<Vec<_>>>()?;
    source.prefetch(&ranges)?;

    let mut out = Array2::from_elem((window.rows, window.cols), f64::NAN);
    for (chunk, &(_, byte_count)) in chunks.iter().zip(&ranges) {
        // Sparse chunk: never written, stays missing.
        if byte_count == 0 {
            continue;
        }
        let (data_w, data_h) = decoder.chunk_data_dimensions(chunk.index);
        let values = widen(decoder.read_chunk(chunk.index)?);
        let origin = (chunk.chunk_col * grid.chunk_width, chunk.chunk_row * grid.chunk_height);
        copy_overlap(&mut out, &window, &values, data_w as usize, data_h as usize, origin);
    }

    Ok(Raster::from_array(out)
        .with_georef(info.transform.window(window.col0, window.row0), info.crs)
        .with_nodata(info.nodata))
}

/// Byte offsets and lengths of every chunk, tiles or strips.
fn chunk_locations<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Result<(Vec<u64>, Vec<u64>)> {
    if let Ok(offsets) = decoder.get_tag_u64_vec(Tag::TileOffsets) {
        return Ok((offsets, decoder.get_tag_u64_vec(Tag::TileByteCounts)?));
    }
    Ok((
        decoder.get_tag_u64_vec(Tag::StripOffsets)?,
        decoder.get_tag_u64_vec(Tag::StripByteCounts)?,
    ))
}

/// Copy the part of a decoded chunk that falls inside `window`.
///
/// `origin` is the chunk's (col, row) in the full image; `data_w` is the row
/// stride of `values`.
fn copy_overlap(
    out: &mut Array2<f64>,
    window: &PixelWindow,
    values: &[f64],
    data_w: usize,
    data_h: usize,
    origin: (usize, usize),
) {
    let (c0, r0) = origin;
    let col_from = c0.max(window.col0);
    let col_to = (c0 + data_w).min(window.col_end());
    let row_from = r0.max(window.row0);
    let row_to = (r0 + data_h).min(window.row_end());

    for row in row_from..row_to {
        let src = (row - r0) * data_w;
        for col in col_from..col_to {
            if let Some(&v) = values.get(src + col - c0) {
                out[(row - window.row0, col - window.col0)] = v;
            }
        }
    }
}

/// Every sample type widened to `f64`.
fn widen(result: DecodingResult) -> Vec<f64> {
    match result {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::range_server;
    use approx::assert_relative_eq;
    use std::io::Cursor;
    use tiff::encoder::{colortype, TiffEncoder};

    /// A 10x8 Int16 GeoTIFF in EPSG:4326 with 0.1° pixels, upper-left at
    /// (10, 46), nodata -9999 at (0, 0), written in 3-row strips.
    fn geotiff() -> Vec<u8> {
        let (w, h) = (10u32, 8u32);
        let mut data: Vec<i16> = (0..(w * h) as i16).collect();
        data[0] = -9999;

        let mut buf = Cursor::new(Vec::new());
        let mut encoder = TiffEncoder::new(&mut buf).unwrap();
        let mut image = encoder.new_image::<colortype::GrayI16>(w, h).unwrap();
        image.rows_per_strip(3).unwrap();
        let dir = image.encoder();
        dir.write_tag(Tag::Unknown(33550), &[0.1f64, 0.1, 0.0][..]).unwrap();
        dir.write_tag(Tag::Unknown(33922), &[0.0f64, 0.0, 0.0, 10.0, 46.0, 0.0][..])
            .unwrap();
        dir.write_tag(
            Tag::Unknown(34735),
            &[1u16, 1, 0, 2, 1024, 0, 1, 2, 2048, 0, 1, 4326][..],
        )
        .unwrap();
        dir.write_tag(Tag::Unknown(42113), "-9999").unwrap();
        image.write_data(&data).unwrap();
        buf.into_inner()
    }

    /// A 40x24 UInt16 GeoTIFF in 16x16 tiles, EPSG:4326 with 0.1° pixels,
    /// upper-left at (10, 46). Pixel (row, col) holds `row * 100 + col`; the
    /// right and bottom tiles are padded with zeros.
    ///
    /// Written by hand: the `tiff` encoder only produces strips.
    fn tiled_geotiff() -> Vec<u8> {
        const W: u32 = 40;
        const H: u32 = 24;
        const T: u32 = 16;
        let (across, down) = (W.div_ceil(T), H.div_ceil(T));
        let n_tiles = across * down;
        let tile_bytes = T * T * 2;

        let mut tiles = Vec::new();
        for tile_row in 0..down {
            for tile_col in 0..across {
                for r in 0..T {
                    for c in 0..T {
                        let (row, col) = (tile_row * T + r, tile_col * T + c);
                        let v = if row < H && col < W { (row * 100 + col) as u16 } else { 0 };
                        tiles.extend_from_slice(&v.to_le_bytes());
                    }
                }
            }
        }

        let short = |v: &[u16]| v.iter().flat_map(|x| x.to_le_bytes()).collect::<Vec<u8>>();
        let long = |v: &[u32]| v.iter().flat_map(|x| x.to_le_bytes()).collect::<Vec<u8>>();
        let double = |v: &[f64]| v.iter().flat_map(|x| x.to_le_bytes()).collect::<Vec<u8>>();
        const SHORT: u16 = 3;
        const LONG: u16 = 4;
        const DOUBLE: u16 = 12;

        // (tag, type, count, value bytes), ascending by tag
        let mut entries: Vec<(u16, u16, u32, Vec<u8>)> = vec![
            (256, LONG, 1, long(&[W])),
            (257, LONG, 1, long(&[H])),
            (258, SHORT, 1, short(&[16])),
            (259, SHORT, 1, short(&[1])),
            (262, SHORT, 1, short(&[1])),
            (277, SHORT, 1, short(&[1])),
            (322, LONG, 1, long(&[T])),
            (323, LONG, 1, long(&[T])),
            (324, LONG, n_tiles, vec![0; n_tiles as usize * 4]),
            (325, LONG, n_tiles, long(&vec![tile_bytes; n_tiles as usize])),
            (339, SHORT, 1, short(&[1])),
            (33550, DOUBLE, 3, double(&[0.1, 0.1, 0.0])),
            (33922, DOUBLE, 6, double(&[0.0, 0.0, 0.0, 10.0, 46.0, 0.0])),
            (34735, SHORT, 12, short(&[1, 1, 0, 2, 1024, 0, 1, 2, 2048, 0, 1, 4326])),
        ];

        let extra_start = 8 + 2 + 12 * entries.len() as u32 + 4;
        let extra_len: u32 = entries
            .iter()
            .filter(|e| e.3.len() > 4)
            .map(|e| e.3.len() as u32)
            .sum();
        let data_start = extra_start + extra_len;
        let offsets: Vec<u32> = (0..n_tiles).map(|i| data_start + i * tile_bytes).collect();
        entries[8].3 = long(&offsets);

        let mut out = b"II*\0".to_vec();
        out.extend_from_slice(&8u32.to_le_bytes());
        out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        let mut extra = Vec::new();
        for (tag, kind, count, bytes) in &entries {
            out.extend_from_slice(&tag.to_le_bytes());
            out.extend_from_slice(&kind.to_le_bytes());
            out.extend_from_slice(&count.to_le_bytes());
            if bytes.len() <= 4 {
                let mut inline = bytes.clone();
                inline.resize(4, 0);
                out.extend_from_slice(&inline);
            } else {
                out.extend_from_slice(&(extra_start + extra.len() as u32).to_le_bytes());
                extra.extend_from_slice(bytes);
            }
        }
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&extra);
        assert_eq!(out.len() as u32, data_start);
        out.extend_from_slice(&tiles);
        out
    }

    fn reader() -> CogRasterReader {
        CogRasterReader::new(CogReaderOptions {
            request_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(20),
            block_size: 512,
            ..CogReaderOptions::default()
        })
        .unwrap()
    }

    #[test]
    fn copy_overlap_clips_chunk() {
        let mut out = Array2::from_elem((2, 2), f64::NAN);
        let window = PixelWindow { col0: 1, row0: 1, cols: 2, rows: 2 };
        // 3x3 chunk at the image origin
        let values: Vec<f64> = (0..9).map(f64::from).collect();
        copy_overlap(&mut out, &window, &values, 3, 3, (0, 0));
        assert_eq!(out[(0, 0)], 4.0);
        assert_eq!(out[(1, 1)], 8.0);
    }

    #[test]
    fn widen_keeps_values() {
        assert_eq!(widen(DecodingResult::I16(vec![-5, 7])), vec![-5.0, 7.0]);
        assert_eq!(widen(DecodingResult::U8(vec![255])), vec![255.0]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reads_window_from_stripped_geotiff() {
        let (url, _) = range_server(geotiff()).await;
        // Cols 2..5, rows 1..4 of the image
        let bbox = BBox::new(10.25, 45.65, 10.45, 45.85);
        let raster = reader().read_window(&FetchHandle::new(url), &bbox).await.unwrap();

        assert_eq!(raster.shape(), (3, 3));
        assert_eq!(raster.get(0, 0).unwrap(), 12.0);
        assert_eq!(raster.get(2, 2).unwrap(), 34.0);
        assert_eq!(raster.nodata(), Some(-9999.0));
        assert_eq!(raster.crs().and_then(|c| c.epsg()), Some(4326));
        assert_relative_eq!(raster.transform().origin_x, 10.2, epsilon = 1e-9);
        assert_relative_eq!(raster.transform().origin_y, 45.9, epsilon = 1e-9);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reads_window_across_tiles() {
        let (url, _) = range_server(tiled_geotiff()).await;
        // Cols 12..35, rows 10..20: all six tiles, the right column padded
        let bbox = BBox::new(11.25, 44.05, 13.45, 44.95);
        let raster = reader().read_window(&FetchHandle::new(url), &bbox).await.unwrap();

        assert_eq!(raster.shape(), (10, 23));
        let at = |row: usize, col: usize| raster.get(row - 10, col - 12).unwrap();
        assert_eq!(at(10, 12), 1012.0);
        assert_eq!(at(15, 15), 1515.0);
        assert_eq!(at(16, 16), 1616.0);
        assert_eq!(at(15, 32), 1532.0);
        assert_eq!(at(19, 34), 1934.0);
        assert_eq!(raster.valid_count(), 10 * 23);
        assert_eq!(raster.nodata(), None);
        assert_eq!(raster.crs().and_then(|c| c.epsg()), Some(4326));
        assert_relative_eq!(raster.transform().origin_x, 11.2, epsilon = 1e-9);
        assert_relative_eq!(raster.transform().origin_y, 45.0, epsilon = 1e-9);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn padded_corner_tile_keeps_image_values() {
        let (url, _) = range_server(tiled_geotiff()).await;
        // Cols 36..40, rows 20..24, clamped at the image edge
        let bbox = BBox::new(13.65, 43.0, 14.5, 43.95);
        let raster = reader().read_window(&FetchHandle::new(url), &bbox).await.unwrap();

        assert_eq!(raster.shape(), (4, 4));
        assert_eq!(raster.get(0, 0).unwrap(), 2036.0);
        assert_eq!(raster.get(3, 3).unwrap(), 2339.0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn nodata_corner_is_reported() {
        let (url, _) = range_server(geotiff()).await;
        let bbox = BBox::new(10.01, 45.96, 10.04, 45.99);
        let raster = reader().read_window(&FetchHandle::new(url), &bbox).await.unwrap();
        assert_eq!(raster.shape(), (1, 1));
        assert!(raster.is_missing(raster.get(0, 0).unwrap()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn bbox_outside_image() {
        let (url, _) = range_server(geotiff()).await;
        let bbox = BBox::new(20.0, 20.0, 21.0, 21.0);
        assert!(matches!(
            reader().read_window(&FetchHandle::new(url), &bbox).await,
            Err(CloudError::BBoxOutside)
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn garbage_is_invalid_tiff() {
        let (url, _) = range_server(b"definitely not a tiff file".to_vec()).await;
        let bbox = BBox::new(10.0, 45.0, 11.0, 46.0);
        let err = reader().read_window(&FetchHandle::new(url), &bbox).await.unwrap_err();
        assert!(matches!(err, CloudError::InvalidTiff { .. }), "{err}");
    }
}
