//! Blocking `Read + Seek` over a remote file, backed by HTTP Range requests.
//!
//! The TIFF decoder is synchronous, so it runs on a blocking thread and pulls
//! bytes through [`RangeReader`]. Each miss fetches one fixed-size block via
//! the async [`HttpClient`] on the runtime `Handle`. Known chunk ranges can be
//! [`prefetched`](RangeSource::prefetch) concurrently before decoding starts.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::debug;

use crate::cache::{BlockKey, SharedBlockCache};
use crate::error::{CloudError, Result};
use crate::http::{strip_query, HttpClient};

/// Shared state for every reader over one remote file.
pub struct RangeSource {
    url: Arc<str>,
    client: HttpClient,
    handle: Handle,
    cache: SharedBlockCache,
    block_size: u64,
    len: u64,
    max_concurrent_fetches: usize,
    abandoned: Arc<AtomicBool>,
}

impl RangeSource {
    /// Fetch the first block and learn the file length.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn open(
        url: &str,
        client: HttpClient,
        cache: SharedBlockCache,
        block_size: u64,
        max_concurrent_fetches: usize,
        abandoned: Arc<AtomicBool>,
    ) -> Result<Arc<Self>> {
        let block_size = block_size.max(512);
        let first = client.fetch_range(url, 0, block_size).await?;
        let len = match first.total_len {
            Some(len) => len,
            None => client.head(url).await?.content_length.ok_or_else(|| {
                let url = strip_query(url);
                CloudError::RasterRead(format!("{url}: server reports no file length"))
            })?,
        };

        let source = Self {
            url: Arc::from(url),
            client,
            handle: Handle::current(),
            cache,
            block_size,
            len,
            max_concurrent_fetches: max_concurrent_fetches.max(1),
            abandoned,
        };
        source.store(0, first.bytes);
        Ok(Arc::new(source))
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn key(&self, index: u64) -> BlockKey {
        BlockKey {
            url: self.url.clone(),
            index,
        }
    }

    fn cached(&self, index: u64) -> Option<Arc<[u8]>> {
        let key = self.key(index);
        self.cache.lock().unwrap_or_else(|p| p.into_inner()).get(&key)
    }

    fn store(&self, index: u64, bytes: Vec<u8>) -> Arc<[u8]> {
        let block: Arc<[u8]> = Arc::from(bytes);
        let key = self.key(index);
        self.cache
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(key, block.clone());
        block
    }

    fn check_abandoned(&self) -> io::Result<()> {
        if self.abandoned.load(Ordering::Relaxed) {
            return Err(io::Error::other("raster read abandoned"));
        }
        Ok(())
    }

    fn block_span(&self, index: u64) -> (u64, u64) {
        let start = index * self.block_size;
        (start, self.block_size.min(self.len.saturating_sub(start)))
    }

    /// Block `index`, from cache or the network. Blocks the calling thread.
    fn block(&self, index: u64) -> io::Result<Arc<[u8]>> {
        if let Some(block) = self.cached(index) {
            return Ok(block);
        }
        self.check_abandoned()?;
        let (start, length) = self.block_span(index);
        let reply = self
            .handle
            .block_on(self.client.fetch_range(&self.url, start, length))
            .map_err(io::Error::other)?;
        Ok(self.store(index, reply.bytes))
    }

    /// Fetch every uncached block touching `ranges` (`(offset, length)` pairs).
    ///
    /// Adjacent missing blocks are merged into one request; requests run
    /// concurrently in batches. Blocks the calling thread.
    pub fn prefetch(&self, ranges: &[(u64, u64)]) -> Result<()> {
        let mut missing: Vec<u64> = ranges
            .iter()
            .filter(|(_, len)| *len > 0)
            .flat_map(|&(offset, len)| {
                let first = offset / self.block_size;
                let last = (offset + len - 1).min(self.len.saturating_sub(1)) / self.block_size;
                first..=last
            })
            .filter(|&i| self.cached(i).is_none())
            .collect();
        missing.sort_unstable();
        missing.dedup();
        if missing.is_empty() {
            return Ok(());
        }

        // Runs of consecutive block indices: (first_block, block_count).
        let mut runs: Vec<(u64, u64)> = Vec::new();
        for i in missing {
            match runs.last_mut() {
                Some((first, count)) if *first + *count == i => *count += 1,
                _ => runs.push((i, 1)),
            }
        }
        debug!(url = %strip_query(&self.url), requests = runs.len(), "prefetching chunk ranges");

        for batch in runs.chunks(self.max_concurrent_fetches) {
            if self.abandoned.load(Ordering::Relaxed) {
                return Err(CloudError::RasterRead("raster read abandoned".into()));
            }
            let spans: Vec<(u64, u64)> = batch
                .iter()
                .map(|&(first, count)| {
                    let start = first * self.block_size;
                    (start, (count * self.block_size).min(self.len - start))
                })
                .collect();
            let bodies = self.handle.block_on(self.client.fetch_ranges(&self.url, &spans))?;

            for (&(first, _), body) in batch.iter().zip(bodies) {
                for (k, bytes) in body.chunks(self.block_size as usize).enumerate() {
                    self.store(first + k as u64, bytes.to_vec());
                }
            }
        }
        Ok(())
    }
}

/// A cursor over a [`RangeSource`].
pub struct RangeReader {
    source: Arc<RangeSource>,
    pos: u64,
}

impl RangeReader {
    pub fn new(source: Arc<RangeSource>) -> Self {
        Self { source, pos: 0 }
    }
}

impl Read for RangeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.pos >= self.source.len {
            return Ok(0);
        }
        let index = self.pos / self.source.block_size;
        let block = self.source.block(index)?;
        let offset = (self.pos - index * self.source.block_size) as usize;
        if offset >= block.len() {
            return Ok(0);
        }
        let n = buf.len().min(block.len() - offset);
        buf[..n].copy_from_slice(&block[offset..offset + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for RangeReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(d) => self.source.len.checked_add_signed(d),
            SeekFrom::Current(d) => self.pos.checked_add_signed(d),
        };
        match target {
            Some(n) => {
                self.pos = n;
                Ok(n)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of remote file",
            )),
        }
    }
}
