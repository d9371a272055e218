//! HTTP client wrapper for byte-range reads.
//!
//! One attempt per range, bounded by the client timeout. Callers that want
//! a different policy wrap the futures themselves.

use std::time::Duration;

use futures::stream::{FuturesOrdered, StreamExt};
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::{Client, StatusCode};

use crate::error::{CloudError, Result};

/// HTTP client for fetching byte ranges from remote files.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    request_timeout: Duration,
}

/// Response from a HEAD request.
#[derive(Debug, Clone, Copy)]
pub struct HeadInfo {
    /// Total file size in bytes, if reported by the server.
    pub content_length: Option<u64>,
    pub accept_ranges: bool,
}

/// Bytes of one range plus the total file size when the server reported it
/// in `Content-Range`.
#[derive(Debug, Clone)]
pub struct RangeReply {
    pub bytes: Vec<u8>,
    pub total_len: Option<u64>,
}

impl HttpClient {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            request_timeout,
        })
    }

    /// Send a HEAD request to discover file size and Range support.
    pub async fn head(&self, url: &str) -> Result<HeadInfo> {
        let resp = self.client.head(url).send().await?;
        if !resp.status().is_success() {
            return Err(CloudError::Network(format!("HTTP {} on HEAD", resp.status())));
        }
        let header = |name| resp.headers().get(name).and_then(|v| v.to_str().ok());

        Ok(HeadInfo {
            content_length: header(CONTENT_LENGTH).and_then(|v| v.parse::<u64>().ok()),
            accept_ranges: header(ACCEPT_RANGES).map(|v| v.contains("bytes")).unwrap_or(false),
        })
    }

    /// Fetch `[offset .. offset + length)` from a remote file.
    ///
    /// A `200 OK` carrying the whole body is treated as lack of Range support.
    pub async fn fetch_range(&self, url: &str, offset: u64, length: u64) -> Result<RangeReply> {
        if length == 0 {
            return Ok(RangeReply {
                bytes: Vec::new(),
                total_len: None,
            });
        }
        let range_value = format!("bytes={}-{}", offset, offset + length - 1);
        let resp = self.client.get(url).header(RANGE, range_value).send().await?;

        let status = resp.status();
        if status == StatusCode::RANGE_NOT_SATISFIABLE
            || (status.is_success() && status != StatusCode::PARTIAL_CONTENT)
        {
            return Err(CloudError::RangeNotSupported {
                url: strip_query(url).to_string(),
            });
        }
        if !status.is_success() {
            return Err(CloudError::Network(format!(
                "HTTP {} fetching {}",
                status,
                strip_query(url)
            )));
        }

        let total_len = resp
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total);
        let bytes = resp.bytes().await?.to_vec();
        Ok(RangeReply { bytes, total_len })
    }

    /// Fetch multiple byte ranges concurrently, results in input order.
    ///
    /// Each element in `ranges` is `(offset, length)`.
    pub async fn fetch_ranges(&self, url: &str, ranges: &[(u64, u64)]) -> Result<Vec<Vec<u8>>> {
        let mut futs = FuturesOrdered::new();
        for &(offset, length) in ranges {
            futs.push_back(self.fetch_range(url, offset, length));
        }

        let mut results = Vec::with_capacity(ranges.len());
        while let Some(res) = futs.next().await {
            results.push(res?.bytes);
        }
        Ok(results)
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

/// Total size from a `Content-Range: bytes 0-99/1234` header.
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

/// URL without its query string; signed URLs carry tokens there.
pub fn strip_query(url: &str) -> &str {
    url.split_once('?').map(|(base, _)| base).unwrap_or(url)
}
