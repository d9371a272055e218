//! Turning catalog asset references into URLs a raster reader can fetch.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{CloudError, Result};
use crate::stac_models::StacItem;

/// Planetary Computer SAS signing endpoint.
pub const PC_SIGN_ENDPOINT: &str = "https://planetarycomputer.microsoft.com/api/sas/v1/sign";

/// An authorized, directly fetchable asset URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchHandle {
    pub url: String,
}

impl FetchHandle {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Host part of the URL, for logs. Query strings may carry tokens.
    pub fn host(&self) -> &str {
        let rest = self.url.split_once("://").map(|(_, r)| r).unwrap_or(&self.url);
        rest.split(['/', '?']).next().unwrap_or(rest)
    }
}

/// Exchanges an asset href for a fetchable handle.
#[async_trait]
pub trait AssetSigner: Send + Sync {
    async fn sign(&self, href: &str) -> Result<FetchHandle>;
}

/// For public catalogs: the href is already fetchable.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughSigner;

#[async_trait]
impl AssetSigner for PassthroughSigner {
    async fn sign(&self, href: &str) -> Result<FetchHandle> {
        Ok(FetchHandle::new(href))
    }
}

/// Signs hrefs with a short-lived SAS token from Planetary Computer.
pub struct PlanetaryComputerSigner {
    client: reqwest::Client,
    endpoint: String,
}

impl PlanetaryComputerSigner {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_endpoint(PC_SIGN_ENDPOINT, timeout)
    }

    /// Use a different sign endpoint (mirrors, tests).
    pub fn with_endpoint(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CloudError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl AssetSigner for PlanetaryComputerSigner {
    async fn sign(&self, href: &str) -> Result<FetchHandle> {
        let failed = |reason: String| CloudError::AssetResolutionFailed {
            href: href.to_string(),
            reason,
        };

        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("href", href)])
            .send()
            .await
            .map_err(|e| failed(format!("sign request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(failed(format!(
                "sign endpoint returned HTTP {}: {}",
                status,
                body.chars().take(300).collect::<String>()
            )));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| failed(format!("unparsable sign response: {e}")))?;

        let signed = body["href"]
            .as_str()
            .ok_or_else(|| failed("sign response has no 'href' field".into()))?;
        debug!(href, "asset signed");
        Ok(FetchHandle::new(signed))
    }
}

/// Look up the asset named `role` on `item` and sign its href.
pub async fn resolve_asset(
    signer: &dyn AssetSigner,
    item: &StacItem,
    role: &str,
) -> Result<FetchHandle> {
    let asset = item.asset(role).ok_or_else(|| CloudError::AssetResolutionFailed {
        href: item.id.clone(),
        reason: format!("item has no '{role}' asset"),
    })?;
    signer.sign(&asset.href).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{http_response, one_shot_server};

    fn item() -> StacItem {
        serde_json::from_value(serde_json::json!({
            "id": "ESA_WorldCover_10m_2021_v200_N45E009",
            "properties": {"datetime": "2021-01-01T00:00:00Z"},
            "assets": {"map": {"href": "https://example.blob.core.windows.net/map.tif"}}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn passthrough_keeps_href() {
        let handle = resolve_asset(&PassthroughSigner, &item(), "map").await.unwrap();
        assert_eq!(handle.url, "https://example.blob.core.windows.net/map.tif");
        assert_eq!(handle.host(), "example.blob.core.windows.net");
    }

    #[tokio::test]
    async fn missing_role_fails() {
        match resolve_asset(&PassthroughSigner, &item(), "elevation").await {
            Err(CloudError::AssetResolutionFailed { reason, .. }) => {
                assert!(reason.contains("elevation"))
            }
            other => panic!("expected AssetResolutionFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pc_signer_returns_signed_href() {
        let body = serde_json::json!({
            "href": "https://example.blob.core.windows.net/map.tif?sv=2021&sig=abc",
            "msft:expiry": "2030-01-01T00:00:00Z"
        })
        .to_string();
        let base = one_shot_server(Some(http_response("200 OK", &body))).await;
        let signer =
            PlanetaryComputerSigner::with_endpoint(format!("{base}/sign"), Duration::from_secs(5))
                .unwrap();
        let handle = resolve_asset(&signer, &item(), "map").await.unwrap();
        assert!(handle.url.ends_with("sig=abc"));
    }

    #[tokio::test]
    async fn pc_signer_reports_http_errors() {
        let base = one_shot_server(Some(http_response("403 Forbidden", "{}"))).await;
        let signer = PlanetaryComputerSigner::with_endpoint(base, Duration::from_secs(5)).unwrap();
        match signer.sign("https://example.com/a.tif").await {
            Err(CloudError::AssetResolutionFailed { href, reason }) => {
                assert_eq!(href, "https://example.com/a.tif");
                assert!(reason.contains("403"), "{reason}");
            }
            other => panic!("expected AssetResolutionFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pc_signer_requires_href_field() {
        let base = one_shot_server(Some(http_response("200 OK", r#"{"token": "x"}"#))).await;
        let signer = PlanetaryComputerSigner::with_endpoint(base, Duration::from_secs(5)).unwrap();
        assert!(matches!(
            signer.sign("https://example.com/a.tif").await,
            Err(CloudError::AssetResolutionFailed { .. })
        ));
    }
}
