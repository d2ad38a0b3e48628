//! Object storage downloads.

use crate::error::{TrainingError, TrainingResult};
use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;
use tokio::io::AsyncWriteExt;

pub const S3_SCHEME: &str = "s3://";

/// Downloads single objects to local files.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn download(&self, url: &str, dest: &Path) -> TrainingResult<()>;
}

/// Returns true if `locator` names an object rather than a local path.
pub fn is_object_url(locator: &str) -> bool {
    locator.starts_with(S3_SCHEME)
        || locator.starts_with("http://")
        || locator.starts_with("https://")
}

/// Object store over plain HTTPS.
///
/// `s3://bucket/key` is mapped to the bucket's virtual-hosted endpoint in the
/// configured region; `http(s)://` URLs, such as pre-signed URLs, are fetched
/// as given. Requests are not signed.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: Client,
    region: Option<String>,
}

impl HttpObjectStore {
    pub fn new(region: Option<String>) -> Self {
        Self { client: Client::new(), region }
    }

    pub fn with_client(client: Client, region: Option<String>) -> Self {
        Self { client, region }
    }

    /// Resolves `url` to the HTTP(S) URL actually requested.
    pub fn resolve_url(&self, url: &str) -> TrainingResult<String> {
        if url.starts_with("http://") || url.starts_with("https://") {
            return Ok(url.to_string());
        }
        let Some(rest) = url.strip_prefix(S3_SCHEME) else {
            return Err(TrainingError::InvalidLocator(format!("unsupported object URL: {url}")));
        };
        let split = rest.split_once('/').filter(|(b, k)| !b.is_empty() && !k.is_empty());
        let Some((bucket, key)) = split else {
            let reason = format!("expected s3://<bucket>/<key>, got {url}");
            return Err(TrainingError::InvalidLocator(reason));
        };
        Ok(match self.region.as_deref() {
            Some(region) if region != "us-east-1" => {
                format!("https://{bucket}.s3.{region}.amazonaws.com/{key}")
            }
            _ => format!("https://{bucket}.s3.amazonaws.com/{key}"),
        })
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn download(&self, url: &str, dest: &Path) -> TrainingResult<()> {
        let resolved = self.resolve_url(url)?;
        tracing::info!(url, %resolved, dest = %dest.display(), "downloading object");

        let download_err =
            |reason: String| TrainingError::Download { url: url.to_string(), reason };

        let mut response = self
            .client
            .get(&resolved)
            .send()
            .await
            .map_err(|e| download_err(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(download_err(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        while let Some(chunk) = response.chunk().await.map_err(|e| download_err(e.to_string()))? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_s3_urls() {
        let store = HttpObjectStore::new(Some("eu-west-1".to_string()));
        assert_eq!(
            store.resolve_url("s3://my-bucket/jobs/1/source/sourcedir.tar.gz").unwrap(),
            "https://my-bucket.s3.eu-west-1.amazonaws.com/jobs/1/source/sourcedir.tar.gz"
        );

        let store = HttpObjectStore::new(None);
        let resolved = store.resolve_url("s3://b/k.tar.gz").unwrap();
        assert_eq!(resolved, "https://b.s3.amazonaws.com/k.tar.gz");
    }

    #[test]
    fn test_resolve_passes_http_through() {
        let store = HttpObjectStore::new(Some("us-west-2".to_string()));
        let url = "https://example.com/code.tar.gz?X-Amz-Signature=abc";
        assert_eq!(store.resolve_url(url).unwrap(), url);
    }

    #[test]
    fn test_resolve_rejects_bad_urls() {
        let store = HttpObjectStore::new(None);
        for bad in ["s3://bucket-only", "ftp://x/y"] {
            assert!(matches!(store.resolve_url(bad), Err(TrainingError::InvalidLocator(_))));
        }
    }

    #[test]
    fn test_is_object_url() {
        assert!(is_object_url("s3://b/k"));
        assert!(is_object_url("https://h/k"));
        assert!(!is_object_url("/opt/ml/code"));
    }
}
