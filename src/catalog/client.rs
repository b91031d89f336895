use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use reqwest::Client;
use tracing::debug;

use crate::config::Config;

use super::types::{RequestPayload, ResponsePayload};

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/86.0.4240.198 Safari/537.36";

/// Client for the marketplace search and image endpoints. Endpoint URLs and
/// the per-call timeout come from the immutable run config. Cheap to clone;
/// every worker in a pool shares the same underlying connection pool.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: Client,
    search_url: String,
    image_base_url: String,
    search_timeout: Duration,
}

impl CatalogClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            search_url: cfg.search_url.clone(),
            image_base_url: cfg.image_base_url.clone(),
            search_timeout: cfg.search_timeout,
        })
    }

    /// One search request/response exchange. Transport errors, non-2xx
    /// statuses and decode failures are all errors; the caller decides
    /// whether to retry.
    pub async fn search(&self, payload: &RequestPayload) -> Result<ResponsePayload> {
        debug!(label = payload.label(), "search request");
        let response = self
            .http
            .post(&self.search_url)
            .timeout(self.search_timeout)
            // The service rejects requests that don't look like they come
            // from the storefront, so mimic its browser headers.
            .header("request-url", &self.search_url)
            .header("authority", "mpapi.tcgplayer.com")
            .header("accept", "application/json, text/plain, */*")
            .header("accept-language", "en-US,en;q=0.9")
            .header("origin", "https://www.tcgplayer.com")
            .header("referer", "https://www.tcgplayer.com/")
            .json(payload)
            .header("content-type", "application/json;charset=UTF-8")
            .send()
            .await
            .context("search request failed")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("search returned http status {status}"));
        }
        let decoded = response
            .json::<ResponsePayload>()
            .await
            .context("failed to decode search response")?;
        Ok(decoded)
    }

    pub fn image_url(&self, remote_id: u64) -> String {
        format!("{}/{}_200w.jpg", self.image_base_url, remote_id)
    }

    /// Fetch one card image. The whole body is read here so that a mid-body
    /// failure surfaces as a single retryable error.
    pub async fn fetch_image(&self, remote_id: u64) -> Result<Bytes> {
        let url = self.image_url(remote_id);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("image request failed: {url}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("image {url} returned http status {status}"));
        }
        response
            .bytes()
            .await
            .with_context(|| format!("failed to read image body: {url}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use crate::util::retry::RetryPolicy;

    fn test_config() -> Config {
        Config {
            search_url: "https://example.test/search".into(),
            image_base_url: "https://cdn.example.test/product".into(),
            image_dir: PathBuf::from("/tmp/images"),
            search_timeout: Duration::from_secs(5),
            shipping_country: "US".into(),
            db_max_connections: 1,
            db_idle_connections: 1,
            workers: 2,
            channel_capacity: 4,
            image_batch_size: 10,
            retry: RetryPolicy::default(),
        }
    }

    #[test]
    fn image_url_is_remote_id_with_size_suffix() {
        let client = CatalogClient::new(&test_config()).unwrap();
        assert_eq!(
            client.image_url(39111),
            "https://cdn.example.test/product/39111_200w.jpg"
        );
    }
}
