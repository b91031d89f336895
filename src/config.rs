use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use crate::util::env::{env_opt, env_parse, env_req};
use crate::util::retry::RetryPolicy;

/// Default search endpoint for card data.
const DEFAULT_SEARCH_URL: &str = "https://mpapi.tcgplayer.com/v2/search/request?q=&isList=false";

/// Default base URL for card images.
const DEFAULT_IMAGE_URL: &str = "https://tcgplayer-cdn.tcgplayer.com/product";

/// Immutable configuration for one ingestion run. Constructed once in main
/// and passed into each component; nothing reads ambient globals after this.
#[derive(Debug, Clone)]
pub struct Config {
    pub search_url: String,
    pub image_base_url: String,
    pub image_dir: PathBuf,
    pub search_timeout: Duration,
    pub shipping_country: String,
    pub db_max_connections: u32,
    pub db_idle_connections: u32,
    /// Workers per pool: 2x available parallelism, matching the upstream
    /// heuristic. Fixed per run, not tunable per call.
    pub workers: usize,
    pub channel_capacity: usize,
    pub image_batch_size: usize,
    pub retry: RetryPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            * 2;

        Ok(Self {
            search_url: env_opt("SEARCH_URL").unwrap_or_else(|| DEFAULT_SEARCH_URL.to_string()),
            image_base_url: env_opt("IMAGE_URL").unwrap_or_else(|| DEFAULT_IMAGE_URL.to_string()),
            image_dir: PathBuf::from(env_req("IMG_DIR")?),
            search_timeout: Duration::from_secs(env_parse("SEARCH_TIMEOUT_SECS", 40)),
            shipping_country: env_opt("SHIPPING_COUNTRY").unwrap_or_else(|| "US".to_string()),
            db_max_connections: env_parse("DB_MAX_CONNS", 10),
            db_idle_connections: env_parse("DB_IDLE_CONNS", 10),
            workers,
            channel_capacity: workers * 2,
            // chunking panics on a zero batch size, so floor at 1
            image_batch_size: env_parse("IMAGE_BATCH_SIZE", 100usize).max(1),
            retry: RetryPolicy {
                max_attempts: env_parse("RETRY_MAX_ATTEMPTS", 10),
                initial_backoff: Duration::from_millis(env_parse("RETRY_INITIAL_BACKOFF_MS", 500)),
                max_backoff: Duration::from_secs(env_parse("RETRY_MAX_BACKOFF_SECS", 30)),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_image_batch_size_is_floored_to_one() {
        std::env::set_var("IMG_DIR", "/tmp/tcg-images");
        std::env::set_var("IMAGE_BATCH_SIZE", "0");

        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.image_batch_size, 1);

        std::env::remove_var("IMAGE_BATCH_SIZE");
        std::env::remove_var("IMG_DIR");
    }
}
