//! Image stage: download card art and store it under the row's local id.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::info;

use crate::catalog::client::CatalogClient;
use crate::util::retry::{with_backoff, RetryPolicy};

use super::pool::{spawn_workers, SharedReceiver};

/// Links a committed card row to its remote image: the marketplace product
/// id the image is served under, and the generated row id the file is named
/// after. Held in memory for the run, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImagePair {
    pub remote_id: u64,
    pub local_id: u64,
}

/// Where an image lands on disk. Files keep the remote naming scheme but
/// are keyed by the local row id.
pub fn image_path(dir: &Path, local_id: u64) -> PathBuf {
    dir.join(format!("{local_id}_200w.jpg"))
}

/// Spawn the image pool. Fetches are retried under the backoff budget;
/// writing a fetched image to disk is not retried, a filesystem failure
/// aborts the run. `retrieved` counts stored images across the pool.
pub fn spawn_image_pool(
    workers: usize,
    batches: SharedReceiver<Vec<ImagePair>>,
    client: CatalogClient,
    image_dir: PathBuf,
    retry: RetryPolicy,
    retrieved: Arc<AtomicU64>,
) -> Vec<JoinHandle<Result<()>>> {
    spawn_workers(workers, batches, move |batch: Vec<ImagePair>| {
        let client = client.clone();
        let image_dir = image_dir.clone();
        let retry = retry.clone();
        let retrieved = retrieved.clone();
        async move {
            for pair in batch {
                let body = with_backoff(&retry, &format!("image {}", pair.remote_id), || {
                    client.fetch_image(pair.remote_id)
                })
                .await?;
                let path = image_path(&image_dir, pair.local_id);
                tokio::fs::write(&path, &body)
                    .await
                    .with_context(|| format!("failed to write image {}", path.display()))?;
                let total = retrieved.fetch_add(1, Ordering::SeqCst) + 1;
                if total % 500 == 0 {
                    info!(retrieved = total, "image progress");
                }
            }
            Ok(())
        }
    })
}
