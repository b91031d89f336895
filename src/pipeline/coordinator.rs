//! Run coordinator: drives one product line through the ingestion phases
//! and joins each worker pool before the next phase begins.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::sync::mpsc;
use tracing::{info, instrument};

use crate::catalog::client::CatalogClient;
use crate::catalog::types::RequestPayload;
use crate::config::Config;
use crate::ingest::records::{builder_for, product_line_row, set_rows};
use crate::ingest::store::Store;
use crate::util::retry::with_backoff;

use super::fetch::spawn_fetch_pool;
use super::images::{spawn_image_pool, ImagePair};
use super::pool::{join_workers, work_queue};
use super::write::spawn_write_pool;

/// Phases of one ingestion run, in execution order. Card data is fully
/// committed before any image work starts, so an image failure can never
/// leave partial card state behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    WriteCatalogHeader,
    WriteSets,
    BuildIndex,
    FetchAndWrite,
    DrainCards,
    FetchImages,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::WriteCatalogHeader => "write-catalog-header",
            Phase::WriteSets => "write-sets",
            Phase::BuildIndex => "build-index",
            Phase::FetchAndWrite => "fetch-and-write",
            Phase::DrainCards => "drain-cards",
            Phase::FetchImages => "fetch-images",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

fn enter(phase: Phase) {
    info!(%phase, "phase");
}

pub struct Coordinator {
    cfg: Config,
    client: CatalogClient,
    store: Store,
}

impl Coordinator {
    pub fn new(cfg: Config, client: CatalogClient, store: Store) -> Self {
        Self { cfg, client, store }
    }

    fn request(&self, product_line: &str, product_type: &str, set: &str, size: u32) -> RequestPayload {
        let mut payload = RequestPayload::new(product_line, product_type, set, size);
        payload.context.shipping_country = self.cfg.shipping_country.clone();
        payload
    }

    /// Ingest one product line end to end.
    #[instrument(skip(self))]
    pub async fn run(&self, product_line: &str) -> Result<()> {
        // Probe with size 0: aggregations only, no records.
        let probe = self.request(product_line, "", "", 0);
        let response = with_backoff(&self.cfg.retry, &format!("probe {product_line}"), || {
            self.client.search(&probe)
        })
        .await?;
        let result = response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("probe for {product_line} returned no result"))?;

        let header = product_line_row(&result)
            .ok_or_else(|| anyhow!("no active product line in probe for {product_line}"))?;
        let builder = builder_for(&header.url_name)
            .ok_or_else(|| anyhow!("no record builder registered for {}", header.url_name))?;
        let product_type = result
            .aggregations
            .product_type_name
            .first()
            .map(|entry| entry.url_value.clone())
            .ok_or_else(|| anyhow!("probe for {product_line} reported no product type"))?;

        enter(Phase::WriteCatalogHeader);
        let product_line_id = self.store.write_product_line(&header).await?;
        info!(
            name = %header.name,
            sets = header.set_count,
            cards = header.card_count,
            "catalog header written"
        );

        enter(Phase::WriteSets);
        let sets = set_rows(product_line_id, &result.aggregations.set_name);
        self.store.write_sets(&sets).await?;

        enter(Phase::BuildIndex);
        let index = Arc::new(self.store.build_set_index(product_line_id).await?);
        if index.is_empty() {
            return Err(anyhow!("set index for {product_line} is empty"));
        }

        enter(Phase::FetchAndWrite);
        let (request_tx, request_rx) = work_queue(self.cfg.channel_capacity);
        let (page_tx, page_rx) = work_queue(self.cfg.channel_capacity);
        let (pair_tx, mut pair_rx) = mpsc::channel::<Vec<ImagePair>>(self.cfg.channel_capacity);

        let fetchers = spawn_fetch_pool(
            self.cfg.workers,
            request_rx,
            page_tx,
            self.client.clone(),
            self.cfg.retry.clone(),
        );
        let writers = spawn_write_pool(
            self.cfg.workers,
            page_rx,
            pair_tx,
            self.store.clone(),
            index,
            builder,
        );
        let collector = tokio::spawn(async move {
            let mut pairs = Vec::new();
            while let Some(batch) = pair_rx.recv().await {
                pairs.extend(batch);
            }
            pairs
        });

        for set in &result.aggregations.set_name {
            let request =
                self.request(&header.url_name, &product_type, &set.url_value, set.count as u32);
            if request_tx.send(request).await.is_err() {
                // fetch pool already stopped; the join below reports why
                break;
            }
        }
        drop(request_tx);
        join_workers(fetchers).await.context("fetch pool failed")?;

        enter(Phase::DrainCards);
        join_workers(writers).await.context("write pool failed")?;
        let pairs = collector.await.context("image pair collector panicked")?;
        info!(cards = pairs.len(), "card phase complete");

        enter(Phase::FetchImages);
        tokio::fs::create_dir_all(&self.cfg.image_dir)
            .await
            .with_context(|| {
                format!("failed to create image dir {}", self.cfg.image_dir.display())
            })?;
        let retrieved = Arc::new(AtomicU64::new(0));
        let (batch_tx, batch_rx) = work_queue(self.cfg.channel_capacity);
        let downloaders = spawn_image_pool(
            self.cfg.workers,
            batch_rx,
            self.client.clone(),
            self.cfg.image_dir.clone(),
            self.cfg.retry.clone(),
            retrieved.clone(),
        );
        let mut dispatched = 0usize;
        for chunk in pairs.chunks(self.cfg.image_batch_size) {
            if batch_tx.send(chunk.to_vec()).await.is_err() {
                break;
            }
            dispatched += chunk.len();
            info!(dispatched, total = pairs.len(), "images dispatched");
        }
        drop(batch_tx);
        join_workers(downloaders).await.context("image pool failed")?;

        enter(Phase::Done);
        info!(
            product_line = %header.name,
            images = retrieved.load(Ordering::SeqCst),
            "ingestion run complete"
        );
        Ok(())
    }
}
