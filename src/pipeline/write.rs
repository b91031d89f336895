//! Write stage: commit fetched pages as card rows and emit the image work
//! each commit produces.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::catalog::types::CardAttrs;
use crate::ingest::records::{CardRecordBuilder, CardRow};
use crate::ingest::set_index::SetIndex;
use crate::ingest::store::{CommittedBatch, Store};

use super::images::ImagePair;
use super::pool::{spawn_workers, SharedReceiver};

/// Pair each committed row's remote product id with its generated local id.
/// Holds because the engine assigns consecutive ids to the rows of a single
/// multi-row insert and `rows` is the batch in insert order.
pub fn image_pairs(committed: &CommittedBatch, rows: &[CardRow]) -> Vec<ImagePair> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| ImagePair {
            remote_id: row.product_id,
            local_id: committed.first_id + i as u64,
        })
        .collect()
}

/// Spawn the write pool. Each worker claims one fetched page, builds its
/// rows, commits them with duplicate conflicts resolved, and forwards the
/// resulting image pairs to the collector.
pub fn spawn_write_pool(
    workers: usize,
    pages: SharedReceiver<Vec<CardAttrs>>,
    pairs: mpsc::Sender<Vec<ImagePair>>,
    store: Store,
    index: Arc<SetIndex>,
    builder: &'static dyn CardRecordBuilder,
) -> Vec<JoinHandle<Result<()>>> {
    spawn_workers(workers, pages, move |page: Vec<CardAttrs>| {
        let store = store.clone();
        let index = index.clone();
        let pairs = pairs.clone();
        async move {
            let rows = builder.build(&page, &index);
            if rows.is_empty() {
                debug!("page produced no storable rows");
                return Ok(());
            }
            let (committed, kept) = store.insert_cards_resolving_conflicts(rows).await?;
            debug!(
                first_id = committed.first_id,
                rows = committed.row_count,
                "card batch committed"
            );
            if committed.row_count == 0 {
                return Ok(());
            }
            let batch = image_pairs(&committed, &kept);
            if pairs.send(batch).await.is_err() {
                // collector is gone; the coordinator will report why
                return Ok(());
            }
            Ok(())
        }
    })
}
