//! Fetch stage: turn queued search requests into pages of card records.

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::catalog::client::CatalogClient;
use crate::catalog::types::{CardAttrs, RequestPayload, ResponsePayload};
use crate::util::retry::{with_backoff, RetryPolicy};

use super::pool::{spawn_workers, SharedReceiver};

/// Extract the card records of one page. Pages reporting zero total results
/// carry nothing worth writing and are dropped here.
pub fn page_records(response: ResponsePayload) -> Option<Vec<CardAttrs>> {
    let result = response.results.into_iter().next()?;
    if result.total_results == 0.0 {
        return None;
    }
    Some(result.results)
}

/// Spawn the fetch pool. Each worker claims a search request, retries it
/// under the backoff budget, and forwards the page downstream. A send
/// failure means the downstream pool is gone, which the writer side reports
/// itself, so the worker just stops.
pub fn spawn_fetch_pool(
    workers: usize,
    requests: SharedReceiver<RequestPayload>,
    pages: mpsc::Sender<Vec<CardAttrs>>,
    client: CatalogClient,
    retry: RetryPolicy,
) -> Vec<JoinHandle<Result<()>>> {
    spawn_workers(workers, requests, move |request: RequestPayload| {
        let client = client.clone();
        let pages = pages.clone();
        let retry = retry.clone();
        async move {
            let label = request.label().to_string();
            let response =
                with_backoff(&retry, &format!("search {label}"), || client.search(&request))
                    .await?;
            match page_records(response) {
                Some(records) => {
                    debug!(label = %label, records = records.len(), "page fetched");
                    if pages.send(records).await.is_err() {
                        return Ok(());
                    }
                }
                None => debug!(label = %label, "page reported zero results, dropped"),
            }
            Ok(())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::SearchResult;

    fn page(total: f64, records: usize) -> ResponsePayload {
        ResponsePayload {
            errors: vec![],
            results: vec![SearchResult {
                total_results: total,
                results: vec![CardAttrs::default(); records],
                ..SearchResult::default()
            }],
        }
    }

    #[test]
    fn zero_total_pages_are_dropped() {
        assert!(page_records(page(0.0, 3)).is_none());
        assert!(page_records(ResponsePayload::default()).is_none());
    }

    #[test]
    fn record_counts_sum_over_non_zero_pages() {
        let pages = vec![page(61.0, 50), page(0.0, 4), page(61.0, 11), page(12.0, 12)];
        let total: usize = pages
            .into_iter()
            .filter_map(page_records)
            .map(|records| records.len())
            .sum();
        assert_eq!(total, 73);
    }
}
