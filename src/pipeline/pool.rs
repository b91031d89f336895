//! Worker-pool plumbing shared by all pipeline stages.
//!
//! Stages hand work between each other over bounded mpsc channels. The
//! receiving end is shared by every worker in a pool behind an async mutex,
//! so each item is claimed by exactly one worker. Producers signal
//! completion by dropping their sender; workers observe the closed channel
//! and exit. There are no end-of-work sentinel values anywhere.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

pub type SharedReceiver<T> = Arc<Mutex<mpsc::Receiver<T>>>;

/// Bounded work queue with a receiver that a whole pool can share.
pub fn work_queue<T>(capacity: usize) -> (mpsc::Sender<T>, SharedReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (tx, Arc::new(Mutex::new(rx)))
}

/// Claim the next work item, or None once the channel is closed and drained.
/// The lock is held only for the duration of the recv so a slow handler
/// never blocks its siblings from claiming work.
pub async fn next_item<T>(rx: &SharedReceiver<T>) -> Option<T> {
    rx.lock().await.recv().await
}

/// Spawn `count` workers that each loop claiming items and running the
/// handler. A worker stops at the first handler error, carrying it in its
/// join handle; the rest keep draining the queue.
pub fn spawn_workers<T, H, Fut>(
    count: usize,
    rx: SharedReceiver<T>,
    handler: H,
) -> Vec<JoinHandle<Result<()>>>
where
    T: Send + 'static,
    H: Fn(T) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send,
{
    (0..count)
        .map(|_| {
            let rx = rx.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                while let Some(item) = next_item(&rx).await {
                    handler(item).await?;
                }
                Ok(())
            })
        })
        .collect()
}

/// Wait for every worker in a pool; the first failure wins. A panicked
/// worker surfaces as an error rather than being swallowed.
pub async fn join_workers(handles: Vec<JoinHandle<Result<()>>>) -> Result<()> {
    let mut first_err = None;
    for joined in join_all(handles).await {
        let result = joined.map_err(anyhow::Error::new).and_then(|r| r);
        if let Err(e) = result {
            first_err.get_or_insert(e);
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
