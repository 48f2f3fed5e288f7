//! Bounded worker pool for per-message work.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::error::{Result, TriageError};

/// Run `f` over `items` with at most `concurrency` tasks in flight.
///
/// Results come back in input order, one per item. A task that panics or
/// is cancelled yields a `Worker` error in its own slot and the rest of
/// the batch still completes.
pub async fn run_bounded<I, Item, Fut, F, O>(concurrency: usize, items: I, f: F) -> Vec<Result<O>>
where
    I: IntoIterator<Item = Item>,
    Item: Send + 'static,
    Fut: Future<Output = O> + Send + 'static,
    F: Fn(Item) -> Fut + Send + Sync + 'static,
    O: Send + 'static,
{
    let sem = Arc::new(Semaphore::new(concurrency.max(1)));
    let f = Arc::new(f);
    let mut handles = Vec::new();

    for item in items {
        let permit = match sem.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                handles.push(Err(TriageError::Worker(format!(
                    "Failed to acquire permit: {}",
                    e
                ))));
                continue;
            }
        };
        let f = f.clone();

        handles.push(Ok(tokio::spawn(async move {
            let out = f(item).await;
            drop(permit);
            out
        })));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        let out = match handle {
            Ok(handle) => handle
                .await
                .map_err(|e| TriageError::Worker(format!("Task panicked or was cancelled: {}", e))),
            Err(e) => Err(e),
        };
        results.push(out);
    }
    results
}
