//! Bounded concurrency batch scraping
//!
//! A fixed number of logical workers drain a shared FIFO queue of scene ids.
//! Workers are futures polled together on the calling task, so the pool
//! never spawns threads or tasks of its own. Results collect in a pending
//! buffer that is flushed every `batch_size` results and once more after the
//! last worker exits.
//!
//! Cancellation is cooperative: a worker checks the token before taking the
//! next id, so in-flight scrapes finish and their results are kept while the
//! rest of the queue is discarded.

use futures::future::join_all;
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// Number of logical workers
pub const CONCURRENCY: usize = 4;

/// Pending results that trigger a flush
pub const BATCH_SIZE: usize = 5;

/// Outcome of a batch run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub requested: usize,
    pub completed: usize,
    pub flushes: usize,
    pub cancelled: bool,
}

pub struct WorkerPool {
    concurrency: usize,
    batch_size: usize,
    cancel: CancellationToken,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl WorkerPool {
    pub fn new(cancel: CancellationToken) -> Self {
        Self::with_limits(CONCURRENCY, BATCH_SIZE, cancel)
    }

    pub fn with_limits(concurrency: usize, batch_size: usize, cancel: CancellationToken) -> Self {
        Self {
            concurrency: concurrency.max(1),
            batch_size: batch_size.max(1),
            cancel,
        }
    }

    /// Scrape every id, flushing results in batches
    ///
    /// # Arguments
    /// * `ids` - Scene ids in processing order
    /// * `scrape` - Produces the result for one id; failures must be encoded
    ///   in the result so one item cannot abort the batch
    /// * `flush` - Receives each batch of results
    pub async fn run<T, S, Fut, F>(&self, ids: Vec<String>, scrape: S, flush: F) -> BatchReport
    where
        S: Fn(String) -> Fut,
        Fut: Future<Output = T>,
        F: FnMut(BTreeMap<String, T>),
    {
        let requested = ids.len();
        let queue = Mutex::new(VecDeque::from(ids));
        let pending: Mutex<BTreeMap<String, T>> = Mutex::new(BTreeMap::new());
        let flush = Mutex::new(flush);
        let completed = Mutex::new(0usize);
        let flushes = Mutex::new(0usize);

        let emit = |batch: BTreeMap<String, T>| {
            if batch.is_empty() {
                return;
            }
            tracing::debug!(size = batch.len(), "Flushing scrape results");
            (&mut *lock(&flush))(batch);
            *lock(&flushes) += 1;
        };

        let worker = |worker_id: usize| {
            let (queue, pending, completed, scrape, emit) =
                (&queue, &pending, &completed, &scrape, &emit);
            async move {
                loop {
                    if self.cancel.is_cancelled() {
                        tracing::debug!(worker_id, "Worker observed cancellation");
                        break;
                    }
                    let Some(id) = lock(queue).pop_front() else {
                        break;
                    };

                    let result = scrape(id.clone()).await;
                    *lock(completed) += 1;

                    let batch = {
                        let mut pending = lock(pending);
                        pending.insert(id, result);
                        if pending.len() >= self.batch_size {
                            Some(std::mem::take(&mut *pending))
                        } else {
                            None
                        }
                    };
                    if let Some(batch) = batch {
                        emit(batch);
                    }
                }
            }
        };

        join_all((0..self.concurrency).map(worker)).await;

        let remainder = std::mem::take(&mut *lock(&pending));
        emit(remainder);

        let report = BatchReport {
            requested,
            completed: *lock(&completed),
            flushes: *lock(&flushes),
            cancelled: self.cancel.is_cancelled(),
        };

        tracing::info!(
            requested = report.requested,
            completed = report.completed,
            flushes = report.flushes,
            cancelled = report.cancelled,
            "Batch scrape finished"
        );

        report
    }
}
