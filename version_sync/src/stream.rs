//! Bounded-concurrency producer/consumer scheduling.
//!
//! [`run`] pairs one producer future with a dispatcher that spawns a consumer task per
//! item, never more than `limit` at once. Items travel through a bounded queue, so a
//! producer that outruns the consumers is suspended in [`Enqueuer::enqueue`] instead of
//! buffering without limit.
//!
//! Streams nest: the producer of one stream may drive another stream whose consumers
//! hold clones of the first stream's [`Enqueuer`].

use std::{future::Future, sync::Arc};

use tokio::{
    sync::{Semaphore, mpsc},
    task::{JoinError, JoinSet},
};

/// The stream finished dispatching and no longer accepts items.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("stream is no longer accepting items")]
pub struct StreamClosed;

/// Cloneable handle for feeding items into a running stream.
#[derive(Debug)]
pub struct Enqueuer<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Clone for Enqueuer<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> Enqueuer<T> {
    /// Hands `item` to the dispatcher, waiting while the queue is full.
    pub async fn enqueue(&self, item: T) -> Result<(), StreamClosed> {
        self.tx.send(item).await.map_err(|_| StreamClosed)
    }
}

/// Runs `produce` and consumes everything it enqueues with at most `limit` consumers
/// in flight (`0` behaves as `1`).
///
/// Returns once the producer has finished, every [`Enqueuer`] clone is gone and every
/// item has been consumed. Results are in completion order. A panicking consumer
/// panics the caller with the same payload.
pub async fn run<T, R, P, PFut, C, CFut>(
    limit: usize,
    produce: P,
    consume: C,
) -> (PFut::Output, Vec<R>)
where
    T: Send + 'static,
    R: Send + 'static,
    P: FnOnce(Enqueuer<T>) -> PFut,
    PFut: Future,
    C: Fn(T) -> CFut,
    CFut: Future<Output = R> + Send + 'static,
{
    let limit = limit.max(1);
    let (tx, mut rx) = mpsc::channel::<T>(limit);
    let producer = produce(Enqueuer { tx });

    let dispatcher = async move {
        let permits = Arc::new(Semaphore::new(limit));
        let mut tasks = JoinSet::new();
        let mut results = Vec::new();

        while let Some(item) = rx.recv().await {
            let permit = match Arc::clone(&permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::error!("stream semaphore closed unexpectedly");
                    break;
                }
            };
            while let Some(done) = tasks.try_join_next() {
                collect(done, &mut results);
            }
            let fut = consume(item);
            tasks.spawn(async move {
                let out = fut.await;
                drop(permit);
                out
            });
        }

        while let Some(done) = tasks.join_next().await {
            collect(done, &mut results);
        }
        results
    };

    tokio::join!(producer, dispatcher)
}

fn collect<R>(done: Result<R, JoinError>, results: &mut Vec<R>) {
    match done {
        Ok(r) => results.push(r),
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => tracing::warn!(error = %e, "consumer task cancelled"),
    }
}
