//! Bounded fan-out for independent work items.

use std::future::Future;

use anyhow::{Result, anyhow, bail};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::Semaphore;

/// Position of an item in its batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemContext {
    /// Zero-based input position.
    pub index: usize,
    pub total: usize,
}

/// Run `work` over every item with at most `limit` in flight.
///
/// Items do not affect each other: `work` reports failures in its own
/// output type, and nothing is retried. Results come back in input order.
pub async fn run_bounded<T, R, F, Fut>(items: Vec<T>, limit: usize, work: F) -> Result<Vec<R>>
where
    F: Fn(T, ItemContext) -> Fut,
    Fut: Future<Output = R>,
{
    if limit == 0 {
        bail!("concurrency limit must be > 0");
    }
    let total = items.len();
    let semaphore = Semaphore::new(limit);
    let mut pending = FuturesUnordered::new();

    for (index, item) in items.into_iter().enumerate() {
        let semaphore = &semaphore;
        let work = &work;
        pending.push(async move {
            let _permit = semaphore
                .acquire()
                .await
                .map_err(|_| anyhow!("semaphore closed"))?;
            let output = work(item, ItemContext { index, total }).await;
            Ok::<_, anyhow::Error>((index, output))
        });
    }

    let mut slots: Vec<Option<R>> = (0..total).map(|_| None).collect();
    while let Some(finished) = pending.next().await {
        let (index, output) = finished?;
        slots[index] = Some(output);
    }
    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| slot.ok_or_else(|| anyhow!("item {index} produced no result")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Verifies the in-flight count never exceeds the limit.
    #[tokio::test]
    async fn concurrency_is_bounded() {
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        let results = run_bounded((0..8).collect(), 3, |item: u64, ctx| {
            let in_flight = &in_flight;
            let peak = &peak;
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10 * (8 - item))).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                (ctx.index, ctx.total, item * 2)
            }
        })
        .await
        .expect("batch");

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(results.len(), 8);
        for (position, (index, total, doubled)) in results.into_iter().enumerate() {
            assert_eq!(index, position);
            assert_eq!(total, 8);
            assert_eq!(doubled, position as u64 * 2);
        }
    }

    #[tokio::test]
    async fn zero_limit_is_rejected() {
        let err = run_bounded(vec![1], 0, |item: i32, _| async move { item })
            .await
            .expect_err("limit");
        assert!(err.to_string().contains("limit"));
    }

    #[tokio::test]
    async fn empty_batch_yields_nothing() {
        let results: Vec<i32> = run_bounded(Vec::new(), 2, |item: i32, _| async move { item })
            .await
            .expect("batch");
        assert!(results.is_empty());
    }
}
