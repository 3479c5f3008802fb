//! Batched concurrent processing with per-item failure isolation

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::retry::delay;

/// Batch tuning, as read from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSettings {
    /// Items in flight at once
    #[serde(default = "default_batch_size")]
    pub size: usize,
    /// Pause between consecutive batches
    #[serde(default = "default_batch_delay_ms")]
    pub delay_ms: u64,
}

fn default_batch_size() -> usize { 5 }
fn default_batch_delay_ms() -> u64 { 200 }

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            size: default_batch_size(),
            delay_ms: default_batch_delay_ms(),
        }
    }
}

impl BatchSettings {
    pub fn new(size: usize, delay: Duration) -> Self {
        Self {
            size,
            delay_ms: delay.as_millis() as u64,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Run `worker` over `items` in contiguous groups of `batch_size`
///
/// Items within a group are polled concurrently on the current task. A
/// failing item produces `None` at its index without affecting its
/// siblings. The output has exactly one slot per input, in input order.
/// `inter_batch_delay` is awaited between groups, never after the last.
pub async fn batch_process<I, R, E, F, Fut>(
    items: &[I],
    worker: F,
    batch_size: usize,
    inter_batch_delay: Duration,
) -> Vec<Option<R>>
where
    F: Fn(&I) -> Fut,
    Fut: Future<Output = Result<R, E>>,
    E: Display,
{
    let batch_size = batch_size.max(1);
    let batch_count = items.len().div_ceil(batch_size);
    let mut results = Vec::with_capacity(items.len());

    for (batch_index, group) in items.chunks(batch_size).enumerate() {
        debug!(batch = batch_index + 1, of = batch_count, items = group.len(), "Processing batch");

        let outcomes = join_all(group.iter().map(&worker)).await;
        for (offset, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(value) => results.push(Some(value)),
                Err(e) => {
                    warn!(index = batch_index * batch_size + offset, error = %e, "Batch item failed");
                    results.push(None);
                }
            }
        }

        if batch_index + 1 < batch_count {
            delay(inter_batch_delay).await;
        }
    }

    results
}
