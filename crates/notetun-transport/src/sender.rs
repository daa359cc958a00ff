//! Sender — batches outgoing units into snippets respecting a hard
//! character budget, dispatches writes through a bounded worker pool with
//! retries and backpressure.
//!
//! The batching loop runs as one spawned task reading off an unbounded
//! queue with a `tokio::select!` around queue receipt and an interval
//! tick; actual PATCH dispatch is fired onto a bounded pool of worker
//! tasks rather than awaited inline, so the sender resumes draining
//! immediately.

use std::sync::Arc;
use std::time::{Duration, Instant};

use notetun_core::{Codec, Direction, Title, Unit, BATCH_TIMEOUT_MS, MAX_SNIPPET_CHARS};
use tokio::sync::{mpsc, Semaphore};

use crate::client::NotesClient;
use crate::pool::{NoteId, NotePool};

/// One batched unit, pre-rendered to its wire form.
struct Rendered {
    title: String,
    encoded: String,
}

pub struct Sender {
    queue_tx: mpsc::UnboundedSender<Unit>,
}

impl Sender {
    /// Spawn the batching loop and return a handle for enqueueing units.
    pub fn spawn(
        direction: Direction,
        codec: Codec,
        notes: Arc<NotesClient>,
        write_pool: Arc<NotePool>,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let permits = Arc::new(Semaphore::new(notetun_core::SEND_POOL_SIZE));

        tokio::spawn(batch_loop(direction, codec, notes, write_pool, queue_rx, permits));

        Self { queue_tx }
    }

    pub fn enqueue(&self, unit: Unit) {
        // Receiver side only drops this if the batch loop has exited
        // (process shutting down); nothing to recover there.
        let _ = self.queue_tx.send(unit);
    }
}

async fn batch_loop(
    direction: Direction,
    codec: Codec,
    notes: Arc<NotesClient>,
    write_pool: Arc<NotePool>,
    mut queue_rx: mpsc::UnboundedReceiver<Unit>,
    permits: Arc<Semaphore>,
) {
    let mut batch: Vec<Rendered> = Vec::new();
    let mut batch_chars = 0usize;
    let mut last_dispatch = Instant::now();
    let timeout = Duration::from_millis(BATCH_TIMEOUT_MS);

    loop {
        let remaining = timeout
            .checked_sub(last_dispatch.elapsed())
            .unwrap_or(Duration::ZERO);

        tokio::select! {
            maybe_unit = queue_rx.recv() => {
                let Some(unit) = maybe_unit else {
                    if !batch.is_empty() {
                        dispatch(direction, &mut batch, &mut batch_chars, notes.clone(), write_pool.clone(), permits.clone()).await;
                    }
                    return;
                };

                let title = unit.title().format();
                let encoded = match codec.encode(&unit.payload) {
                    Ok(e) => e,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to encode outgoing unit, dropping");
                        continue;
                    }
                };

                let item_chars = title.len() + encoded.len() + 2;

                if batch_chars + item_chars > MAX_SNIPPET_CHARS && !batch.is_empty() {
                    dispatch(direction, &mut batch, &mut batch_chars, notes.clone(), write_pool.clone(), permits.clone()).await;
                    last_dispatch = Instant::now();
                }

                batch_chars += item_chars;
                batch.push(Rendered { title, encoded });
            }
            _ = tokio::time::sleep(remaining) => {
                if !batch.is_empty() {
                    dispatch(direction, &mut batch, &mut batch_chars, notes.clone(), write_pool.clone(), permits.clone()).await;
                }
                last_dispatch = Instant::now();
            }
        }
    }
}

/// Acquire a note-id (blocking with backpressure), build the snippet, and
/// fire the PATCH onto the worker pool. Resets `batch`/`batch_chars`.
async fn dispatch(
    direction: Direction,
    batch: &mut Vec<Rendered>,
    batch_chars: &mut usize,
    notes: Arc<NotesClient>,
    write_pool: Arc<NotePool>,
    permits: Arc<Semaphore>,
) {
    let items = std::mem::take(batch);
    *batch_chars = 0;

    let note_id = acquire_with_backpressure(&write_pool).await;

    let snippet = items
        .iter()
        .map(|r| format!("{}\t{}", r.title, r.encoded))
        .collect::<Vec<_>>()
        .join("\n");
    let outer_title = direction.marker().to_string();

    tokio::spawn(async move {
        let _permit = permits.acquire_owned().await.expect("semaphore never closed");
        match notes.patch_note(&note_id.0, &outer_title, &snippet).await {
            Ok(()) => {
                tracing::debug!(note_id = %note_id, units = items.len(), "batch dispatched");
            }
            Err(e) => {
                tracing::warn!(note_id = %note_id, error = %e, "batch dispatch failed permanently, releasing note");
                write_pool.release(&note_id);
            }
        }
    });
}

async fn acquire_with_backpressure(pool: &NotePool) -> NoteId {
    let mut waited = Duration::ZERO;
    let poll_interval = Duration::from_millis(100);
    let log_interval = Duration::from_secs(5);
    let mut next_log = log_interval;

    loop {
        if let Some(id) = pool.try_acquire() {
            return id;
        }
        tokio::time::sleep(poll_interval).await;
        waited += poll_interval;
        if waited >= next_log {
            tracing::warn!(waited_secs = waited.as_secs(), "sender backpressure: no free note-id");
            next_log += log_interval;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::NoteId;
    use notetun_core::{RequestId, UnitType};

    #[tokio::test]
    async fn acquire_with_backpressure_unblocks_on_release() {
        let pool = Arc::new(NotePool::new(vec![NoteId("1_1_1".to_string())]));
        let held = pool.try_acquire().unwrap();
        assert_eq!(pool.free_count(), 0);

        let pool2 = pool.clone();
        let waiter = tokio::spawn(async move { acquire_with_backpressure(&pool2).await });

        tokio::time::sleep(Duration::from_millis(150)).await;
        pool.release(&held);

        let acquired = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish shortly after release")
            .unwrap();
        assert_eq!(acquired, NoteId("1_1_1".to_string()));
    }

    #[test]
    fn rendered_item_char_count_matches_title_plus_encoded_plus_two() {
        let title = Title {
            direction: Direction::ClientToWorker,
            request_id: RequestId::new(1700000000000),
            chunk: 1,
            total: 1,
            unit_type: UnitType::Rqst,
        }
        .format();
        let encoded = "abc".to_string();
        let item_chars = title.len() + encoded.len() + 2;
        assert_eq!(item_chars, title.len() + 3 + 2);
    }
}
