//! Inbox — in-memory reassembly of multi-chunk messages and streaming
//! chunk-queues per tunnel, plus a stale-entry reaper.
//!
//! Keyed state lives in `DashMap`s rather than behind one global lock, so
//! unrelated request-ids never contend (mirrors the chunk cache/delivery
//! tracker pattern of per-key concurrent maps instead of a single
//! globally-locked `HashMap`).

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

use notetun_core::{RequestId, STALE_TIMEOUT_MS};

/// A complete one-shot `RQST`/`RESP` body, or a streaming chunk map still
/// filling in.
enum ChunkEntry {
    /// Streaming `DATA`: chunk index -> payload, no known total.
    Stream(DashMap<u32, Bytes>),
    /// Multi-chunk one-shot: chunk index -> payload, total known.
    OneShot { total: u32, parts: DashMap<u32, Bytes> },
}

pub struct Inbox {
    /// `"{request_id}:{type}"` -> fully reassembled body.
    complete: DashMap<String, Bytes>,
    /// `"{request_id}:{type}"` -> in-flight chunk state.
    chunks: DashMap<String, ChunkEntry>,
    pending_requests: Mutex<PendingQueue>,
}

struct PendingQueue {
    tx: mpsc::UnboundedSender<(RequestId, Bytes)>,
    rx: mpsc::UnboundedReceiver<(RequestId, Bytes)>,
}

impl Inbox {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            complete: DashMap::new(),
            chunks: DashMap::new(),
            pending_requests: Mutex::new(PendingQueue { tx, rx }),
        })
    }

    /// Store a `DATA` chunk.
    pub fn put_data_chunk(&self, key: &str, chunk: u32, payload: Bytes) {
        let entry = self
            .chunks
            .entry(key.to_string())
            .or_insert_with(|| ChunkEntry::Stream(DashMap::new()));
        match entry.value() {
            ChunkEntry::Stream(map) => {
                map.insert(chunk, payload);
            }
            ChunkEntry::OneShot { .. } => {
                tracing::warn!(key, "DATA chunk arrived for a one-shot key, ignoring");
            }
        }
    }

    pub fn head_chunk(&self, key: &str, chunk: u32) -> bool {
        match self.chunks.get(key) {
            Some(entry) => match entry.value() {
                ChunkEntry::Stream(map) => map.contains_key(&chunk),
                ChunkEntry::OneShot { .. } => false,
            },
            None => false,
        }
    }

    /// Remove and return the chunk at `chunk`, if present. Drops the
    /// per-key map entirely once empty.
    pub fn take_chunk(&self, key: &str, chunk: u32) -> Option<Bytes> {
        let removed = match self.chunks.get(key) {
            Some(entry) => match entry.value() {
                ChunkEntry::Stream(map) => map.remove(&chunk).map(|(_, v)| v),
                ChunkEntry::OneShot { .. } => None,
            },
            None => None,
        }?;

        let should_drop = matches!(
            self.chunks.get(key).map(|e| match e.value() {
                ChunkEntry::Stream(map) => map.is_empty(),
                ChunkEntry::OneShot { .. } => false,
            }),
            Some(true)
        );
        if should_drop {
            self.chunks.remove(key);
        }
        Some(removed)
    }

    /// Record a one-shot `RQST`/`RESP` unit. Pushes onto `pending_requests`
    /// when a complete `RQST` lands and `is_rqst` is set.
    pub async fn store_entry(
        &self,
        key: &str,
        request_id: &RequestId,
        chunk: u32,
        total: u32,
        payload: Bytes,
        is_rqst: bool,
    ) {
        if total <= 1 {
            self.complete.insert(key.to_string(), payload.clone());
            if is_rqst {
                self.push_pending(request_id.clone(), payload).await;
            }
            return;
        }

        let finished_parts = {
            let entry = self
                .chunks
                .entry(key.to_string())
                .or_insert_with(|| ChunkEntry::OneShot {
                    total,
                    parts: DashMap::new(),
                });
            match entry.value() {
                ChunkEntry::OneShot { parts, .. } => {
                    parts.insert(chunk, payload);
                    if parts.len() as u32 == total && (1..=total).all(|i| parts.contains_key(&i)) {
                        Some(
                            (1..=total)
                                .map(|i| parts.get(&i).unwrap().value().clone())
                                .collect::<Vec<_>>(),
                        )
                    } else {
                        None
                    }
                }
                ChunkEntry::Stream(_) => {
                    tracing::warn!(key, "one-shot chunk arrived for a streaming key, ignoring");
                    None
                }
            }
        };

        if let Some(parts) = finished_parts {
            self.chunks.remove(key);
            let mut whole = Vec::new();
            for part in parts {
                whole.extend_from_slice(&part);
            }
            let whole = Bytes::from(whole);
            self.complete.insert(key.to_string(), whole.clone());
            if is_rqst {
                self.push_pending(request_id.clone(), whole).await;
            }
        }
    }

    async fn push_pending(&self, request_id: RequestId, payload: Bytes) {
        let queue = self.pending_requests.lock().await;
        let _ = queue.tx.send((request_id, payload));
    }

    pub fn head(&self, key: &str) -> bool {
        self.complete.contains_key(key)
    }

    pub fn take(&self, key: &str) -> Option<Bytes> {
        self.complete.remove(key).map(|(_, v)| v)
    }

    /// Dequeue the next newly-complete `RQST`, non-blocking.
    pub async fn next_pending_request(&self) -> Option<(RequestId, Bytes)> {
        let mut queue = self.pending_requests.lock().await;
        queue.rx.try_recv().ok()
    }

    /// Drop every streaming `chunks[*]` entry whose request-id timestamp
    /// prefix is older than `STALE_TIMEOUT_MS`.
    pub fn reap_stale(&self, now_ms: u128) {
        let stale_keys: Vec<String> = self
            .chunks
            .iter()
            .filter_map(|entry| {
                let key = entry.key();
                let request_id_part = key.split(':').next()?;
                let created = RequestId::from_string(request_id_part.to_string())
                    .ok()?
                    .created_at_ms()?;
                if now_ms.saturating_sub(created) > STALE_TIMEOUT_MS {
                    Some(key.clone())
                } else {
                    None
                }
            })
            .collect();

        for key in &stale_keys {
            self.chunks.remove(key);
        }
        if !stale_keys.is_empty() {
            tracing::debug!(count = stale_keys.len(), "reaped stale inbox entries");
        }
    }
}

/// Spawn the 60s stale-reaper task.
pub fn spawn_stale_reaper(
    inbox: Arc<Inbox>,
    now_ms_fn: impl Fn() -> u128 + Send + 'static,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            inbox.reap_stale(now_ms_fn());
        }
    })
}
