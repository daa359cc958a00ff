//! Receiver — long-polls the revision delta feed, filters notes belonging
//! to the read pool, parses the packed snippet, decrypts, and dispatches
//! parsed units into the inbox.
//!
//! One long-running poll task drives ingestion; each qualifying delta is
//! handed to a bounded processing pool rather than processed inline, so
//! one slow snippet can't stall the poll loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notetun_core::{Codec, Direction, Title, POLL_INTERVAL_MS};
use regex::Regex;
use tokio::sync::Semaphore;

use crate::client::{DeltaChange, NotesClient};
use crate::inbox::Inbox;
use crate::pool::{NoteId, NotePool};

const DELTA_LIMIT: u32 = 100;

fn note_id_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(notetun_core::NOTE_ID_PATTERN).unwrap())
}

pub struct Receiver {
    revision: AtomicU64,
}

impl Receiver {
    pub fn new(initial_revision: u64) -> Arc<Self> {
        Arc::new(Self {
            revision: AtomicU64::new(initial_revision),
        })
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Spawn the long-poll loop.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        self: Arc<Self>,
        recv_direction: Direction,
        codec: Codec,
        notes: Arc<NotesClient>,
        own_write_pool: Arc<NotePool>,
        read_pool: Arc<NotePool>,
        inbox: Arc<Inbox>,
        process_permits: Arc<Semaphore>,
        clear_permits: Arc<Semaphore>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let base_revision = self.revision();
                match notes.fetch_deltas(base_revision, DELTA_LIMIT).await {
                    Ok(resp) => {
                        let mut applicable = false;
                        for item in &resp.items {
                            for change in &item.changes {
                                if handle_change(
                                    recv_direction,
                                    &codec,
                                    &notes,
                                    &own_write_pool,
                                    &read_pool,
                                    &inbox,
                                    &process_permits,
                                    &clear_permits,
                                    change,
                                ) {
                                    applicable = true;
                                }
                            }
                        }
                        self.revision.store(resp.revision, Ordering::SeqCst);

                        if !applicable {
                            tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "delta poll failed");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        })
    }
}

/// Apply §4.5's filtering chain to one delta change. Returns whether it
/// was "applicable" (affects the adaptive-poll cadence).
#[allow(clippy::too_many_arguments)]
fn handle_change(
    recv_direction: Direction,
    codec: &Codec,
    notes: &Arc<NotesClient>,
    own_write_pool: &Arc<NotePool>,
    read_pool: &Arc<NotePool>,
    inbox: &Arc<Inbox>,
    process_permits: &Arc<Semaphore>,
    clear_permits: &Arc<Semaphore>,
    change: &DeltaChange,
) -> bool {
    if change.change_type != "update" {
        return false;
    }
    if !note_id_regex().is_match(&change.record_id) {
        return false;
    }

    let title_field = field_value(change, "title");
    let snippet_field = field_value(change, "snippet");
    let note_id = NoteId(change.record_id.clone());

    // 1. Peer-clear observation on our own write pool. Only the actual
    // release counts as applicable; seeing our own prior write echoed
    // back non-empty is a no-op and must not defeat the idle sleep.
    if own_write_pool.contains(&note_id) {
        if title_field.as_deref().unwrap_or("").is_empty()
            && snippet_field.as_deref().unwrap_or("").is_empty()
        {
            own_write_pool.release(&note_id);
            return true;
        }
        return false;
    }

    // 2. Must belong to the read pool (peer's write pool).
    if !read_pool.contains(&note_id) {
        return false;
    }

    let (Some(title), Some(snippet)) = (title_field, snippet_field) else {
        return false;
    };
    // 3. Empty fields carry nothing.
    if title.is_empty() || snippet.is_empty() {
        return false;
    }
    // 4. Outer title's marker must match this role's recv_direction.
    if title.chars().next() != Some(recv_direction.marker()) {
        return false;
    }

    let codec = codec.clone();
    let notes = notes.clone();
    let inbox = inbox.clone();
    let process_permits = process_permits.clone();
    let clear_permits = clear_permits.clone();
    let note_id_for_task = note_id.clone();

    tokio::spawn(async move {
        let _permit = process_permits
            .acquire_owned()
            .await
            .expect("semaphore never closed");
        process_snippet(&codec, &inbox, &snippet).await;

        let _clear_permit = clear_permits
            .acquire_owned()
            .await
            .expect("semaphore never closed");
        if let Err(e) = notes.patch_note(&note_id_for_task.0, "", "").await {
            tracing::warn!(note_id = %note_id_for_task, error = %e, "failed to clear consumed note");
        }
    });

    true
}

fn field_value(change: &DeltaChange, field_id: &str) -> Option<String> {
    change
        .changes
        .iter()
        .find(|c| c.field_id == field_id)
        .and_then(|c| c.value.string.clone())
}

async fn process_snippet(codec: &Codec, inbox: &Arc<Inbox>, snippet: &str) {
    for line in snippet.split('\n') {
        let Some((title_str, encoded)) = line.split_once('\t') else {
            tracing::debug!("skipping malformed snippet line with no tab");
            continue;
        };

        let title = match Title::parse(title_str) {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!(error = %e, "skipping line with malformed title");
                continue;
            }
        };

        let payload = match codec.decode(encoded) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(error = %e, "skipping line with undecodable payload");
                continue;
            }
        };

        dispatch_unit(inbox, title, payload).await;
    }
}

async fn dispatch_unit(inbox: &Arc<Inbox>, title: Title, payload: Vec<u8>) {
    use notetun_core::UnitType;

    let key = format!("{}:{}", title.request_id, title.unit_type);
    match title.unit_type {
        UnitType::Data => {
            inbox.put_data_chunk(&key, title.chunk, payload.into());
        }
        UnitType::Rqst | UnitType::Resp => {
            inbox
                .store_entry(
                    &key,
                    &title.request_id,
                    title.chunk,
                    title.total,
                    payload.into(),
                    title.unit_type == UnitType::Rqst,
                )
                .await;
        }
    }
}
