//! Note pool — bag of note-ids split into free/busy sets for one role's
//! write pool.
//!
//! A note-id is in exactly one of `{free, busy}` at all times (invariant 1
//! of the data model): `acquire` moves one from free to busy, `release`
//! moves it back and is idempotent. Contention (no free note-id at acquire
//! time) is the sender's problem — this type only exposes `try_acquire`;
//! the blocking/backpressure loop lives in `sender`.

use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NoteId(pub String);

impl std::fmt::Display for NoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NoteId {
    fn from(s: String) -> Self {
        NoteId(s)
    }
}

struct PoolState {
    free: HashSet<NoteId>,
    busy: HashSet<NoteId>,
}

/// One role's write pool: the note-ids that role, and only that role, ever
/// writes to.
pub struct NotePool {
    state: Mutex<PoolState>,
}

impl NotePool {
    pub fn new(note_ids: impl IntoIterator<Item = NoteId>) -> Self {
        Self {
            state: Mutex::new(PoolState {
                free: note_ids.into_iter().collect(),
                busy: HashSet::new(),
            }),
        }
    }

    /// Remove and return an arbitrary element from `free`, moving it to
    /// `busy`. Returns `None` if no note-id is free right now.
    pub fn try_acquire(&self) -> Option<NoteId> {
        let mut state = self.state.lock().unwrap();
        let id = state.free.iter().next().cloned()?;
        state.free.remove(&id);
        state.busy.insert(id.clone());
        Some(id)
    }

    /// Move a note-id from `busy` back to `free`. Idempotent: calling this
    /// on a note-id that's already free (or unknown) is a no-op beyond
    /// ensuring it ends up in `free`.
    pub fn release(&self, id: &NoteId) {
        let mut state = self.state.lock().unwrap();
        state.busy.remove(id);
        state.free.insert(id.clone());
    }

    /// Whether `id` belongs to this pool's write set at all (free or busy).
    pub fn contains(&self, id: &NoteId) -> bool {
        let state = self.state.lock().unwrap();
        state.free.contains(id) || state.busy.contains(id)
    }

    pub fn is_busy(&self, id: &NoteId) -> bool {
        self.state.lock().unwrap().busy.contains(id)
    }

    pub fn free_count(&self) -> usize {
        self.state.lock().unwrap().free.len()
    }

    pub fn busy_count(&self) -> usize {
        self.state.lock().unwrap().busy.len()
    }
}
