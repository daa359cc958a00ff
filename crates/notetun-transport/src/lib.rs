//! Transport: note-pool bookkeeping, the HTTP client for the note
//! service's data surface, the batching sender, the long-poll receiver,
//! and the inbox reassembly/stale-reaper. No request/response framing or
//! tunnel semantics live here — see `notetun-router`.

pub mod client;
pub mod inbox;
pub mod pool;
pub mod receiver;
pub mod sender;

pub use client::{load_netscape_cookie_jar, NotesClient, NotesClientError};
pub use inbox::{spawn_stale_reaper, Inbox};
pub use pool::{NoteId, NotePool};
pub use receiver::Receiver;
pub use sender::Sender;
