//! The collaborator contract (§6.1): the one interface front-ends see, no
//! matter what carries the bytes underneath. One concrete implementation —
//! `Router` — wires it to `notetun-transport`; no second implementation is
//! speculated (see `NotetunConfig`'s sibling note in DESIGN.md).

use bytes::Bytes;
use thiserror::Error;

use notetun_core::{CodecError, RequestId};

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("encoded message ({len} chars) exceeds the snippet budget ({budget} chars)")]
    TooLarge { len: usize, budget: usize },

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

#[async_trait::async_trait]
pub trait NoteTransport: Send + Sync {
    /// Write `bytes` as a single one-shot unit. Fails if the encoded size
    /// alone exceeds the snippet budget — callers must not rely on
    /// auto-splitting here (§4.7).
    async fn send_message(&self, request_id: RequestId, bytes: Bytes) -> Result<(), RouterError>;

    /// Returns the complete reassembled body for `request_id`, if any has
    /// arrived, removing it from the inbox.
    async fn try_receive_message(&self, request_id: &RequestId) -> Option<Bytes>;

    /// Worker-side only: dequeue the next newly-arrived `RQST`.
    async fn next_pending_request(&self) -> Option<(RequestId, Bytes)>;

    /// Enqueue a streaming `DATA` chunk for outbound delivery.
    fn put_chunk(&self, request_id: &RequestId, n: u32, bytes: Bytes);

    /// Whether chunk `n` has arrived for `request_id`.
    fn peek_chunk(&self, request_id: &RequestId, n: u32) -> bool;

    /// Remove and return chunk `n` for `request_id`, if present.
    fn take_chunk(&self, request_id: &RequestId, n: u32) -> Option<Bytes>;

    /// Signal the router to stop accepting new tunnel work. In-flight
    /// tunnels still exit via their own idle timeouts (§5).
    fn stop(&self);
}
