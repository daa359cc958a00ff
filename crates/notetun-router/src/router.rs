//! `Router`: the one concrete `NoteTransport`, wiring a `notetun-transport`
//! sender/inbox pair bound to one role (client or worker) and one
//! direction of travel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use notetun_core::{Codec, Direction, RequestId, UnitType, Unit, MAX_SNIPPET_CHARS};
use notetun_transport::{Inbox, Sender};

use crate::contract::{NoteTransport, RouterError};

pub struct Router {
    direction: Direction,
    outgoing_unit_type: UnitType,
    incoming_unit_type: UnitType,
    codec: Codec,
    sender: Sender,
    inbox: Arc<Inbox>,
    stopped: AtomicBool,
}

impl Router {
    /// A client-side router: sends `RQST`s as `ClientToWorker`, receives
    /// `RESP`s.
    pub fn for_client(codec: Codec, sender: Sender, inbox: Arc<Inbox>) -> Self {
        Self {
            direction: Direction::ClientToWorker,
            outgoing_unit_type: UnitType::Rqst,
            incoming_unit_type: UnitType::Resp,
            codec,
            sender,
            inbox,
            stopped: AtomicBool::new(false),
        }
    }

    /// A worker-side router: sends `RESP`s as `WorkerToClient`, receives
    /// `RQST`s.
    pub fn for_worker(codec: Codec, sender: Sender, inbox: Arc<Inbox>) -> Self {
        Self {
            direction: Direction::WorkerToClient,
            outgoing_unit_type: UnitType::Resp,
            incoming_unit_type: UnitType::Rqst,
            codec,
            sender,
            inbox,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    fn incoming_key(&self, request_id: &RequestId) -> String {
        format!("{request_id}:{}", self.incoming_unit_type)
    }

    fn chunk_key(&self, request_id: &RequestId) -> String {
        format!("{request_id}:DATA")
    }
}

#[async_trait::async_trait]
impl NoteTransport for Router {
    async fn send_message(&self, request_id: RequestId, bytes: Bytes) -> Result<(), RouterError> {
        let encoded_len = self.codec.encode(&bytes)?.len();
        if encoded_len > MAX_SNIPPET_CHARS {
            return Err(RouterError::TooLarge {
                len: encoded_len,
                budget: MAX_SNIPPET_CHARS,
            });
        }
        let unit = Unit::one_shot(self.direction, request_id, self.outgoing_unit_type, bytes);
        self.sender.enqueue(unit);
        Ok(())
    }

    async fn try_receive_message(&self, request_id: &RequestId) -> Option<Bytes> {
        self.inbox.take(&self.incoming_key(request_id))
    }

    async fn next_pending_request(&self) -> Option<(RequestId, Bytes)> {
        self.inbox.next_pending_request().await
    }

    fn put_chunk(&self, request_id: &RequestId, n: u32, bytes: Bytes) {
        let unit = Unit::data_chunk(self.direction, request_id.clone(), n, bytes);
        self.sender.enqueue(unit);
    }

    fn peek_chunk(&self, request_id: &RequestId, n: u32) -> bool {
        self.inbox.head_chunk(&self.chunk_key(request_id), n)
    }

    fn take_chunk(&self, request_id: &RequestId, n: u32) -> Option<Bytes> {
        self.inbox.take_chunk(&self.chunk_key(request_id), n)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notetun_transport::{NoteId, NotePool};

    fn test_router(direction_ctor: fn(Codec, Sender, Arc<Inbox>) -> Router) -> Router {
        let pool = Arc::new(NotePool::new(vec![NoteId("1_1_1".to_string())]));
        let notes = Arc::new(notetun_transport::NotesClient::new(reqwest::cookie::Jar::default()));
        let sender = Sender::spawn(Direction::ClientToWorker, Codec::Plain, notes, pool);
        let inbox = Inbox::new();
        direction_ctor(Codec::Plain, sender, inbox)
    }

    #[tokio::test]
    async fn send_message_over_budget_is_rejected() {
        let router = test_router(Router::for_client);
        let oversized = vec![0u8; MAX_SNIPPET_CHARS + 10];
        let err = router
            .send_message(RequestId::new(1700000000000), oversized.into())
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::TooLarge { .. }));
    }

    #[tokio::test]
    async fn chunk_round_trips_through_inbox() {
        let router = test_router(Router::for_client);
        let request_id = RequestId::new(1700000000000);
        // take_chunk/peek_chunk read from our own inbox, simulating a
        // chunk that arrived from the peer via the receiver.
        router.inbox.put_data_chunk(
            &format!("{request_id}:DATA"),
            1,
            Bytes::from_static(b"hello"),
        );
        assert!(router.peek_chunk(&request_id, 1));
        assert_eq!(
            router.take_chunk(&request_id, 1).unwrap(),
            Bytes::from_static(b"hello")
        );
    }

    #[tokio::test]
    async fn stop_flips_the_flag() {
        let router = test_router(Router::for_worker);
        assert!(!router.is_stopped());
        router.stop();
        assert!(router.is_stopped());
    }
}
