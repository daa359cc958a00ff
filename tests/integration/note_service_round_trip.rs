//! Full duplex pipeline test: a client-role and a worker-role each build
//! their own `Sender`/`Receiver`/`Inbox`/`Router`, sharing nothing but a
//! mocked note service — mirroring the real two-process deployment where
//! both sides only ever communicate by writing and polling notes.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use notetun_core::{Codec, Direction, RequestId, PROCESS_POOL_SIZE, SEND_POOL_SIZE};
use notetun_router::{NoteTransport, Router};
use notetun_transport::{Inbox, NoteId, NotePool, NotesClient, Receiver, Sender};

use crate::support::mock_notes;

struct Role {
    router: Arc<Router>,
    write_pool: Arc<NotePool>,
}

fn build_role(
    send_direction: Direction,
    recv_direction: Direction,
    notes: Arc<NotesClient>,
    write_ids: Vec<&str>,
    read_ids: Vec<&str>,
    initial_revision: u64,
) -> Role {
    let write_pool = Arc::new(NotePool::new(
        write_ids.into_iter().map(|s| NoteId(s.to_string())),
    ));
    let read_pool = Arc::new(NotePool::new(
        read_ids.into_iter().map(|s| NoteId(s.to_string())),
    ));

    let inbox = Inbox::new();
    let sender = Sender::spawn(send_direction, Codec::Plain, notes.clone(), write_pool.clone());

    let receiver = Receiver::new(initial_revision);
    let process_permits = Arc::new(tokio::sync::Semaphore::new(PROCESS_POOL_SIZE));
    let clear_permits = Arc::new(tokio::sync::Semaphore::new(SEND_POOL_SIZE));
    receiver.spawn(
        recv_direction,
        Codec::Plain,
        notes,
        write_pool.clone(),
        read_pool,
        inbox.clone(),
        process_permits,
        clear_permits,
    );

    let router = match send_direction {
        Direction::ClientToWorker => Arc::new(Router::for_client(Codec::Plain, sender, inbox)),
        Direction::WorkerToClient => Arc::new(Router::for_worker(Codec::Plain, sender, inbox)),
    };

    Role { router, write_pool }
}

async fn wait_until<F: Fn() -> bool>(cond: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn request_and_response_round_trip_and_release_the_writer_note() {
    let mock = mock_notes::start(1).await;

    let client_notes = Arc::new(NotesClient::with_base_url(
        reqwest::cookie::Jar::default(),
        mock.base_url(),
    ));
    let worker_notes = Arc::new(NotesClient::with_base_url(
        reqwest::cookie::Jar::default(),
        mock.base_url(),
    ));

    let client = build_role(
        Direction::ClientToWorker,
        Direction::WorkerToClient,
        client_notes,
        vec!["1_1_1"],
        vec!["2_2_2"],
        1,
    );
    let worker = build_role(
        Direction::WorkerToClient,
        Direction::ClientToWorker,
        worker_notes,
        vec!["2_2_2"],
        vec!["1_1_1"],
        1,
    );

    assert_eq!(client.write_pool.busy_count(), 0);

    let request_id = RequestId::new(1_700_000_000_000);
    client
        .router
        .send_message(request_id.clone(), Bytes::from_static(b"GET /"))
        .await
        .unwrap();

    assert!(
        wait_until(|| client.write_pool.busy_count() == 1, Duration::from_secs(2)).await,
        "client should have claimed a note-id to carry the request"
    );

    let pending = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(pending) = worker.router.next_pending_request().await {
                return pending;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("worker should observe the pending request");

    assert_eq!(pending.0, request_id);
    assert_eq!(pending.1, Bytes::from_static(b"GET /"));

    worker
        .router
        .send_message(request_id.clone(), Bytes::from_static(b"200 OK"))
        .await
        .unwrap();

    let response = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(body) = client.router.try_receive_message(&request_id).await {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("client should observe the response");

    assert_eq!(response, Bytes::from_static(b"200 OK"));

    assert!(
        wait_until(
            || client.write_pool.busy_count() == 0 && client.write_pool.free_count() == 1,
            Duration::from_secs(5)
        )
        .await,
        "client should see its own note released once the worker clears it"
    );
}
