//! CONNECT tunnel engine test: the client side runs `client_setup` +
//! `run_client_tunnel`, the worker side dequeues the resulting `RQST` and
//! runs `worker_handle_request`, against a real loopback echo server —
//! all routed through the same mocked note-service backend as the round
//! trip test, so this exercises chunking under `tunnel_loop` end to end.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use notetun_core::{Codec, Direction, PROCESS_POOL_SIZE, SEND_POOL_SIZE};
use notetun_router::{client_setup, run_client_tunnel, worker_handle_request, NoteTransport, Router, TunnelConfig};
use notetun_transport::{Inbox, NoteId, NotePool, NotesClient, Receiver, Sender};

use crate::support::mock_notes;

async fn spawn_echo_server() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => {
                            if socket.write_all(&buf[..n]).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            });
        }
    });
    addr
}

#[tokio::test]
async fn connect_tunnel_carries_bytes_through_a_loopback_echo_server() {
    let mock = mock_notes::start(1).await;
    let echo_addr = spawn_echo_server().await;

    let client_pool_ids = vec!["1_1_1"];
    let worker_pool_ids = vec!["2_2_2"];

    let client_notes = Arc::new(NotesClient::with_base_url(
        reqwest::cookie::Jar::default(),
        mock.base_url(),
    ));
    let worker_notes = Arc::new(NotesClient::with_base_url(
        reqwest::cookie::Jar::default(),
        mock.base_url(),
    ));

    let client_write_pool = Arc::new(NotePool::new(
        client_pool_ids.iter().map(|s| NoteId(s.to_string())),
    ));
    let client_read_pool = Arc::new(NotePool::new(
        worker_pool_ids.iter().map(|s| NoteId(s.to_string())),
    ));
    let client_inbox = Inbox::new();
    let client_sender = Sender::spawn(
        Direction::ClientToWorker,
        Codec::Plain,
        client_notes.clone(),
        client_write_pool.clone(),
    );
    Receiver::new(1).spawn(
        Direction::WorkerToClient,
        Codec::Plain,
        client_notes,
        client_write_pool,
        client_read_pool,
        client_inbox.clone(),
        Arc::new(tokio::sync::Semaphore::new(PROCESS_POOL_SIZE)),
        Arc::new(tokio::sync::Semaphore::new(SEND_POOL_SIZE)),
    );
    let client_router = Arc::new(Router::for_client(Codec::Plain, client_sender, client_inbox));

    let worker_write_pool = Arc::new(NotePool::new(
        worker_pool_ids.iter().map(|s| NoteId(s.to_string())),
    ));
    let worker_read_pool = Arc::new(NotePool::new(
        client_pool_ids.iter().map(|s| NoteId(s.to_string())),
    ));
    let worker_inbox = Inbox::new();
    let worker_sender = Sender::spawn(
        Direction::WorkerToClient,
        Codec::Plain,
        worker_notes.clone(),
        worker_write_pool.clone(),
    );
    Receiver::new(1).spawn(
        Direction::ClientToWorker,
        Codec::Plain,
        worker_notes,
        worker_write_pool,
        worker_read_pool,
        worker_inbox.clone(),
        Arc::new(tokio::sync::Semaphore::new(PROCESS_POOL_SIZE)),
        Arc::new(tokio::sync::Semaphore::new(SEND_POOL_SIZE)),
    );
    let worker_router = Arc::new(Router::for_worker(Codec::Plain, worker_sender, worker_inbox));

    let cfg = TunnelConfig {
        chunk_size: 64,
        chunk_idle_timeout: Duration::from_millis(50),
        tunnel_idle_timeout: Duration::from_secs(5),
    };

    // The worker side must already be polling for the pending request
    // before `client_setup` sends it, since `client_setup` blocks waiting
    // for the worker's `RESP{status:200}` acknowledgment.
    let worker_cfg = cfg.clone();
    let worker_router_for_task = worker_router.clone();
    tokio::spawn(async move {
        let (pending_id, payload) = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(p) = worker_router_for_task.next_pending_request().await {
                    return p;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("worker should see the CONNECT request");

        let http = reqwest::Client::new();
        worker_handle_request(worker_router_for_task, &worker_cfg, &http, pending_id, payload).await;
    });

    let request_id = client_setup(&client_router, "127.0.0.1", echo_addr.port())
        .await
        .expect("client setup should not race ahead of the worker");

    let client_socket = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let client_addr = client_socket.local_addr().unwrap();
    let driver = tokio::spawn({
        let client_router = client_router.clone();
        let cfg = cfg.clone();
        async move {
            let (socket, _) = client_socket.accept().await.unwrap();
            run_client_tunnel(client_router, &cfg, request_id, socket).await;
        }
    });

    let mut app_socket = TcpStream::connect(client_addr).await.unwrap();
    app_socket.write_all(b"hello through the tunnel").await.unwrap();

    let mut received = vec![0u8; "hello through the tunnel".len()];
    tokio::time::timeout(Duration::from_secs(5), app_socket.read_exact(&mut received))
        .await
        .expect("echoed bytes should arrive before the timeout")
        .unwrap();

    assert_eq!(received, b"hello through the tunnel");

    drop(app_socket);
    let _ = tokio::time::timeout(Duration::from_secs(6), driver).await;
}
