//! notetun-worker — the egress side of the tunnel: dequeues pending
//! requests and executes them against the real network.

mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::Semaphore;

use notetun_core::config::{self, NotetunConfig};
use notetun_core::{Codec, Direction, PROCESS_POOL_SIZE, SEND_POOL_SIZE};
use notetun_router::{NoteTransport, Router, TunnelConfig};
use notetun_transport::{load_netscape_cookie_jar, spawn_stale_reaper, Inbox, NoteId, NotePool, NotesClient, Receiver, Sender};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = cli::Cli::parse();
    if let Some(dir) = &args.data_dir {
        std::env::set_var("NOTETUN_DATA_DIR", dir);
    }

    let config = NotetunConfig::load()
        .context("failed to read config.json")?
        .ok_or_else(|| anyhow::anyhow!("missing {}; run notetun-setup first", config::config_path().display()))?;

    tracing::info!(mode = %config.mode, "notetun-worker starting");

    let codec = Codec::from_passphrase(config.storage.encryption_key.as_deref());
    let jar = load_netscape_cookie_jar(&config.storage.cookies_path)
        .with_context(|| format!("failed to load cookie jar from {}", config.storage.cookies_path.display()))?;
    let notes = Arc::new(NotesClient::new(jar));

    let initial_revision = notes
        .fetch_revision()
        .await
        .context("failed to fetch initial revision")?;

    let pool_file = config::NotePoolFile::load(&config::note_pool_path())
        .context("failed to load note pool file")?;
    // The worker writes into the pool the client reads from, and reads
    // from the pool the client writes into.
    let write_pool = Arc::new(NotePool::new(
        pool_file.server_pool.into_iter().map(NoteId),
    ));
    let read_pool = Arc::new(NotePool::new(
        pool_file.client_pool.into_iter().map(NoteId),
    ));

    let inbox = Inbox::new();
    let sender = Sender::spawn(Direction::WorkerToClient, codec.clone(), notes.clone(), write_pool.clone());

    let receiver = Receiver::new(initial_revision);
    let process_permits = Arc::new(Semaphore::new(PROCESS_POOL_SIZE));
    let clear_permits = Arc::new(Semaphore::new(SEND_POOL_SIZE));
    receiver.spawn(
        Direction::ClientToWorker,
        codec.clone(),
        notes.clone(),
        write_pool,
        read_pool,
        inbox.clone(),
        process_permits,
        clear_permits,
    );
    spawn_stale_reaper(inbox.clone(), now_ms);

    let router = Arc::new(Router::for_worker(codec, sender, inbox));
    let tunnel_cfg = Arc::new(TunnelConfig {
        chunk_size: config.settings.chunk_size,
        chunk_idle_timeout: std::time::Duration::from_secs_f64(config.settings.chunk_idle_timeout),
        tunnel_idle_timeout: std::time::Duration::from_secs(config.settings.tunnel_idle_timeout),
    });
    let http = Arc::new(reqwest::Client::new());

    tracing::info!("worker ready, waiting for requests");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                router.stop();
                break;
            }
            pending = router.next_pending_request() => {
                let Some((request_id, payload)) = pending else {
                    tokio::time::sleep(std::time::Duration::from_millis(notetun_core::POLL_INTERVAL_MS)).await;
                    continue;
                };
                let router = router.clone();
                let tunnel_cfg = tunnel_cfg.clone();
                let http = http.clone();
                tokio::spawn(async move {
                    notetun_router::worker_handle_request(router, &tunnel_cfg, &http, request_id, payload).await;
                });
            }
        }
    }

    Ok(())
}

fn now_ms() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is after the unix epoch")
        .as_millis()
}
