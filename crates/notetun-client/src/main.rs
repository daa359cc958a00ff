//! notetun-client — local HTTP/SOCKS5 proxy front-end for the covert
//! tunnel.

mod cli;
mod http_proxy;
mod socks5;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use notetun_core::config::{self, NotetunConfig};
use notetun_core::{Codec, Direction, PROCESS_POOL_SIZE, SEND_POOL_SIZE};
use notetun_router::{Router, TunnelConfig};
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

    tracing::info!(mode = %config.mode, "notetun-client starting");

    let codec = Codec::from_passphrase(config.storage.encryption_key.as_deref());
    let jar = load_netscape_cookie_jar(&config.storage.cookies_path)
        .with_context(|| format!("failed to load cookie jar from {}", config.storage.cookies_path.display()))?;
    let notes = Arc::new(NotesClient::new(jar));

    let initial_revision = notes
        .fetch_revision()
        .await
        .context("failed to fetch initial revision")?;

    let pool_file = notetun_core::config::NotePoolFile::load(&config::note_pool_path())
        .context("failed to load note pool file")?;
    let write_pool = Arc::new(NotePool::new(
        pool_file.client_pool.into_iter().map(NoteId),
    ));
    let read_pool = Arc::new(NotePool::new(
        pool_file.server_pool.into_iter().map(NoteId),
    ));

    let inbox = Inbox::new();
    let sender = Sender::spawn(Direction::ClientToWorker, codec.clone(), notes.clone(), write_pool.clone());

    let receiver = Receiver::new(initial_revision);
    let process_permits = Arc::new(Semaphore::new(PROCESS_POOL_SIZE));
    let clear_permits = Arc::new(Semaphore::new(SEND_POOL_SIZE));
    receiver.spawn(
        Direction::WorkerToClient,
        codec.clone(),
        notes.clone(),
        write_pool,
        read_pool,
        inbox.clone(),
        process_permits,
        clear_permits,
    );
    spawn_stale_reaper(inbox.clone(), now_ms);

    let router = Arc::new(Router::for_client(codec, sender, inbox));
    let settings = Arc::new(config.settings.clone());
    let tunnel_cfg = Arc::new(TunnelConfig {
        chunk_size: settings.chunk_size,
        chunk_idle_timeout: std::time::Duration::from_secs_f64(settings.chunk_idle_timeout),
        tunnel_idle_timeout: std::time::Duration::from_secs(settings.tunnel_idle_timeout),
    });

    let mut front_ends = tokio::task::JoinSet::new();

    if matches!(settings.proxy_mode.as_str(), "http" | "both") {
        let listener = TcpListener::bind(("0.0.0.0", settings.proxy_port))
            .await
            .with_context(|| format!("failed to bind HTTP proxy on port {}", settings.proxy_port))?;
        front_ends.spawn(http_proxy::serve(
            router.clone(),
            listener,
            settings.clone(),
            tunnel_cfg.clone(),
        ));
    }

    if matches!(settings.proxy_mode.as_str(), "socks5" | "both") {
        let listener = TcpListener::bind(("0.0.0.0", settings.socks5_port))
            .await
            .with_context(|| format!("failed to bind SOCKS5 proxy on port {}", settings.socks5_port))?;
        front_ends.spawn(socks5::serve(router.clone(), listener, tunnel_cfg.clone()));
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            router.stop();
        }
        Some(result) = front_ends.join_next() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "a front-end task panicked");
            } else {
                tracing::error!("a front-end task exited unexpectedly");
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
