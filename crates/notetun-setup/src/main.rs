//! notetun-setup — provisions the note pool and writes the local config.

mod cli;
mod clash;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::Semaphore;

use notetun_core::config::{self, NotePoolFile};
use notetun_transport::{load_netscape_cookie_jar, NotesClient};

const CREATE_CONCURRENCY: usize = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = cli::Cli::parse();
    if let Some(dir) = &args.data_dir {
        std::env::set_var("NOTETUN_DATA_DIR", dir);
    }

    match args.command {
        cli::Command::Check => check().await,
        cli::Command::Create {
            client_notes,
            server_notes,
        } => create(client_notes, server_notes).await,
        cli::Command::Clash { proxy_port } => {
            let path = clash::write_config(&config::data_dir(), proxy_port)?;
            println!("wrote {}", path.display());
            Ok(())
        }
    }
}

async fn check() -> anyhow::Result<()> {
    let pool_path = config::note_pool_path();
    if !pool_path.exists() {
        println!("NO_POOL");
        return Ok(());
    }

    let pool = NotePoolFile::load(&pool_path).context("failed to read note pool file")?;
    println!(
        "POOL_FOUND:{}:{}",
        pool.client_pool.len(),
        pool.server_pool.len()
    );

    let notes = build_client()?;
    let client_ok = match pool.client_pool.first() {
        Some(id) => notes.check_note_access(id).await,
        None => false,
    };
    let server_ok = match pool.server_pool.first() {
        Some(id) => notes.check_note_access(id).await,
        None => false,
    };

    println!(
        "{}",
        match (client_ok, server_ok) {
            (true, true) => "ACCESS_OK",
            (true, false) => "ACCESS_CLIENT_ONLY",
            (false, true) => "ACCESS_SERVER_ONLY",
            (false, false) => "ACCESS_NONE",
        }
    );
    Ok(())
}

async fn create(client_notes: usize, server_notes: usize) -> anyhow::Result<()> {
    let notes = Arc::new(build_client()?);

    println!("Creating {client_notes} client notes and {server_notes} server notes...");

    println!("Creating client notes...");
    let client_ids = create_notes(&notes, client_notes, "client").await;
    println!("  Created: {}", client_ids.len());

    println!("Creating server notes...");
    let server_ids = create_notes(&notes, server_notes, "server").await;
    println!("  Created: {}", server_ids.len());

    if client_ids.len() < client_notes || server_ids.len() < server_notes {
        anyhow::bail!("failed to create all notes");
    }

    let pool = NotePoolFile {
        client_pool: client_ids,
        server_pool: server_ids,
    };
    let path = config::note_pool_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, serde_json::to_string_pretty(&pool)?)?;
    println!("Saved to {}", path.display());
    println!("DONE");
    Ok(())
}

async fn create_notes(notes: &Arc<NotesClient>, count: usize, prefix: &str) -> Vec<String> {
    let permits = Arc::new(Semaphore::new(CREATE_CONCURRENCY));
    let mut set = tokio::task::JoinSet::new();

    for i in 1..=count {
        let notes = notes.clone();
        let permits = permits.clone();
        let title = format!("{prefix}_{i:03}");
        set.spawn(async move {
            let _permit = permits.acquire_owned().await.expect("semaphore not closed");
            notes.create_note(&title).await
        });
    }

    let mut ids = Vec::with_capacity(count);
    while let Some(result) = set.join_next().await {
        match result {
            Ok(Ok(id)) => ids.push(id),
            Ok(Err(e)) => tracing::warn!(error = %e, "failed to create note"),
            Err(e) => tracing::warn!(error = %e, "note-creation task panicked"),
        }
    }
    ids
}

fn build_client() -> anyhow::Result<NotesClient> {
    let jar = load_netscape_cookie_jar(&config::cookie_jar_path())
        .context("failed to load cookie jar; export your Yandex session cookies first")?;
    Ok(NotesClient::new(jar))
}
