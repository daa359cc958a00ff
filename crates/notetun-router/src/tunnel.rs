//! Tunnel engine (§4.8): CONNECT-style tunnels built on top of the message
//! and chunk channels, plus the worker-side outbound HTTP request path.
//! One `tunnel_loop` serves both client and worker sides — each side's
//! `Router` already resolves the right direction/note-pool, so the loop
//! itself is symmetric, mirroring how the two Python tunnel handlers
//! share nearly identical bodies.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

use notetun_core::RequestId;

use crate::contract::{NoteTransport, RouterError};
use crate::router::Router;

/// Tunable knobs carried over from §4.8 / §6.4's settings.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    pub chunk_size: usize,
    pub chunk_idle_timeout: Duration,
    pub tunnel_idle_timeout: Duration,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            chunk_size: 7800,
            chunk_idle_timeout: Duration::from_millis(100),
            tunnel_idle_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("tunnel setup timed out")]
    SetupTimeout,
    #[error("tunnel setup rejected with status {0}")]
    SetupRejected(u16),
    #[error(transparent)]
    Router(#[from] RouterError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
struct ConnectRequest<'a> {
    id: &'a str,
    method: &'static str,
    host: &'a str,
    port: u16,
}

#[derive(Debug, Deserialize)]
struct ConnectResponse {
    status: u16,
}

#[derive(Debug, Serialize)]
struct ConnectOkResponse<'a> {
    id: &'a str,
    status: u16,
    headers: serde_json::Value,
    body: &'static str,
}

#[derive(Debug, Deserialize)]
struct OutboundHttpRequest {
    id: String,
    method: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    headers: std::collections::HashMap<String, String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    port: Option<u16>,
}

#[derive(Debug, Serialize)]
struct OutboundHttpResponse {
    id: String,
    status: u16,
    headers: std::collections::HashMap<String, String>,
    body: String,
}

const SETUP_POLL_INTERVAL: Duration = Duration::from_millis(300);
const SETUP_TIMEOUT: Duration = Duration::from_secs(30);
const TARGET_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const OUTBOUND_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const TUNNEL_LOOP_IDLE_SLEEP: Duration = Duration::from_millis(50);

const HOP_BY_HOP_REQUEST_HEADERS: &[&str] =
    &["host", "connection", "proxy-connection", "content-length"];

/// Client side of a CONNECT tunnel (§4.8, client side steps 1-5), with the
/// HTTP-style acknowledgment baked in. Front-ends that need a different
/// ack wire format (SOCKS5) should call `client_setup` and
/// `run_client_tunnel` directly instead.
pub async fn client_connect(
    router: Arc<Router>,
    cfg: &TunnelConfig,
    host: &str,
    port: u16,
    mut socket: TcpStream,
) -> Result<(), TunnelError> {
    let request_id = client_setup(&router, host, port).await?;

    socket
        .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
        .await?;

    run_client_tunnel(router, cfg, request_id, socket).await;
    Ok(())
}

/// Steps 1-3 of the client side: mint a request id, send the `CONNECT`
/// `RQST`, and poll for a `RESP{status:200}` for up to 30s. Returns the
/// request id to use for the tunnel loop on success.
pub async fn client_setup(
    router: &Arc<Router>,
    host: &str,
    port: u16,
) -> Result<RequestId, TunnelError> {
    let request_id = RequestId::new(now_ms());

    let payload = serde_json::to_vec(&ConnectRequest {
        id: request_id.as_str(),
        method: "CONNECT",
        host,
        port,
    })?;
    router.send_message(request_id.clone(), Bytes::from(payload)).await?;

    let deadline = Instant::now() + SETUP_TIMEOUT;
    loop {
        if let Some(resp) = router.try_receive_message(&request_id).await {
            let parsed: ConnectResponse = serde_json::from_slice(&resp)?;
            if parsed.status == 200 {
                return Ok(request_id);
            }
            return Err(TunnelError::SetupRejected(parsed.status));
        }
        if Instant::now() >= deadline {
            return Err(TunnelError::SetupTimeout);
        }
        tokio::time::sleep(SETUP_POLL_INTERVAL).await;
    }
}

/// Run the tunnel loop for an already-acknowledged client-side CONNECT.
pub async fn run_client_tunnel(
    router: Arc<Router>,
    cfg: &TunnelConfig,
    request_id: RequestId,
    socket: TcpStream,
) {
    tunnel_loop(router, cfg, request_id, socket).await;
}

/// Worker side: dispatch one dequeued `RQST`. `CONNECT` opens a tunnel and
/// runs the loop reversed; HTTP verbs perform the outbound request and
/// reply with one `RESP`; `CLOSE` is a no-op (§4.8 worker side step 1).
pub async fn worker_handle_request(
    router: Arc<Router>,
    cfg: &TunnelConfig,
    http: &reqwest::Client,
    request_id: RequestId,
    payload: Bytes,
) {
    let req: OutboundHttpRequest = match serde_json::from_slice(&payload) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "malformed RQST payload, dropping");
            return;
        }
    };

    match req.method.as_str() {
        "CONNECT" => {
            let (Some(host), Some(port)) = (req.host, req.port) else {
                tracing::warn!("CONNECT request missing host/port");
                return;
            };
            worker_connect(router, cfg, request_id, &host, port).await;
        }
        "GET" | "POST" | "PUT" | "DELETE" | "HEAD" => {
            worker_http(router, http, request_id, req).await;
        }
        "CLOSE" => {}
        other => {
            tracing::debug!(method = other, "unrecognized method, ignoring");
        }
    }
}

async fn worker_connect(
    router: Arc<Router>,
    cfg: &TunnelConfig,
    request_id: RequestId,
    host: &str,
    port: u16,
) {
    let target = match timeout(TARGET_CONNECT_TIMEOUT, TcpStream::connect((host, port))).await {
        Ok(Ok(socket)) => socket,
        Ok(Err(e)) => {
            tracing::warn!(host, port, error = %e, "CONNECT target refused");
            return;
        }
        Err(_) => {
            tracing::warn!(host, port, "CONNECT target connect timed out");
            return;
        }
    };

    let ok = ConnectOkResponse {
        id: request_id.as_str(),
        status: 200,
        headers: serde_json::json!({}),
        body: "Connection Established",
    };
    let payload = match serde_json::to_vec(&ok) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "failed to serialize CONNECT ok response");
            return;
        }
    };
    if let Err(e) = router.send_message(request_id.clone(), Bytes::from(payload)).await {
        tracing::warn!(error = %e, "failed to send CONNECT ok response");
        return;
    }

    tunnel_loop(router, cfg, request_id, target).await;
}

async fn worker_http(
    router: Arc<Router>,
    http: &reqwest::Client,
    request_id: RequestId,
    req: OutboundHttpRequest,
) {
    let method = match req.method.parse::<reqwest::Method>() {
        Ok(m) => m,
        Err(_) => return,
    };

    let mut builder = http.request(method, &req.url);
    for (k, v) in &req.headers {
        if HOP_BY_HOP_REQUEST_HEADERS.contains(&k.to_ascii_lowercase().as_str()) {
            continue;
        }
        builder = builder.header(k, v);
    }
    if let Some(body) = &req.body {
        builder = builder.body(body.clone());
    }

    let result = timeout(OUTBOUND_HTTP_TIMEOUT, builder.send()).await;

    let response = match result {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => {
            tracing::warn!(url = req.url, error = %e, "outbound HTTP request failed");
            return;
        }
        Err(_) => {
            tracing::warn!(url = req.url, "outbound HTTP request timed out");
            return;
        }
    };

    let status = response.status().as_u16();
    let mut headers = std::collections::HashMap::new();
    for (name, value) in response.headers() {
        if let Ok(v) = value.to_str() {
            headers.insert(name.to_string(), v.to_string());
        }
    }
    let body = response.text().await.unwrap_or_default();

    let out = OutboundHttpResponse {
        id: req.id,
        status,
        headers,
        body,
    };
    let payload = match serde_json::to_vec(&out) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "failed to serialize outbound HTTP response");
            return;
        }
    };
    if let Err(e) = router.send_message(request_id, Bytes::from(payload)).await {
        tracing::warn!(error = %e, "failed to send outbound HTTP response");
    }
}

/// Bidirectional tunnel loop shared by both sides (§4.8).
async fn tunnel_loop(router: Arc<Router>, cfg: &TunnelConfig, request_id: RequestId, mut socket: TcpStream) {
    let mut buffer_out: Vec<u8> = Vec::new();
    let mut sent: u32 = 0;
    let mut recvd: u32 = 0;
    let mut last_data_time = Instant::now();
    let mut last_activity_time = Instant::now();
    let mut read_buf = vec![0u8; cfg.chunk_size];

    loop {
        let mut chunk_found = false;

        match socket.try_read(&mut read_buf) {
            Ok(0) => break,
            Ok(n) => {
                let data = &read_buf[..n];
                if buffer_out.len() + data.len() > cfg.chunk_size {
                    if !buffer_out.is_empty() {
                        sent += 1;
                        router.put_chunk(&request_id, sent, Bytes::from(std::mem::take(&mut buffer_out)));
                        chunk_found = true;
                    }
                    buffer_out = data.to_vec();
                } else {
                    buffer_out.extend_from_slice(data);
                }
                last_data_time = Instant::now();
                last_activity_time = Instant::now();
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(_) => break,
        }

        if !buffer_out.is_empty() && last_data_time.elapsed() >= cfg.chunk_idle_timeout {
            sent += 1;
            router.put_chunk(&request_id, sent, Bytes::from(std::mem::take(&mut buffer_out)));
            last_data_time = Instant::now();
            chunk_found = true;
        }

        let expected = recvd + 1;
        if router.peek_chunk(&request_id, expected) {
            if let Some(data) = router.take_chunk(&request_id, expected) {
                if socket.write_all(&data).await.is_err() {
                    break;
                }
                recvd = expected;
                last_activity_time = Instant::now();
                chunk_found = true;
            }
        }

        if router.is_stopped() {
            break;
        }
        if last_activity_time.elapsed() > cfg.tunnel_idle_timeout {
            tracing::debug!(%request_id, "tunnel idle timeout");
            break;
        }

        if !chunk_found {
            tokio::time::sleep(TUNNEL_LOOP_IDLE_SLEEP).await;
        }
    }

    if !buffer_out.is_empty() {
        sent += 1;
        router.put_chunk(&request_id, sent, Bytes::from(buffer_out));
    }
}

fn now_ms() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is after the unix epoch")
        .as_millis()
}
