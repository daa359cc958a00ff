//! HTTP proxy front-end: a minimal HTTP/1.1 request-line + header parser
//! over raw sockets, no framework.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use notetun_core::config::Settings;
use notetun_core::RequestId;
use notetun_router::{NoteTransport, Router, TunnelConfig};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

const HOP_BY_HOP_RESPONSE_HEADERS: &[&str] =
    &["transfer-encoding", "content-encoding", "content-length"];

#[derive(Debug, Serialize)]
struct OutboundRequest {
    id: String,
    method: String,
    url: String,
    headers: HashMap<String, String>,
    body: String,
}

#[derive(Debug, Deserialize)]
struct InboundResponse {
    #[serde(default = "default_status")]
    status: u16,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    body: String,
}

fn default_status() -> u16 {
    200
}

pub async fn serve(
    router: Arc<Router>,
    listener: TcpListener,
    settings: Arc<Settings>,
    tunnel_cfg: Arc<TunnelConfig>,
) {
    tracing::info!(addr = %listener.local_addr().map(|a| a.to_string()).unwrap_or_default(), "HTTP proxy listening");
    loop {
        match listener.accept().await {
            Ok((socket, _addr)) => {
                let router = router.clone();
                let settings = settings.clone();
                let tunnel_cfg = tunnel_cfg.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(router, socket, settings, tunnel_cfg).await {
                        tracing::debug!(error = %e, "HTTP proxy connection ended with error");
                    }
                });
            }
            Err(e) => tracing::warn!(error = %e, "accept failed on HTTP proxy listener"),
        }
    }
}

async fn handle_connection(
    router: Arc<Router>,
    socket: TcpStream,
    settings: Arc<Settings>,
    tunnel_cfg: Arc<TunnelConfig>,
) -> anyhow::Result<()> {
    let mut reader = BufReader::new(socket);

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await? == 0 {
        return Ok(());
    }
    let mut parts = request_line.trim_end().splitn(3, ' ');
    let method = parts.next().unwrap_or("").to_string();
    let target = parts.next().unwrap_or("").to_string();

    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_string(), v.trim().to_string());
        }
    }

    if method.eq_ignore_ascii_case("CONNECT") {
        return handle_connect(router, reader, &target, &tunnel_cfg).await;
    }

    let content_length: usize = headers
        .get("Content-Length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        reader.read_exact(&mut body).await?;
    }

    let request_id = RequestId::new(now_ms());
    let out = OutboundRequest {
        id: request_id.as_str().to_string(),
        method,
        url: target,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    };
    let payload = serde_json::to_vec(&out)?;

    let mut socket = reader.into_inner();

    if let Err(e) = router
        .send_message(request_id.clone(), Bytes::from(payload))
        .await
    {
        socket.write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n").await?;
        tracing::warn!(error = %e, "failed to upload outbound request");
        return Ok(());
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(settings.timeout);
    loop {
        if let Some(resp) = router.try_receive_message(&request_id).await {
            write_response(&mut socket, &resp).await?;
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            socket
                .write_all(b"HTTP/1.1 504 Gateway Timeout\r\n\r\n")
                .await?;
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

async fn handle_connect(
    router: Arc<Router>,
    reader: BufReader<TcpStream>,
    target: &str,
    tunnel_cfg: &TunnelConfig,
) -> anyhow::Result<()> {
    let mut socket = reader.into_inner();

    let Some((host, port)) = target
        .rsplit_once(':')
        .and_then(|(h, p)| p.parse::<u16>().ok().map(|p| (h.to_string(), p)))
    else {
        socket.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await?;
        return Ok(());
    };

    match notetun_router::client_setup(&router, &host, port).await {
        Ok(request_id) => {
            socket
                .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
                .await?;
            notetun_router::run_client_tunnel(router, tunnel_cfg, request_id, socket).await;
        }
        Err(e) => {
            tracing::warn!(host, port, error = %e, "CONNECT tunnel setup failed");
            socket
                .write_all(b"HTTP/1.1 504 Gateway Timeout\r\n\r\n")
                .await?;
        }
    }
    Ok(())
}

async fn write_response(socket: &mut TcpStream, raw: &Bytes) -> anyhow::Result<()> {
    let resp: InboundResponse = serde_json::from_slice(raw)?;
    let body = resp.body.into_bytes();

    let mut head = format!("HTTP/1.1 {} {}\r\n", resp.status, reason_phrase(resp.status));
    for (k, v) in &resp.headers {
        if HOP_BY_HOP_RESPONSE_HEADERS.contains(&k.to_ascii_lowercase().as_str()) {
            continue;
        }
        head.push_str(&format!("{k}: {v}\r\n"));
    }
    head.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));

    socket.write_all(head.as_bytes()).await?;
    socket.write_all(&body).await?;
    Ok(())
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        504 => "Gateway Timeout",
        _ => "",
    }
}

fn now_ms() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is after the unix epoch")
        .as_millis()
}
